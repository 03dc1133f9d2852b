//! Template rendering for metafile content and output filenames
//!
//! Metafile templates are written in Go `text/template` syntax
//! (`{{ if .Values.debug }}`, `{{ range .Values.ports }}`,
//! `{{ .Values.name | default "web" }}`). They are translated into MiniJinja
//! syntax (see [`translate`]) and rendered with MiniJinja, with values
//! exposed under the `Values` name. Jinja syntax (`{% for %}`,
//! `{{ Values.x }}`) is accepted as well.
//!
//! Missing keys render as an empty string rather than failing.

mod translate;

use std::collections::BTreeSet;
use std::sync::LazyLock;

use minijinja::{Environment, UndefinedBehavior, Value};
use regex::Regex;

use crate::error::{Error, Result};
use crate::values::Values;

static ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{.*?\}\}").unwrap_or_else(|e| panic!("invalid action regex: {}", e))
});

static VALUES_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w.])\.?Values\.([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)")
        .unwrap_or_else(|e| panic!("invalid values regex: {}", e))
});

/// Translate a Go-style template into the MiniJinja source that is
/// rendered. `name` identifies the template in error messages.
pub fn translate(name: &str, template: &str) -> Result<String> {
    translate::translate(template).map_err(|message| Error::Template {
        message,
        template: Some(name.to_string()),
    })
}

/// Translate and compile `template` without rendering it.
pub fn check(name: &str, template: &str) -> Result<()> {
    let source = translate(name, template)?;
    let env = environment();
    env.template_from_str(&source)
        .map(|_| ())
        .map_err(|e| template_error(name, e))
}

/// Every `Values.<dot-path>` referenced inside a template action, in order of
/// first appearance, without duplicates.
pub fn extract_value_keys(template: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut keys = Vec::new();
    for action in ACTION.find_iter(template) {
        for captures in VALUES_REF.captures_iter(action.as_str()) {
            let key = captures[1].to_string();
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
    }
    keys
}

fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env.set_keep_trailing_newline(true);
    env.add_filter("quote", |value: Value| format!("\"{}\"", value));
    env.add_filter("go_range", translate::go_range);
    env.add_filter("go_pairs", translate::go_pairs);
    env.add_filter("go_default", translate::go_default);
    env
}

fn template_error(name: &str, err: minijinja::Error) -> Error {
    Error::Template {
        message: err.to_string(),
        template: Some(name.to_string()),
    }
}

/// Render `template` against `values`. `name` identifies the template in
/// error messages.
pub fn render(name: &str, template: &str, values: &Values) -> Result<String> {
    let source = translate(name, template)?;
    let env = environment();
    env.render_str(&source, minijinja::context! { Values => values })
        .map_err(|e| template_error(name, e))
}
