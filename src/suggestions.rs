//! # Error Suggestions
//!
//! Hint-bearing errors for the CLI. Each one says what went wrong and how
//! to fix it:
//!
//! ```rust,ignore
//! return Err(suggestions::config_not_found(path));
//! ```
//!
//! [`find_similar`] is also used by the metafile validator to propose the
//! declared key closest to an undeclared one.

use std::path::Path;

/// The configuration file does not exist.
pub fn config_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Configuration file not found: {path}\n\n\
         hint: Create config/application.yaml with 'source', 'destination' and 'git' sections\n\
         hint: Use -c/--config to specify a different path\n\
         hint: Set CHART_SYNC_CONFIG environment variable",
        path = path.display()
    )
}

/// No secret was supplied for one side of a copy.
pub fn missing_secret(side: &str, env_var: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "No credential provided for the {side} repository\n\n\
         hint: Pass --{side}-secret <TOKEN>\n\
         hint: Set {env_var} environment variable\n\
         hint: Set useSsh and sshKeyPath under '{side}:' to authenticate with a key"
    )
}

/// A metafile passed on the command line does not exist.
pub fn metafile_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Metafile not found: {path}\n\n\
         hint: Check the path is relative to the current directory",
        path = path.display()
    )
}

/// A `--set` override is malformed.
pub fn invalid_set(expression: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Invalid --set value: '{expression}'\n\n\
         hint: Use dot-separated keys, e.g. --set image.tag=1.2.0\n\
         hint: Values are parsed as YAML scalars; quote strings that look like numbers"
    )
}

/// `--only` names a file the metafile does not declare.
pub fn unknown_file(path: &str, declared: &[&str]) -> anyhow::Error {
    let hint = match find_similar(path, declared) {
        Some(similar) => format!("hint: Did you mean '{}'?", similar),
        None => format!("hint: Declared files: {}", declared.join(", ")),
    };
    anyhow::anyhow!("File '{path}' is not declared in the metafile\n\n{hint}")
}

/// The closest candidate within an edit distance of 2, if any.
pub(crate) fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&candidate| (candidate, edit_distance(input, candidate)))
        .filter(|&(candidate, distance)| {
            distance <= 2 && distance < input.len() && candidate != input
        })
        .min_by_key(|&(_, distance)| distance)
        .map(|(candidate, _)| candidate)
}

/// Levenshtein distance, two rows at a time.
fn edit_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0; b_chars.len() + 1];

    for (i, a_char) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let substitution = previous[j] + usize::from(a_char != *b_char);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_includes_hints() {
        let err = config_not_found(Path::new("config/application.yaml"));
        let msg = err.to_string();
        assert!(msg.contains("config/application.yaml"));
        assert!(msg.contains("--config"));
        assert!(msg.contains("CHART_SYNC_CONFIG"));
    }

    #[test]
    fn test_missing_secret_names_side_and_env() {
        let msg = missing_secret("destination", "CHART_SYNC_DESTINATION_SECRET").to_string();
        assert!(msg.contains("--destination-secret"));
        assert!(msg.contains("CHART_SYNC_DESTINATION_SECRET"));
    }

    #[test]
    fn test_unknown_file_suggests_similar() {
        let msg = unknown_file("value.yaml", &["values.yaml", "README.md"]).to_string();
        assert!(msg.contains("Did you mean 'values.yaml'?"));

        let msg = unknown_file("deployment.yaml", &["values.yaml"]).to_string();
        assert!(msg.contains("Declared files: values.yaml"));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("abc", ""), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("replica", "replicas"), 1);
    }

    #[test]
    fn test_find_similar() {
        let keys = ["image.tag", "image.repository", "replicas"];
        assert_eq!(find_similar("image.tags", &keys), Some("image.tag"));
        assert_eq!(find_similar("replica", &keys), Some("replicas"));
        assert_eq!(find_similar("service.port", &keys), None);
        assert_eq!(find_similar("replicas", &keys), None);
    }
}
