//! Go `text/template` actions rewritten as MiniJinja syntax
//!
//! Every `{{ ... }}` action is lexed and parsed as a Go pipeline. Control
//! actions (`if`, `else`, `range`, `with`, `end`) and variable declarations
//! become MiniJinja blocks. Other pipelines become expressions, with the Go
//! builtins (`eq`, `and`, `len`, `index`, ...) mapped to operators and
//! anything else piped into a filter of the same name.
//!
//! An action that does not parse as a Go pipeline is handed to MiniJinja
//! with only the leading dots of its field references removed, so plain
//! Jinja expressions such as `{{ items[0] }}` keep working.

use std::sync::LazyLock;

use minijinja::value::{Value, ValueKind};
use regex::Regex;

static DOT_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[\s(|,{\[!=<>+*/-])\.([A-Za-z_])")
        .unwrap_or_else(|e| panic!("invalid field regex: {}", e))
});

const KEYWORDS: &[&str] = &[
    "if", "else", "end", "range", "with", "define", "template", "block", "break", "continue",
];

/// Go builtins (plus `default` and `quote`) that take their arguments
/// unpiped, as in `{{ eq .Values.a 1 }}`.
const FUNCTIONS: &[&str] = &[
    "and", "or", "not", "eq", "ne", "lt", "le", "gt", "ge", "len", "index", "print", "println",
    "default", "quote", "html", "urlquery",
];

/// Rewrite `source` into a MiniJinja template.
pub(crate) fn translate(source: &str) -> Result<String, String> {
    let mut translator = Translator::default();
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let end = action_end(body).ok_or_else(|| "unclosed action".to_string())?;
        translator.action(&body[..end], &mut out)?;
        rest = &body[end + 2..];
    }
    out.push_str(rest);

    match translator.scopes.last() {
        Some(scope) => Err(format!(
            "unexpected EOF: missing {{{{ end }}}} for {{{{ {} }}}}",
            scope.kind.keyword()
        )),
        None => Ok(out),
    }
}

/// Byte offset of the `}}` closing an action, skipping string literals and
/// comments.
fn action_end(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let close = body[i + 2..].find("*/")?;
                i += close + 3;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

#[derive(Debug, Clone, Copy)]
struct Trim {
    left: bool,
    right: bool,
}

impl Trim {
    fn block(self, body: &str) -> String {
        format!("{{%{} {} {}%}}", dash(self.left), body, dash(self.right))
    }

    fn expr(self, body: &str) -> String {
        format!("{{{{{} {} {}}}}}", dash(self.left), body, dash(self.right))
    }

    fn left_only(self) -> Self {
        Self {
            left: self.left,
            right: false,
        }
    }

    fn right_only(self) -> Self {
        Self {
            left: false,
            right: self.right,
        }
    }
}

fn dash(on: bool) -> &'static str {
    if on {
        "-"
    } else {
        ""
    }
}

/// Split Go trim markers (`{{- ` and ` -}}`) off an action body.
fn split_trim(inner: &str) -> (Trim, &str) {
    let mut body = inner;
    let left = body.starts_with('-') && body[1..].starts_with(char::is_whitespace);
    if left {
        body = &body[1..];
    }
    let right = body.len() > 1
        && body.ends_with('-')
        && body[..body.len() - 1].ends_with(char::is_whitespace);
    if right {
        body = &body[..body.len() - 1];
    }
    (Trim { left, right }, body.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    If,
    Range,
    With,
}

impl ScopeKind {
    fn keyword(self) -> &'static str {
        match self {
            ScopeKind::If => "if",
            ScopeKind::Range => "range",
            ScopeKind::With => "with",
        }
    }
}

/// An open `if`, `range` or `with`. `dot` is what `.` means inside the
/// block; `outer` is what it means in an `else` branch.
#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    dot: String,
    outer: String,
    in_else: bool,
}

#[derive(Debug, Default)]
struct Translator {
    scopes: Vec<Scope>,
    counter: usize,
}

impl Translator {
    fn current_dot(&self) -> String {
        self.scopes
            .last()
            .map(|scope| {
                if scope.in_else {
                    scope.outer.clone()
                } else {
                    scope.dot.clone()
                }
            })
            .unwrap_or_default()
    }

    fn action(&mut self, inner: &str, out: &mut String) -> Result<(), String> {
        let (trim, body) = split_trim(inner);
        if body.starts_with("/*") && body.ends_with("*/") {
            out.push_str(&format!("{{#{} {}#}}", dash(trim.left), dash(trim.right)));
            return Ok(());
        }

        let tokens = lex(body);
        let leading = body
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .next()
            .unwrap_or_default();
        let is_declaration = matches!(
            tokens.as_deref(),
            Some(
                [Token {
                    tok: Tok::Var(_),
                    ..
                }, Token {
                    tok: Tok::Declare | Tok::Assign,
                    ..
                }, ..]
            )
        );

        if KEYWORDS.contains(&leading) || is_declaration {
            let tokens =
                tokens.ok_or_else(|| format!("unexpected character in {{{{ {} }}}}", body))?;
            out.push_str(&self.control(leading, &tokens, trim)?);
            return Ok(());
        }

        let dot = self.current_dot();
        match tokens.and_then(|tokens| expression(&tokens, &dot).ok()) {
            Some(expr) => out.push_str(&trim.expr(&expr)),
            None => {
                out.push_str("{{");
                out.push_str(&DOT_FIELD.replace_all(inner, "$1$2"));
                out.push_str("}}");
            }
        }
        Ok(())
    }

    fn control(&mut self, keyword: &str, tokens: &[Token], trim: Trim) -> Result<String, String> {
        let dot = self.current_dot();
        if let [Token { tok: Tok::Var(name), .. }, _, rest @ ..] = tokens {
            if name.is_empty() {
                return Err("cannot assign to $".to_string());
            }
            let value = expression(rest, &dot)?;
            return Ok(trim.block(&format!("set {} = {}", variable(name), value)));
        }

        match keyword {
            "if" => {
                let condition = expression(&tokens[1..], &dot)?;
                self.scopes.push(Scope {
                    kind: ScopeKind::If,
                    dot: dot.clone(),
                    outer: dot,
                    in_else: false,
                });
                Ok(trim.block(&format!("if {}", condition)))
            }
            "else" => self.else_branch(&tokens[1..], trim),
            "end" => {
                if tokens.len() > 1 {
                    return Err("unexpected arguments to {{ end }}".to_string());
                }
                let scope = self
                    .scopes
                    .pop()
                    .ok_or_else(|| "unexpected {{ end }}".to_string())?;
                Ok(match scope.kind {
                    ScopeKind::If => trim.block("endif"),
                    ScopeKind::Range => trim.block("endfor"),
                    ScopeKind::With => format!(
                        "{}{}",
                        trim.left_only().block("endif"),
                        trim.right_only().block("endwith")
                    ),
                })
            }
            "range" => self.range(&tokens[1..], dot, trim),
            "with" => self.with(&tokens[1..], dot, trim),
            other => Err(format!("{{{{ {} }}}} is not supported", other)),
        }
    }

    fn else_branch(&mut self, tokens: &[Token], trim: Trim) -> Result<String, String> {
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| "unexpected {{ else }}".to_string())?;
        if scope.in_else {
            return Err("unexpected {{ else }} after {{ else }}".to_string());
        }
        match tokens {
            [] => {
                scope.in_else = true;
                Ok(trim.block("else"))
            }
            [Token { tok: Tok::Ident(word), .. }, rest @ ..] if word == "if" => {
                if scope.kind != ScopeKind::If {
                    return Err(format!(
                        "{{{{ else if }}}} inside {{{{ {} }}}} is not supported",
                        scope.kind.keyword()
                    ));
                }
                let condition = expression(rest, &scope.outer)?;
                Ok(trim.block(&format!("elif {}", condition)))
            }
            _ => Err("unexpected arguments to {{ else }}".to_string()),
        }
    }

    fn range(&mut self, tokens: &[Token], dot: String, trim: Trim) -> Result<String, String> {
        let (vars, rest) = declared_variables(tokens);
        let source = expression(rest, &dot)?;
        self.counter += 1;
        let (head, item) = match vars.as_slice() {
            [key, value] => (
                format!(
                    "for {}, {} in ({})|go_pairs",
                    variable(key),
                    variable(value),
                    source
                ),
                variable(value),
            ),
            [value] => (
                format!("for {} in ({})|go_range", variable(value), source),
                variable(value),
            ),
            _ => {
                let item = format!("item_{}", self.counter);
                (format!("for {} in ({})|go_range", item, source), item)
            }
        };
        self.scopes.push(Scope {
            kind: ScopeKind::Range,
            dot: item,
            outer: dot,
            in_else: false,
        });
        Ok(trim.block(&head))
    }

    fn with(&mut self, tokens: &[Token], dot: String, trim: Trim) -> Result<String, String> {
        let (vars, rest) = declared_variables(tokens);
        if vars.len() > 1 {
            return Err("too many declarations in {{ with }}".to_string());
        }
        let value = expression(rest, &dot)?;
        self.counter += 1;
        let name = match vars.first() {
            Some(var) => variable(var),
            None => format!("with_{}", self.counter),
        };
        let head = format!(
            "{}{}",
            trim.left_only().block(&format!("with {} = {}", name, value)),
            trim.right_only().block(&format!("if {}", name))
        );
        self.scopes.push(Scope {
            kind: ScopeKind::With,
            dot: name,
            outer: dot,
            in_else: false,
        });
        Ok(head)
    }
}

/// `$i, $v :=` or `$v :=` at the start of a `range`/`with` pipeline.
fn declared_variables(tokens: &[Token]) -> (Vec<String>, &[Token]) {
    match tokens {
        [Token {
            tok: Tok::Var(key), ..
        }, Token {
            tok: Tok::Comma, ..
        }, Token {
            tok: Tok::Var(value),
            ..
        }, Token {
            tok: Tok::Declare, ..
        }, rest @ ..] => (vec![key.clone(), value.clone()], rest),
        [Token {
            tok: Tok::Var(value),
            ..
        }, Token {
            tok: Tok::Declare, ..
        }, rest @ ..] => (vec![value.clone()], rest),
        _ => (Vec::new(), tokens),
    }
}

fn variable(name: &str) -> String {
    format!("var_{}", name)
}

fn join_field(base: &str, field: &str) -> String {
    if base.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", base, field)
    }
}

/// Translate a whole token list as one pipeline.
fn expression(tokens: &[Token], dot: &str) -> Result<String, String> {
    if tokens.is_empty() {
        return Err("missing value".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        dot: dot.to_string(),
    };
    let expr = parser.pipeline()?;
    if parser.pos < tokens.len() {
        return Err(format!("unexpected {:?}", tokens[parser.pos].tok));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    /// `.name`
    Field(String),
    /// A bare `.`
    Dot,
    /// `$name`, or `$` alone with an empty name
    Var(String),
    Ident(String),
    /// A string literal, already in MiniJinja syntax
    Str(String),
    Number(String),
    LParen,
    RParen,
    Pipe,
    Comma,
    Declare,
    Assign,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    tok: Tok,
    /// Whether whitespace precedes the token; `.a .b` is two operands,
    /// `.a.b` one.
    spaced: bool,
}

fn word_end(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    i
}

/// Lex a Go pipeline. `None` when the text uses anything outside the Go
/// action grammar.
fn lex(body: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut spaced = true;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            spaced = true;
            i += 1;
            continue;
        }
        let start = i;
        let next = chars.get(i + 1).copied();
        let tok = match c {
            '.' => {
                i = word_end(&chars, i + 1);
                let name: String = chars[start + 1..i].iter().collect();
                if name.is_empty() {
                    Tok::Dot
                } else {
                    Tok::Field(name)
                }
            }
            '$' => {
                i = word_end(&chars, i + 1);
                Tok::Var(chars[start + 1..i].iter().collect())
            }
            '"' => {
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return None,
                        Some('\\') => i += 2,
                        Some('"') => break,
                        Some(_) => i += 1,
                    }
                }
                i += 1;
                Tok::Str(chars[start..i].iter().collect())
            }
            '`' => {
                let close = chars[i + 1..].iter().position(|&ch| ch == '`')?;
                let raw: String = chars[i + 1..i + 1 + close].iter().collect();
                i += close + 2;
                Tok::Str(quote_literal(&raw))
            }
            '(' => {
                i += 1;
                Tok::LParen
            }
            ')' => {
                i += 1;
                Tok::RParen
            }
            '|' if next != Some('|') => {
                i += 1;
                Tok::Pipe
            }
            ',' => {
                i += 1;
                Tok::Comma
            }
            ':' if next == Some('=') => {
                i += 2;
                Tok::Declare
            }
            '=' if next != Some('=') => {
                i += 1;
                Tok::Assign
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '+') && next.is_some_and(|n| n.is_ascii_digit())) =>
            {
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_')
                {
                    i += 1;
                }
                Tok::Number(chars[start..i].iter().collect())
            }
            c if c.is_alphabetic() || c == '_' => {
                i = word_end(&chars, i);
                Tok::Ident(chars[start..i].iter().collect())
            }
            _ => return None,
        };
        tokens.push(Token { tok, spaced });
        spaced = false;
    }
    Some(tokens)
}

/// Render a raw string as a double-quoted MiniJinja literal.
fn quote_literal(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for c in raw.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    dot: String,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn starts_operand(&self) -> bool {
        matches!(
            self.peek().map(|token| &token.tok),
            Some(
                Tok::Field(_)
                    | Tok::Dot
                    | Tok::Var(_)
                    | Tok::Ident(_)
                    | Tok::Str(_)
                    | Tok::Number(_)
                    | Tok::LParen
            )
        )
    }

    fn pipeline(&mut self) -> Result<String, String> {
        let mut value = self.command(None)?;
        while matches!(self.peek(), Some(Token { tok: Tok::Pipe, .. })) {
            self.pos += 1;
            value = self.command(Some(value))?;
        }
        Ok(value)
    }

    fn command(&mut self, piped: Option<String>) -> Result<String, String> {
        if let Some(Token {
            tok: Tok::Ident(name),
            ..
        }) = self.peek()
        {
            let is_path = matches!(
                self.tokens.get(self.pos + 1),
                Some(Token {
                    tok: Tok::Field(_),
                    spaced: false
                })
            );
            let is_literal = matches!(name.as_str(), "true" | "false" | "nil");
            if !is_path && !is_literal && (piped.is_some() || FUNCTIONS.contains(&name.as_str()))
            {
                self.pos += 1;
                let mut args = Vec::new();
                while self.starts_operand() {
                    args.push(self.operand()?);
                }
                args.extend(piped);
                return call(name, args);
            }
        }

        if piped.is_some() {
            return Err("can't pipe a value into a non-function".to_string());
        }
        let value = self.operand()?;
        if self.starts_operand() {
            return Err(format!("can't give argument to non-function {}", value));
        }
        Ok(value)
    }

    fn operand(&mut self) -> Result<String, String> {
        let token = self
            .bump()
            .ok_or_else(|| "missing value for command".to_string())?;
        let mut expr = match &token.tok {
            Tok::Dot => {
                if self.dot.is_empty() {
                    return Err("'.' is only supported inside range or with".to_string());
                }
                self.dot.clone()
            }
            Tok::Field(name) => join_field(&self.dot, name),
            Tok::Var(name) if name.is_empty() => String::new(),
            Tok::Var(name) => variable(name),
            Tok::Ident(name) if name == "nil" => "none".to_string(),
            Tok::Ident(text) | Tok::Str(text) | Tok::Number(text) => text.clone(),
            Tok::LParen => {
                let inner = self.pipeline()?;
                match self.bump() {
                    // Calls already carry their own parentheses.
                    Some(Token {
                        tok: Tok::RParen, ..
                    }) => inner,
                    _ => return Err("unclosed left paren".to_string()),
                }
            }
            other => return Err(format!("unexpected {:?} in operand", other)),
        };
        while let Some(Token {
            tok: Tok::Field(name),
            spaced: false,
        }) = self.peek()
        {
            self.pos += 1;
            expr = join_field(&expr, name);
        }
        if expr.is_empty() {
            return Err("'$' is only supported with a field, as in $.Values".to_string());
        }
        Ok(expr)
    }
}

fn exactly(name: &str, args: &[String], count: usize) -> Result<(), String> {
    if args.len() == count {
        Ok(())
    } else {
        Err(format!(
            "wrong number of args for {}: want {} got {}",
            name,
            count,
            args.len()
        ))
    }
}

fn at_least(name: &str, args: &[String], count: usize) -> Result<(), String> {
    if args.len() >= count {
        Ok(())
    } else {
        Err(format!(
            "wrong number of args for {}: want at least {} got {}",
            name,
            count,
            args.len()
        ))
    }
}

/// A function call; a piped value is already the last argument.
fn call(name: &str, mut args: Vec<String>) -> Result<String, String> {
    match name {
        "and" | "or" => {
            at_least(name, &args, 1)?;
            Ok(format!("({})", args.join(&format!(" {} ", name))))
        }
        "not" => {
            exactly(name, &args, 1)?;
            Ok(format!("(not {})", args[0]))
        }
        "eq" => {
            at_least(name, &args, 2)?;
            let tests: Vec<String> = args[1..]
                .iter()
                .map(|other| format!("{} == {}", args[0], other))
                .collect();
            Ok(format!("({})", tests.join(" or ")))
        }
        "ne" | "lt" | "le" | "gt" | "ge" => {
            exactly(name, &args, 2)?;
            let op = match name {
                "ne" => "!=",
                "lt" => "<",
                "le" => "<=",
                "gt" => ">",
                _ => ">=",
            };
            Ok(format!("({} {} {})", args[0], op, args[1]))
        }
        "len" => {
            exactly(name, &args, 1)?;
            Ok(format!("({}|length)", args[0]))
        }
        "index" => {
            at_least(name, &args, 1)?;
            let keys: String = args[1..].iter().map(|key| format!("[{}]", key)).collect();
            Ok(format!("{}{}", args[0], keys))
        }
        "print" => Ok(match args.len() {
            0 => "\"\"".to_string(),
            1 => format!("({}|string)", args[0]),
            _ => format!("({})", args.join(" ~ ")),
        }),
        "println" => {
            if args.is_empty() {
                args.push("\"\"".to_string());
            }
            Ok(format!("({} ~ \"\\n\")", args.join(" ~ \" \" ~ ")))
        }
        "default" => {
            exactly(name, &args, 2)?;
            Ok(format!("({}|go_default({}))", args[1], args[0]))
        }
        _ => {
            let filter = match name {
                "html" => "escape",
                "urlquery" => "urlencode",
                other => other,
            };
            let input = args
                .pop()
                .ok_or_else(|| format!("function {} needs an argument", name))?;
            if args.is_empty() {
                Ok(format!("({}|{})", input, filter))
            } else {
                Ok(format!("({}|{}({}))", input, filter, args.join(", ")))
            }
        }
    }
}

/// Items visited by `range`: the values of a map in key order, the elements
/// of a sequence, nothing for a missing value.
pub(crate) fn go_range(value: Value) -> Result<Value, minijinja::Error> {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Ok(Value::from(Vec::<Value>::new())),
        ValueKind::Map => {
            let items = value
                .try_iter()?
                .map(|key| value.get_item(&key))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::from(items))
        }
        _ => Ok(Value::from(value.try_iter()?.collect::<Vec<_>>())),
    }
}

/// `[key, value]` pairs for `range $k, $v := ...`; sequences are keyed by
/// index.
pub(crate) fn go_pairs(value: Value) -> Result<Value, minijinja::Error> {
    let pairs: Vec<Value> = match value.kind() {
        ValueKind::Undefined | ValueKind::None => Vec::new(),
        ValueKind::Map => value
            .try_iter()?
            .map(|key| -> Result<Value, minijinja::Error> {
                let item = value.get_item(&key)?;
                Ok(Value::from(vec![key, item]))
            })
            .collect::<Result<_, _>>()?,
        _ => value
            .try_iter()?
            .enumerate()
            .map(|(index, item)| Value::from(vec![Value::from(index as i64), item]))
            .collect(),
    };
    Ok(Value::from(pairs))
}

/// `fallback` when `value` is missing, empty, zero or false.
pub(crate) fn go_default(value: Value, fallback: Value) -> Value {
    if value.is_true() {
        value
    } else {
        fallback
    }
}
