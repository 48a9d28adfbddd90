//! Minimal `{{ ... }}` interpolation against an [`ExecutionContext`].
//!
//! Two expression forms are understood:
//!
//! - `{{path.to.value}}`: the value at that path. Strings are inserted
//!   verbatim, numbers and booleans as text, objects and arrays as compact
//!   JSON, `null` as nothing.
//! - `{{json path.to.value}}`: the value serialised as indented JSON.
//!
//! Paths are dot-separated identifiers or array indices; nothing else is
//! evaluated. An unresolvable path renders as the empty string. Anything
//! between braces that is not a well-formed expression is copied through
//! untouched, as is an unterminated `{{`.

use serde_json::Value;

use crate::ExecutionContext;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

enum Expr<'t> {
    Lookup(&'t str),
    Json(&'t str),
}

/// Render `template` against `context`.
pub fn render(template: &str, context: &ExecutionContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];

        let Some(end) = after_open.find(CLOSE) else {
            out.push_str(&rest[start..]);
            return out;
        };

        let raw = &after_open[..end];
        match parse(raw) {
            Some(Expr::Lookup(path)) => {
                if let Some(value) = context.lookup(path) {
                    push_plain(&mut out, value);
                }
            }
            Some(Expr::Json(path)) => {
                if let Some(value) = context.lookup(path) {
                    // Serialising a `Value` cannot fail.
                    out.push_str(&serde_json::to_string_pretty(value).unwrap_or_default());
                }
            }
            None => {
                out.push_str(OPEN);
                out.push_str(raw);
                out.push_str(CLOSE);
            }
        }

        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    out
}

fn parse(raw: &str) -> Option<Expr<'_>> {
    let expr = raw.trim();
    if let Some(path) = expr.strip_prefix("json") {
        if path.starts_with(char::is_whitespace) {
            let path = path.trim();
            return is_path(path).then_some(Expr::Json(path));
        }
    }
    is_path(expr).then_some(Expr::Lookup(expr))
}

fn is_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '-'))
        })
}

fn push_plain(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Array(_) | Value::Object(_) => out.push_str(&value.to_string()),
    }
}
