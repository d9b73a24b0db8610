// src/template.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Result, WatcherError};

/// Block and comment delimiters of fuller template languages. Prompts using
/// them cannot be rendered faithfully and are rejected.
const UNSUPPORTED_TAGS: &[&str] = &["{%", "{#"];

/// Name under which the whole document is also reachable, e.g. `{{ ctx.message }}`.
pub const CONTEXT_BINDING: &str = "ctx";

static PATH_EXPR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_@][A-Za-z0-9_@\-]*(\.[A-Za-z0-9_@\-]+)*$")
        .expect("Failed to compile template path regex")
});

/// Builds the rendering context for a document's fields: the fields themselves
/// plus a `ctx` alias pointing at all of them.
pub fn document_context(fields: Map<String, Value>) -> Map<String, Value> {
    if fields.contains_key(CONTEXT_BINDING) {
        return fields;
    }
    let mut context = fields.clone();
    context.insert(CONTEXT_BINDING.to_string(), Value::Object(fields));
    context
}

/// Substitutes every `{{ path }}` in `template` with the value found at the
/// dot-separated `path` in `fields`.
///
/// Strings are inserted verbatim, `null` as an empty string, other scalars as
/// their JSON text and objects/arrays as compact JSON. Undefined paths and
/// malformed placeholders fail with [`WatcherError::TemplateError`], as do
/// `{% ... %}` blocks and `{# ... #}` comments.
pub fn render(template: &str, fields: &Map<String, Value>) -> Result<String> {
    if let Some((offset, tag)) = UNSUPPORTED_TAGS
        .iter()
        .filter_map(|tag| template.find(tag).map(|offset| (offset, *tag)))
        .min()
    {
        return Err(WatcherError::TemplateError(format!(
            "unsupported tag '{}' at byte {}, only {{{{ field }}}} placeholders are allowed",
            tag, offset
        )));
    }

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        rendered.push_str(&rest[..open]);
        let offset = template.len() - rest.len() + open;
        let after_open = &rest[open + 2..];

        let close = after_open.find("}}").ok_or_else(|| {
            WatcherError::TemplateError(format!("unclosed '{{{{' at byte {}", offset))
        })?;
        let expr = after_open[..close].trim();

        if expr.is_empty() {
            return Err(WatcherError::TemplateError(format!(
                "empty expression at byte {}",
                offset
            )));
        }
        if !PATH_EXPR.is_match(expr) {
            return Err(WatcherError::TemplateError(format!(
                "invalid expression '{}' at byte {}",
                expr, offset
            )));
        }

        let value = lookup(fields, expr).ok_or_else(|| {
            WatcherError::TemplateError(format!("'{}' is undefined", expr))
        })?;
        push_value(&mut rendered, value);

        rest = &after_open[close + 2..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}

fn lookup<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Null => {}
        other => out.push_str(&other.to_string()),
    }
}
