//! JSONPath-style extraction of response values.
//!
//! Supported: `$.a.b`, `$.items[0].id`, `$.items.0.id`,
//! `$['key with space']`. Expressions not starting with `$.` or `$[`
//! are not extraction paths and are ignored.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

pub fn is_extract_path(expr: &str) -> bool {
    expr.starts_with("$.") || expr.starts_with("$[")
}

/// Value at `expr` inside `body`, or `None` when the expression is
/// malformed or the path is absent.
pub fn extract<'a>(body: &'a Value, expr: &str) -> Option<&'a Value> {
    let segments = parse(expr)?;
    let mut current = body;
    for segment in &segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            // numeric dotted segments index arrays (`items.0`)
            (Segment::Key(key), Value::Array(items)) => {
                items.get(key.parse::<usize>().ok()?)?
            }
            (Segment::Index(idx), Value::Array(items)) => items.get(*idx)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Apply every rule to `body`, keeping the ones that matched.
pub fn extract_all(
    body: &Value,
    rules: &BTreeMap<String, String>,
) -> BTreeMap<String, Value> {
    let mut extracted = BTreeMap::new();
    for (name, expr) in rules {
        if !is_extract_path(expr) {
            debug!(name, expr, "ignoring non-path extraction rule");
            continue;
        }
        match extract(body, expr) {
            Some(value) => {
                debug!(name, expr, ?value, "extracted value");
                extracted.insert(name.clone(), value.clone());
            }
            None => warn!(name, expr, "extraction path not found in response"),
        }
    }
    extracted
}

fn parse(expr: &str) -> Option<Vec<Segment>> {
    let mut rest = expr.strip_prefix('$')?;
    let mut segments = Vec::new();

    while !rest.is_empty() {
        if let Some(after_dot) = rest.strip_prefix('.') {
            let end = after_dot
                .find(['.', '['])
                .unwrap_or(after_dot.len());
            let key = &after_dot[..end];
            if key.is_empty() {
                return None;
            }
            segments.push(Segment::Key(key.to_string()));
            rest = &after_dot[end..];
        } else if let Some(after_bracket) = rest.strip_prefix('[') {
            let close = after_bracket.find(']')?;
            let inner = after_bracket[..close].trim();
            let quoted = inner
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .or_else(|| {
                    inner.strip_prefix('"').and_then(|s| s.strip_suffix('"'))
                });
            match quoted {
                Some(key) => segments.push(Segment::Key(key.to_string())),
                None => segments.push(Segment::Index(inner.parse().ok()?)),
            }
            rest = &after_bracket[close + 1..];
        } else {
            return None;
        }
    }

    Some(segments)
}
