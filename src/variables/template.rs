use crate::error::VariableError;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .expect("failed to compile reference regex")
});

static WHOLE_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$\{([A-Za-z_][A-Za-z0-9_]*)\}$")
        .expect("failed to compile whole reference regex")
});

/// Name → value source for template substitution.
pub trait VariableLookup {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl VariableLookup for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl VariableLookup for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Rewrites `${name}` references using a [`VariableLookup`].
///
/// Unknown names are left verbatim. A referenced value that is
/// itself a template is resolved recursively; every such nested
/// substitution spends one unit of `max_depth`, and running out
/// yields [`VariableError::CircularReference`].
pub struct TemplateResolver<'a, L: ?Sized> {
    vars: &'a L,
    max_depth: usize,
}

impl<'a, L: VariableLookup + ?Sized> TemplateResolver<'a, L> {
    pub fn new(vars: &'a L, max_depth: usize) -> Self {
        Self { vars, max_depth }
    }

    pub fn resolve_string(&self, template: &str) -> Result<String, VariableError> {
        self.resolve_str(template, self.max_depth)
    }

    /// Resolve every string inside a JSON structure. Object keys are
    /// left as-is.
    ///
    /// A string consisting of exactly one known reference is replaced
    /// by the referenced value itself, keeping its JSON type.
    pub fn resolve_value(&self, value: &Value) -> Result<Value, VariableError> {
        match value {
            Value::String(s) => self.resolve_typed(s),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, item) in map {
                    out.insert(key.clone(), self.resolve_value(item)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_typed(&self, s: &str) -> Result<Value, VariableError> {
        if let Some(caps) = WHOLE_REFERENCE_RE.captures(s) {
            match self.vars.lookup(&caps[1]) {
                Some(Value::String(_)) | None => {}
                Some(typed) => return Ok(typed.clone()),
            }
        }
        self.resolve_str(s, self.max_depth).map(Value::String)
    }

    fn resolve_str(
        &self,
        template: &str,
        budget: usize,
    ) -> Result<String, VariableError> {
        if !has_reference(template) {
            return Ok(template.to_string());
        }

        let mut failure = None;
        let resolved = REFERENCE_RE.replace_all(template, |caps: &Captures| {
            let whole = caps[0].to_string();
            if failure.is_some() {
                return whole;
            }
            let name = &caps[1];
            match self.vars.lookup(name) {
                None => whole,
                Some(Value::String(inner)) if has_reference(inner) => {
                    if budget == 0 {
                        failure = Some(VariableError::CircularReference {
                            name: name.to_string(),
                            max_depth: self.max_depth,
                        });
                        return whole;
                    }
                    match self.resolve_str(inner, budget - 1) {
                        Ok(text) => text,
                        Err(err) => {
                            failure = Some(err);
                            whole
                        }
                    }
                }
                Some(value) => render(value),
            }
        });

        match failure {
            Some(err) => Err(err),
            None => Ok(resolved.into_owned()),
        }
    }
}

fn has_reference(text: &str) -> bool {
    text.contains("${") && REFERENCE_RE.is_match(text)
}

/// Text form of a value inside a larger string.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
