use super::generators::Generator;
use super::template::{TemplateResolver, VariableLookup};
use super::{Scope, Variable, VariableType};
use crate::error::VariableError;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Receives the SESSION scope after every mutation of it.
pub trait SessionSink: Send + Sync {
    fn persist(&self, variables: &HashMap<String, Variable>);
}

/// Variables partitioned into scopes.
///
/// One store belongs to one suite run; it is not meant to be shared
/// between concurrent runs.
pub struct VariableStore {
    scopes: HashMap<Scope, HashMap<String, Variable>>,
    session_sink: Option<Arc<dyn SessionSink>>,
    max_depth: usize,
}

impl std::fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableStore")
            .field("scopes", &self.scopes)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableStore {
    pub fn new() -> Self {
        Self {
            scopes: HashMap::new(),
            session_sink: None,
            max_depth: 10,
        }
    }

    pub fn with_session_sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.session_sink = Some(sink);
        self
    }

    /// Recursion budget for template resolution.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Write a variable.
    ///
    /// With `var_type` omitted, the type is inferred unless the name
    /// already carries a declared type in this scope, in which case
    /// the value is checked against it.
    pub fn set(
        &mut self,
        name: &str,
        value: Value,
        scope: Scope,
        var_type: Option<VariableType>,
    ) -> Result<(), VariableError> {
        let vars = self.scopes.entry(scope).or_default();
        let existing = vars.get(name);
        let declared = var_type.or_else(|| {
            existing.filter(|v| v.declared).map(|v| v.var_type)
        });

        let resolved_type = match declared {
            Some(expected) if !expected.accepts(&value) => {
                return Err(VariableError::TypeMismatch {
                    name: name.to_string(),
                    expected: expected.to_string(),
                    actual: VariableType::infer(&value).to_string(),
                });
            }
            Some(expected) => expected,
            None => VariableType::infer(&value),
        };

        let now = Utc::now();
        let created_at = existing.map(|v| v.created_at).unwrap_or(now);
        debug!(name, ?scope, var_type = %resolved_type, "set variable");
        vars.insert(
            name.to_string(),
            Variable {
                name: name.to_string(),
                value,
                var_type: resolved_type,
                scope,
                declared: declared.is_some(),
                created_at,
                updated_at: now,
            },
        );

        if scope == Scope::Session {
            self.persist_session();
        }
        Ok(())
    }

    /// Value of `name` from the narrowest scope that holds it.
    pub fn get(&self, name: &str) -> Result<&Value, VariableError> {
        self.lookup(name).ok_or_else(|| VariableError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn get_or(&self, name: &str, default: Value) -> Value {
        self.lookup(name).cloned().unwrap_or(default)
    }

    /// The full variable record `name` resolves to.
    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        Scope::LOOKUP_ORDER
            .iter()
            .find_map(|scope| self.scopes.get(scope)?.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_variable(name).is_some()
    }

    pub fn remove(&mut self, name: &str, scope: Scope) -> Option<Variable> {
        let removed = self.scopes.get_mut(&scope)?.remove(name);
        if removed.is_some() && scope == Scope::Session {
            self.persist_session();
        }
        removed
    }

    /// Empty exactly one scope.
    pub fn clear_scope(&mut self, scope: Scope) {
        if let Some(vars) = self.scopes.get_mut(&scope) {
            if !vars.is_empty() {
                debug!(?scope, count = vars.len(), "clearing scope");
            }
            vars.clear();
        }
        if scope == Scope::Session {
            self.persist_session();
        }
    }

    /// Variables held directly in `scope`.
    pub fn scope_variables(&self, scope: Scope) -> Vec<&Variable> {
        let mut vars: Vec<&Variable> = self
            .scopes
            .get(&scope)
            .map(|vars| vars.values().collect())
            .unwrap_or_default();
        vars.sort_by(|a, b| a.name.cmp(&b.name));
        vars
    }

    /// Every visible name with the value that currently wins.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        let mut visible = HashMap::new();
        for scope in Scope::LOOKUP_ORDER.iter().rev() {
            if let Some(vars) = self.scopes.get(scope) {
                for (name, var) in vars {
                    visible.insert(name.clone(), var.value.clone());
                }
            }
        }
        visible
    }

    pub fn resolve_string(&self, template: &str) -> Result<String, VariableError> {
        self.resolve_string_with_depth(template, self.max_depth)
    }

    pub fn resolve_string_with_depth(
        &self,
        template: &str,
        max_depth: usize,
    ) -> Result<String, VariableError> {
        TemplateResolver::new(self, max_depth).resolve_string(template)
    }

    pub fn resolve_object(&self, value: &Value) -> Result<Value, VariableError> {
        self.resolve_object_with_depth(value, self.max_depth)
    }

    pub fn resolve_object_with_depth(
        &self,
        value: &Value,
        max_depth: usize,
    ) -> Result<Value, VariableError> {
        TemplateResolver::new(self, max_depth).resolve_value(value)
    }

    /// Produce a generated value, optionally storing it under a name.
    pub fn generate(
        &mut self,
        generator: &Generator,
        store_as: Option<(&str, Scope)>,
    ) -> Result<Value, VariableError> {
        let value = generator.generate()?;
        if let Some((name, scope)) = store_as {
            self.set(name, value.clone(), scope, None)?;
        }
        Ok(value)
    }

    fn persist_session(&self) {
        if let Some(sink) = &self.session_sink {
            let empty = HashMap::new();
            let session = self.scopes.get(&Scope::Session).unwrap_or(&empty);
            sink.persist(session);
        }
    }
}

impl VariableLookup for VariableStore {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get_variable(name).map(|var| &var.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_narrower_scope_shadows_wider() {
        let mut store = VariableStore::new();
        store.set("name", json!("v1"), Scope::Global, None).unwrap();
        store.set("name", json!("v2"), Scope::Step, None).unwrap();
        assert_eq!(store.get("name").unwrap(), &json!("v2"));

        store.clear_scope(Scope::Step);
        assert_eq!(store.get("name").unwrap(), &json!("v1"));
    }

    #[test]
    fn test_lookup_order_covers_every_scope() {
        let mut store = VariableStore::new();
        for (i, scope) in Scope::LOOKUP_ORDER.iter().rev().enumerate() {
            store.set("x", json!(i), *scope, None).unwrap();
        }
        // Session, Global, Suite, Case, Step were written in that order
        assert_eq!(store.get_variable("x").unwrap().scope, Scope::Step);
        store.clear_scope(Scope::Step);
        assert_eq!(store.get_variable("x").unwrap().scope, Scope::Case);
        store.clear_scope(Scope::Case);
        assert_eq!(store.get_variable("x").unwrap().scope, Scope::Suite);
        store.clear_scope(Scope::Suite);
        assert_eq!(store.get_variable("x").unwrap().scope, Scope::Global);
        store.clear_scope(Scope::Global);
        assert_eq!(store.get_variable("x").unwrap().scope, Scope::Session);
    }

    #[test]
    fn test_missing_variable_and_default() {
        let store = VariableStore::new();
        assert_eq!(
            store.get("nope").unwrap_err(),
            VariableError::NotFound { name: "nope".into() }
        );
        assert_eq!(store.get_or("nope", json!(5)), json!(5));
    }

    #[test]
    fn test_declared_type_is_enforced() {
        let mut store = VariableStore::new();
        let err = store
            .set("count", json!("three"), Scope::Case, Some(VariableType::Integer))
            .unwrap_err();
        assert!(matches!(err, VariableError::TypeMismatch { .. }));

        store
            .set("count", json!(3), Scope::Case, Some(VariableType::Integer))
            .unwrap();
        // later untyped writes keep the declared type
        assert!(store.set("count", json!("four"), Scope::Case, None).is_err());
        store.set("count", json!(4), Scope::Case, None).unwrap();
        assert_eq!(store.get_variable("count").unwrap().var_type, VariableType::Integer);
    }

    #[test]
    fn test_inferred_type_can_change_on_overwrite() {
        let mut store = VariableStore::new();
        store.set("v", json!(1), Scope::Step, None).unwrap();
        store.set("v", json!("one"), Scope::Step, None).unwrap();
        let var = store.get_variable("v").unwrap();
        assert_eq!(var.var_type, VariableType::String);
        assert!(var.updated_at >= var.created_at);
    }

    #[test]
    fn test_clear_scope_only_touches_that_scope() {
        let mut store = VariableStore::new();
        store.set("a", json!(1), Scope::Case, None).unwrap();
        store.set("b", json!(2), Scope::Suite, None).unwrap();
        store.clear_scope(Scope::Case);
        assert!(!store.contains("a"));
        assert!(store.contains("b"));
    }

    #[test]
    fn test_resolution_through_store() {
        let mut store = VariableStore::new();
        store.set("a", json!("x"), Scope::Step, None).unwrap();
        store.set("b", json!("y"), Scope::Step, None).unwrap();
        assert_eq!(store.resolve_string("${a}-${b}").unwrap(), "x-y");

        store.set("a", json!("${b}"), Scope::Case, None).unwrap();
        store.set("b", json!("${a}"), Scope::Case, None).unwrap();
        store.clear_scope(Scope::Step);
        assert!(matches!(
            store.resolve_string("${a}"),
            Err(VariableError::CircularReference { .. })
        ));
    }

    #[test]
    fn test_generate_with_side_effect() {
        let mut store = VariableStore::new();
        let value = store
            .generate(&Generator::RandomInt { min: 5, max: 5 }, Some(("n", Scope::Global)))
            .unwrap();
        assert_eq!(value, json!(5));
        assert_eq!(store.get("n").unwrap(), &json!(5));

        store.generate(&Generator::Uuid, None).unwrap();
        assert_eq!(store.snapshot().len(), 1);
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<usize>>,
    }

    impl SessionSink for RecordingSink {
        fn persist(&self, variables: &HashMap<String, Variable>) {
            self.calls.lock().unwrap().push(variables.len());
        }
    }

    #[test]
    fn test_session_mutations_are_persisted() {
        let sink = Arc::new(RecordingSink::default());
        let mut store = VariableStore::new().with_session_sink(sink.clone());

        store.set("token", json!("t"), Scope::Session, None).unwrap();
        store.set("other", json!(1), Scope::Global, None).unwrap();
        store.set("user", json!("u"), Scope::Session, None).unwrap();
        store.remove("token", Scope::Session);
        store.clear_scope(Scope::Session);

        assert_eq!(*sink.calls.lock().unwrap(), vec![1, 2, 1, 0]);
    }
}
