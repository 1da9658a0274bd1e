use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Inlines local `$ref`s against one document.
///
/// Each reference is expanded once and memoised by its reference
/// string. A reference met again while its own expansion is still in
/// progress is a cycle: it is recorded and left as a `$ref`, which is
/// what keeps self-referential schemas finite. Unresolvable and
/// external references are left untouched as well.
pub struct SchemaTable<'a> {
    document: &'a Value,
    resolved: HashMap<String, Value>,
    in_progress: HashSet<String>,
    circular: BTreeSet<String>,
    unresolved: BTreeSet<String>,
}

impl<'a> SchemaTable<'a> {
    pub fn new(document: &'a Value) -> Self {
        Self {
            document,
            resolved: HashMap::new(),
            in_progress: HashSet::new(),
            circular: BTreeSet::new(),
            unresolved: BTreeSet::new(),
        }
    }

    /// `schema` with every resolvable local reference inlined.
    pub fn resolve(&mut self, schema: &Value) -> Value {
        match schema {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    return self.resolve_ref(reference, schema);
                }
                let mut out = Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), self.resolve(value));
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.resolve(item)).collect())
            }
            other => other.clone(),
        }
    }

    /// References that point back into their own expansion.
    pub fn circular(&self) -> &BTreeSet<String> {
        &self.circular
    }

    pub fn unresolved(&self) -> &BTreeSet<String> {
        &self.unresolved
    }

    fn resolve_ref(&mut self, reference: &str, original: &Value) -> Value {
        let Some(pointer) = reference.strip_prefix('#') else {
            debug!(reference, "not following external reference");
            return original.clone();
        };
        if let Some(done) = self.resolved.get(reference) {
            return done.clone();
        }
        if self.in_progress.contains(reference) {
            if self.circular.insert(reference.to_string()) {
                warn!(reference, "circular schema reference");
            }
            return original.clone();
        }
        let document = self.document;
        let Some(target) = document.pointer(pointer) else {
            if self.unresolved.insert(reference.to_string()) {
                warn!(reference, "unresolved schema reference");
            }
            return original.clone();
        };

        self.in_progress.insert(reference.to_string());
        let expanded = self.resolve(target);
        self.in_progress.remove(reference);
        self.resolved.insert(reference.to_string(), expanded.clone());
        expanded
    }
}

/// Name a reference points at: `#/components/schemas/User` → `User`.
pub fn ref_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

/// Every `$ref` string appearing anywhere inside `schema`, without
/// following them.
pub fn direct_refs(schema: &Value) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    collect_refs(schema, &mut refs);
    refs
}

fn collect_refs(value: &Value, refs: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                refs.insert(reference.clone());
            }
            for (key, nested) in map {
                if key != "$ref" {
                    collect_refs(nested, refs);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_refs(item, refs)),
        _ => {}
    }
}
