//! Scoped variables, `${name}` template substitution and value
//! generators.
//!
//! Lookups search scopes narrowest first:
//! STEP > CASE > SUITE > GLOBAL > SESSION.

mod generators;
mod store;
mod template;

pub use generators::{random_int, random_string, timestamp, uuid, Generator};
pub use store::{SessionSink, VariableStore};
pub use template::{TemplateResolver, VariableLookup};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifetime tier of a variable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    /// Persists for the whole run.
    Global,
    /// Cleared when a suite run starts.
    Suite,
    /// Cleared at the start of every case.
    Case,
    /// Cleared at the start of every step.
    Step,
    /// Persists for the run and is mirrored to a [`SessionSink`].
    Session,
}

impl Scope {
    /// Resolution order, narrowest first.
    pub const LOOKUP_ORDER: [Scope; 5] = [
        Scope::Step,
        Scope::Case,
        Scope::Suite,
        Scope::Global,
        Scope::Session,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Dict,
    Null,
    Any,
}

impl VariableType {
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Float,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::List,
            Value::Object(_) => Self::Dict,
        }
    }

    /// Whether `value` is a valid instance of this type. Integers are
    /// accepted where a float is declared.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Float => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            other => *other == Self::infer(value),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Null => "null",
            Self::Any => "any",
        }
    }
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    pub scope: Scope,
    /// The type was given by the caller rather than inferred, so later
    /// untyped writes are validated against it.
    #[serde(default)]
    pub declared: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
