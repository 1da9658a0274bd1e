//! Static inference of ordering dependencies between the operations
//! of an API description.
//!
//! Four independent passes produce typed edges:
//!
//! - path parameters (`/users/{id}` needs something that returns `id`),
//! - resource operation order (POST → PUT → GET → DELETE per resource),
//! - schema references (`$ref` from one schema or operation to another),
//! - body references (`userId` in a request body needs `POST /users`).
//!
//! Analysis never fails: malformed fragments and unresolvable
//! references are logged and skipped, and dependency cycles are
//! reported without removing the edges that form them.

mod body_refs;
mod cycles;
mod document;
mod naming;
mod path_params;
mod refs;
mod resources;
mod schema_refs;

pub use cycles::find_cycles;
pub use document::{ApiDescription, Endpoint, Parameter};
pub use naming::{pluralize, singularize};
pub use refs::SchemaTable;

use crate::config::AnalyzerConfig;
use crate::model::HttpMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    PathParameter,
    ResourceOperation,
    SchemaReference,
    BodyReference,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Required,
    Optional,
}

/// One end of a dependency edge.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeRef {
    Operation { method: HttpMethod, path: String },
    Schema { name: String },
}

impl NodeRef {
    pub fn operation(endpoint: &Endpoint) -> Self {
        Self::Operation {
            method: endpoint.method,
            path: endpoint.path.clone(),
        }
    }

    pub fn schema(name: impl Into<String>) -> Self {
        Self::Schema { name: name.into() }
    }

    /// `path:METHOD` for operations, `#schema` for schemas.
    pub fn key(&self) -> String {
        match self {
            Self::Operation { method, path } => format!("{path}:{method}"),
            Self::Schema { name } => format!("#{name}"),
        }
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operation { method, path } => write!(f, "{method} {path}"),
            Self::Schema { name } => write!(f, "schema {name}"),
        }
    }
}

/// `source` must happen (or exist) before `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(rename = "type")]
    pub dependency_type: DependencyType,
    pub source: NodeRef,
    pub target: NodeRef,
    #[serde(default)]
    pub field: Option<String>,
    pub strength: Strength,
    /// Always within `[0, 1]`.
    pub confidence: f64,
}

/// Full output of an analysis pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyReport {
    pub dependencies: Vec<Dependency>,
    /// Operation cycles as `path:METHOD` keys, first key repeated at
    /// the end.
    pub cycles: Vec<Vec<String>>,
    /// `$ref`s that point back into their own expansion.
    pub circular_refs: Vec<String>,
    pub unresolved_refs: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyAnalyzer {
    config: AnalyzerConfig,
}

impl DependencyAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Dependency edges of `api`, de-duplicated and sorted.
    pub fn extract_dependencies(&self, api: &ApiDescription) -> Vec<Dependency> {
        self.analyze(api).dependencies
    }

    #[instrument(skip_all, fields(endpoints = api.endpoints().len()))]
    pub fn analyze(&self, api: &ApiDescription) -> DependencyReport {
        let mut table = SchemaTable::new(api.document());
        let mut found = Vec::new();

        found.extend(path_params::extract(api, &mut table, &self.config));
        found.extend(resources::extract(api, &self.config));
        found.extend(schema_refs::extract(api, &mut table, &self.config));
        found.extend(body_refs::extract(api, &mut table, &self.config));

        let dependencies = finalize(found);
        let cycles = find_cycles(&dependencies);
        for cycle in &cycles {
            warn!(cycle = %cycle.join(" -> "), "circular dependency between operations");
        }

        info!(
            dependencies = dependencies.len(),
            cycles = cycles.len(),
            "dependency analysis finished"
        );

        DependencyReport {
            dependencies,
            cycles,
            circular_refs: table.circular().iter().cloned().collect(),
            unresolved_refs: table.unresolved().iter().cloned().collect(),
        }
    }
}

/// [`DependencyAnalyzer::extract_dependencies`] with default settings.
pub fn extract_dependencies(api: &ApiDescription) -> Vec<Dependency> {
    DependencyAnalyzer::default().extract_dependencies(api)
}

/// Clamp confidences, merge duplicate edges (keeping the highest
/// confidence and the stronger strength) and sort.
fn finalize(found: Vec<Dependency>) -> Vec<Dependency> {
    type EdgeKey = (DependencyType, NodeRef, NodeRef, Option<String>);
    let mut merged: BTreeMap<EdgeKey, Dependency> = BTreeMap::new();

    for mut dep in found {
        dep.confidence = if dep.confidence.is_finite() {
            dep.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let key = (
            dep.dependency_type,
            dep.source.clone(),
            dep.target.clone(),
            dep.field.clone(),
        );
        match merged.get_mut(&key) {
            Some(existing) => {
                existing.confidence = existing.confidence.max(dep.confidence);
                existing.strength = existing.strength.min(dep.strength);
            }
            None => {
                merged.insert(key, dep);
            }
        }
    }

    merged.into_values().collect()
}
