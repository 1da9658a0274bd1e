use super::refs::{direct_refs, ref_name};
use super::{
    ApiDescription, Dependency, DependencyType, Endpoint, NodeRef, SchemaTable, Strength,
};
use crate::config::AnalyzerConfig;
use serde_json::Value;
use tracing::debug;

/// Edges from every referenced schema to the schema or operation
/// that references it.
///
/// Also resolves every component schema once so that circular and
/// unresolvable references end up in the table's report.
pub(super) fn extract(
    api: &ApiDescription,
    table: &mut SchemaTable<'_>,
    config: &AnalyzerConfig,
) -> Vec<Dependency> {
    let mut deps = Vec::new();

    for (name, schema) in api.schemas() {
        table.resolve(schema);
        let target = NodeRef::schema(name.as_str());
        for referenced in local_refs(schema) {
            if referenced == *name {
                continue;
            }
            deps.push(edge(
                NodeRef::schema(referenced),
                target.clone(),
                None,
                Strength::Required,
                config,
            ));
        }
    }

    for endpoint in api.endpoints() {
        operation_refs(endpoint, config, &mut deps);
    }

    deps
}

fn operation_refs(endpoint: &Endpoint, config: &AnalyzerConfig, deps: &mut Vec<Dependency>) {
    let target = NodeRef::operation(endpoint);
    let mut add = |schema: &Value, field: String, strength: Strength| {
        for referenced in local_refs(schema) {
            deps.push(edge(
                NodeRef::schema(referenced),
                target.clone(),
                Some(field.clone()),
                strength,
                config,
            ));
        }
    };

    if let Some(body) = &endpoint.request_body_schema {
        add(body, "requestBody".to_string(), Strength::Required);
    }
    for param in &endpoint.parameters {
        // Swagger 2 body parameters are already covered by requestBody
        if param.location == "body" {
            continue;
        }
        if let Some(schema) = &param.schema {
            let strength = if param.required {
                Strength::Required
            } else {
                Strength::Optional
            };
            add(schema, format!("parameters.{}", param.name), strength);
        }
    }
    for (code, schema) in &endpoint.responses {
        if let Some(schema) = schema {
            add(schema, format!("responses.{code}"), Strength::Optional);
        }
    }
}

/// Names of the local schemas `schema` points at directly.
fn local_refs(schema: &Value) -> Vec<String> {
    direct_refs(schema)
        .into_iter()
        .filter_map(|reference| {
            if reference.starts_with('#') {
                Some(ref_name(&reference).to_string())
            } else {
                debug!(reference, "skipping external schema reference");
                None
            }
        })
        .collect()
}

fn edge(
    source: NodeRef,
    target: NodeRef,
    field: Option<String>,
    strength: Strength,
    config: &AnalyzerConfig,
) -> Dependency {
    Dependency {
        dependency_type: DependencyType::SchemaReference,
        source,
        target,
        field,
        strength,
        confidence: config.schema_reference_confidence,
    }
}
