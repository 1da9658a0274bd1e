use super::naming::{id_field_base, singularize, to_snake_case};
use super::resources::resource_of;
use super::{
    ApiDescription, Dependency, DependencyType, Endpoint, NodeRef, SchemaTable, Strength,
};
use crate::config::AnalyzerConfig;
use crate::model::HttpMethod;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Properties nested deeper than this are not searched.
const MAX_SCHEMA_DEPTH: usize = 6;

/// One edge per `{param}` from every operation that can supply it.
///
/// Suppliers must return the parameter as a response property and must
/// not need it themselves. Suppliers on the same resource win over
/// unrelated ones, and creating (POST) suppliers over the rest.
///
/// The resource filter is applied before the POST preference, so a GET
/// on the target's own resource outranks a POST on an unrelated one.
pub(super) fn extract(
    api: &ApiDescription,
    table: &mut SchemaTable<'_>,
    config: &AnalyzerConfig,
) -> Vec<Dependency> {
    let mut deps = Vec::new();

    for target in api.endpoints() {
        for param in target.path_params() {
            let suppliers: Vec<&Endpoint> = api
                .endpoints()
                .iter()
                .filter(|source| !std::ptr::eq(*source, target))
                .filter(|source| !source.path_params().contains(&param))
                .filter(|source| supplies(source, param, table))
                .collect();
            if suppliers.is_empty() {
                debug!(path = %target.path, param, "no operation supplies path parameter");
                continue;
            }

            let resource = resource_of(&target.path);
            let related: Vec<&Endpoint> = suppliers
                .iter()
                .copied()
                .filter(|source| resource.is_some() && resource_of(&source.path) == resource)
                .collect();
            let pool = if related.is_empty() { suppliers } else { related };

            let creators: Vec<&Endpoint> = pool
                .iter()
                .copied()
                .filter(|source| source.method == HttpMethod::Post)
                .collect();
            let (sources, confidence) = if creators.is_empty() {
                (pool, config.path_param_fallback_confidence)
            } else {
                (creators, config.path_param_post_confidence)
            };

            for source in sources {
                deps.push(Dependency {
                    dependency_type: DependencyType::PathParameter,
                    source: NodeRef::operation(source),
                    target: NodeRef::operation(target),
                    field: Some(param.to_string()),
                    strength: Strength::Required,
                    confidence,
                });
            }
        }
    }

    deps
}

/// Whether a 2xx response of `endpoint` carries `param`.
///
/// `{userId}` is also satisfied by an `id` property when the endpoint
/// belongs to the `users` resource.
fn supplies(endpoint: &Endpoint, param: &str, table: &mut SchemaTable<'_>) -> bool {
    let own_id = id_field_base(param).is_some_and(|base| {
        endpoint
            .path
            .rsplit('/')
            .find(|segment| !segment.is_empty() && !segment.starts_with('{'))
            .is_some_and(|segment| singularize(&to_snake_case(segment)) == base)
    });

    endpoint.success_schemas().any(|schema| {
        let names = property_names(&table.resolve(schema));
        names.contains(param) || (own_id && names.contains("id"))
    })
}

/// Property names a response schema exposes, looking through
/// compositions, array items and a `data` envelope.
pub(super) fn property_names(schema: &Value) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect_properties(schema, 0, &mut names);
    names
}

fn collect_properties(schema: &Value, depth: usize, names: &mut BTreeSet<String>) {
    if depth > MAX_SCHEMA_DEPTH {
        return;
    }
    let Some(map) = schema.as_object() else {
        return;
    };

    if let Some(Value::Object(properties)) = map.get("properties") {
        names.extend(properties.keys().cloned());
        if let Some(data) = properties.get("data") {
            collect_properties(data, depth + 1, names);
        }
    }
    for keyword in ["allOf", "oneOf", "anyOf"] {
        if let Some(Value::Array(parts)) = map.get(keyword) {
            for part in parts {
                collect_properties(part, depth + 1, names);
            }
        }
    }
    if let Some(items) = map.get("items") {
        collect_properties(items, depth + 1, names);
    }
}
