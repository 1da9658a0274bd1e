use super::naming::{id_field_base, pluralize, singularize, to_snake_case, SynonymTable};
use super::{
    ApiDescription, Dependency, DependencyType, Endpoint, NodeRef, SchemaTable, Strength,
};
use crate::config::{AnalyzerConfig, ConfidenceWeights};
use crate::model::HttpMethod;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static ID_DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(id|identifier|reference)\b")
        .expect("failed to compile id description regex")
});

/// Nested request body objects deeper than this are not walked.
const MAX_FIELD_DEPTH: usize = 4;

/// A property found in a request body schema.
struct BodyField {
    /// Dotted path from the body root: `shipping.addressId`.
    path: String,
    name: String,
    schema: Value,
    required: bool,
}

/// Edges from creating operations to the operations whose request
/// bodies carry identifiers of what they create.
pub(super) fn extract(
    api: &ApiDescription,
    table: &mut SchemaTable<'_>,
    config: &AnalyzerConfig,
) -> Vec<Dependency> {
    let synonyms = SynonymTable::new(&config.synonyms);
    let creators: Vec<&Endpoint> = api
        .endpoints()
        .iter()
        .filter(|endpoint| endpoint.method == HttpMethod::Post)
        .collect();

    let mut deps = Vec::new();
    for target in api.endpoints() {
        let Some(schema) = &target.request_body_schema else {
            continue;
        };
        let mut fields = Vec::new();
        collect_fields(&table.resolve(schema), "", 0, &mut fields);

        for field in fields {
            let Some(base) = id_field_base(&field.name) else {
                continue;
            };
            let (candidates, known) = synonyms.candidates(&base);
            let sources: Vec<&Endpoint> = creators
                .iter()
                .copied()
                .filter(|source| !std::ptr::eq(*source, target))
                .filter(|source| creates_any(source, &candidates))
                .collect();
            if sources.is_empty() {
                debug!(path = %target.path, field = %field.path, "no operation creates referenced resource");
                continue;
            }

            let confidence = score(&field, known, &config.weights);
            for source in sources {
                deps.push(Dependency {
                    dependency_type: DependencyType::BodyReference,
                    source: NodeRef::operation(source),
                    target: NodeRef::operation(target),
                    field: Some(field.path.clone()),
                    strength: if field.required {
                        Strength::Required
                    } else {
                        Strength::Optional
                    },
                    confidence,
                });
            }
        }
    }
    deps
}

fn collect_fields(schema: &Value, prefix: &str, depth: usize, out: &mut Vec<BodyField>) {
    if depth > MAX_FIELD_DEPTH {
        return;
    }
    let Some(map) = schema.as_object() else {
        return;
    };

    if let Some(Value::Array(parts)) = map.get("allOf") {
        for part in parts {
            collect_fields(part, prefix, depth + 1, out);
        }
    }

    let required: Vec<&str> = map
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(Value::Object(properties)) = map.get("properties") else {
        return;
    };
    for (name, property) in properties {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        out.push(BodyField {
            path: path.clone(),
            name: name.clone(),
            schema: property.clone(),
            required: required.contains(&name.as_str()),
        });
        if property.get("properties").is_some() || property.get("allOf").is_some() {
            collect_fields(property, &path, depth + 1, out);
        }
    }
}

/// Whether `endpoint` creates one of the `candidates`, judged by the
/// last literal segment of its path.
fn creates_any(endpoint: &Endpoint, candidates: &[String]) -> bool {
    let Some(segment) = endpoint
        .path
        .rsplit('/')
        .find(|segment| !segment.is_empty() && !segment.starts_with('{'))
    else {
        return false;
    };
    let segment = to_snake_case(segment);
    let singular = singularize(&segment);
    candidates
        .iter()
        .any(|name| *name == singular || pluralize(name) == segment)
}

fn score(field: &BodyField, known: bool, weights: &ConfidenceWeights) -> f64 {
    let mut confidence = weights.base;
    confidence += if known {
        weights.known_resource
    } else {
        weights.unknown_resource
    };

    let field_type = field.schema.get("type").and_then(Value::as_str);
    let format = field.schema.get("format").and_then(Value::as_str);
    if matches!(field_type, Some("integer" | "string"))
        || matches!(format, Some("uuid" | "int64"))
    {
        confidence += weights.typed_field;
    }

    let described = field
        .schema
        .get("description")
        .and_then(Value::as_str)
        .is_some_and(|text| ID_DESCRIPTION_RE.is_match(text));
    if described {
        confidence += weights.descriptive_text;
    }

    confidence.clamp(0.0, 1.0)
}
