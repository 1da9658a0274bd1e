use crate::model::HttpMethod;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// A declared operation parameter.
#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: String,
    /// `path`, `query`, `header` or `cookie`.
    pub location: String,
    pub required: bool,
    pub schema: Option<Value>,
}

/// One operation of the API description.
#[derive(Debug, Clone, Serialize)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: String,
    pub operation_id: Option<String>,
    pub request_body_schema: Option<Value>,
    pub parameters: Vec<Parameter>,
    /// Status code (`"201"`, `"2XX"`, `"default"`) → response schema.
    pub responses: BTreeMap<String, Option<Value>>,
}

impl Endpoint {
    /// `path:METHOD`, the key used for cycle detection.
    pub fn key(&self) -> String {
        format!("{}:{}", self.path, self.method)
    }

    /// Names of the `{param}` placeholders in the path.
    pub fn path_params(&self) -> Vec<&str> {
        path_params(&self.path)
    }

    /// Schemas of the 2xx responses.
    pub fn success_schemas(&self) -> impl Iterator<Item = &Value> {
        self.responses
            .iter()
            .filter(|(code, _)| code.starts_with('2'))
            .filter_map(|(_, schema)| schema.as_ref())
    }
}

pub(crate) fn path_params(path: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + close];
        if !name.is_empty() {
            params.push(name);
        }
        rest = &rest[open + close + 1..];
    }
    params
}

/// A parsed OpenAPI-like document.
///
/// Accepts OpenAPI 3 (`components.schemas`, `requestBody.content`)
/// and Swagger 2 (`definitions`, `in: body` parameters) layouts.
#[derive(Debug, Clone)]
pub struct ApiDescription {
    document: Value,
    endpoints: Vec<Endpoint>,
    schemas: BTreeMap<String, Value>,
}

impl ApiDescription {
    pub fn from_document(document: &Value) -> Self {
        let mut endpoints = Vec::new();

        match document.get("paths") {
            Some(Value::Object(paths)) => {
                for (path, item) in paths {
                    parse_path_item(path, item, &mut endpoints);
                }
            }
            Some(_) => warn!("'paths' is not an object, skipping"),
            None => {}
        }

        let schemas = document
            .pointer("/components/schemas")
            .or_else(|| document.get("definitions"))
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(name, schema)| (name.clone(), schema.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            document: document.clone(),
            endpoints,
            schemas,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let document: Value = serde_json::from_str(json)?;
        Ok(Self::from_document(&document))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let document: Value = serde_yaml::from_str(yaml)?;
        Ok(Self::from_document(&document))
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Component schemas by name.
    pub fn schemas(&self) -> &BTreeMap<String, Value> {
        &self.schemas
    }

    pub fn find(&self, method: HttpMethod, path: &str) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.method == method && e.path == path)
    }
}

fn parse_path_item(path: &str, item: &Value, endpoints: &mut Vec<Endpoint>) {
    let Some(item) = item.as_object() else {
        warn!(path, "path item is not an object, skipping");
        return;
    };
    let shared_params = item
        .get("parameters")
        .map(parse_parameters)
        .unwrap_or_default();

    for (key, operation) in item {
        let Some(method) = HttpMethod::parse(key) else {
            continue;
        };
        let Some(operation) = operation.as_object() else {
            warn!(path, method = %method, "operation is not an object, skipping");
            continue;
        };

        let mut parameters = shared_params.clone();
        if let Some(own) = operation.get("parameters") {
            for param in parse_parameters(own) {
                // operation-level parameters override path-level ones
                parameters.retain(|p: &Parameter| {
                    !(p.name == param.name && p.location == param.location)
                });
                parameters.push(param);
            }
        }

        let request_body_schema = operation
            .get("requestBody")
            .and_then(|body| body.get("content"))
            .and_then(content_schema)
            .or_else(|| {
                parameters
                    .iter()
                    .find(|p| p.location == "body")
                    .and_then(|p| p.schema.clone())
            });

        let responses = operation
            .get("responses")
            .and_then(Value::as_object)
            .map(|responses| {
                responses
                    .iter()
                    .map(|(code, response)| {
                        let schema = response
                            .get("content")
                            .and_then(content_schema)
                            .or_else(|| response.get("schema").cloned());
                        (code.clone(), schema)
                    })
                    .collect()
            })
            .unwrap_or_default();

        endpoints.push(Endpoint {
            method,
            path: path.to_string(),
            operation_id: operation
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string),
            request_body_schema,
            parameters,
            responses,
        });
    }
}

fn parse_parameters(value: &Value) -> Vec<Parameter> {
    let Some(items) = value.as_array() else {
        warn!("'parameters' is not an array, skipping");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|param| {
            let name = param.get("name")?.as_str()?;
            let location = param.get("in")?.as_str()?;
            Some(Parameter {
                name: name.to_string(),
                location: location.to_string(),
                required: param
                    .get("required")
                    .and_then(Value::as_bool)
                    .unwrap_or(location == "path"),
                schema: param.get("schema").cloned().or_else(|| {
                    // Swagger 2 puts the type directly on the parameter
                    param.get("type").map(|t| serde_json::json!({ "type": t }))
                }),
            })
        })
        .collect()
}

/// Schema of the JSON media type, falling back to the first one.
fn content_schema(content: &Value) -> Option<Value> {
    let content = content.as_object()?;
    content
        .get("application/json")
        .or_else(|| content.values().next())
        .and_then(|media| media.get("schema"))
        .cloned()
}
