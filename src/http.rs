//! HTTP transport used by the step executor.

use crate::error::ExecutionError;
use crate::model::HttpMethod;
use async_trait::async_trait;
use reqwest::{Client, Method as ReqMethod};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

/// A fully resolved request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Sends one request. Non-2xx statuses are responses, not errors.
///
/// Implementations hold no per-run state, so one client can be
/// shared by concurrent suite runs.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ExecutionError>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn convert_method(method: HttpMethod) -> ReqMethod {
        match method {
            HttpMethod::Get => ReqMethod::GET,
            HttpMethod::Post => ReqMethod::POST,
            HttpMethod::Put => ReqMethod::PUT,
            HttpMethod::Delete => ReqMethod::DELETE,
            HttpMethod::Patch => ReqMethod::PATCH,
            HttpMethod::Head => ReqMethod::HEAD,
            HttpMethod::Options => ReqMethod::OPTIONS,
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ExecutionError> {
        let mut builder = self
            .client
            .request(Self::convert_method(request.method), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!("Sending request");
        let response = builder.send().await?;
        let status = response.status().as_u16();
        debug!("Received response with status: {}", status);

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| ExecutionError::Response(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Join a step path onto `base_url`. Absolute URLs pass through.
pub fn build_url(base_url: Option<&str>, path: &str) -> Result<String, ExecutionError> {
    if path.contains("://") {
        return Ok(path.to_string());
    }
    let Some(base_url) = base_url else {
        return Ok(path.to_string());
    };

    let mut base = url::Url::parse(base_url).map_err(|e| {
        ExecutionError::Request(format!("invalid base_url '{base_url}': {e}"))
    })?;
    // keep any base path prefix (`http://host/api` + `/users`)
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    if path.is_empty() {
        return Ok(base.to_string());
    }
    base.join(path.trim_start_matches('/'))
        .map(|url| url.to_string())
        .map_err(|e| {
            ExecutionError::Request(format!(
                "failed to join base_url '{base_url}' with path '{path}': {e}"
            ))
        })
}
