use super::render_value;
use crate::config::EngineConfig;
use crate::error::ExecutionError;
use crate::extract::extract_all;
use crate::http::{build_url, HttpClient, HttpRequest, HttpResponse};
use crate::model::{RequestInfo, StepResult, TestStep};
use crate::policy::{RetryPolicy, TimeoutPolicy};
use crate::variables::{Scope, VariableStore};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Runs a single HTTP step.
///
/// The request goes out as retry(timeout(send)): each attempt has its
/// own deadline, and timed-out or unreachable attempts as well as
/// responses with a retryable status are retried with backoff.
#[derive(Debug, Clone)]
pub struct StepExecutor<'a> {
    config: &'a EngineConfig,
    retry: RetryPolicy,
    timeout: TimeoutPolicy,
}

impl<'a> StepExecutor<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            retry: config.retry_policy(),
            timeout: config.timeout_policy(),
        }
    }

    /// Execute `step`. Never fails: transport and template errors are
    /// recorded in the returned result.
    #[instrument(
        skip(self, step, store, client),
        fields(sequence = step.sequence, method = %step.method, path = %step.path)
    )]
    pub async fn execute(
        &self,
        step: &TestStep,
        store: &mut VariableStore,
        client: &dyn HttpClient,
    ) -> StepResult {
        store.clear_scope(Scope::Step);

        let (path, request) = match self.build_request(step, store) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!("Failed to prepare request: {}", err);
                let info = RequestInfo {
                    method: step.method.to_string(),
                    path: step.path.clone(),
                    ..RequestInfo::default()
                };
                return failed_step(step, info, err, 0, 0);
            }
        };
        let info = RequestInfo {
            method: request.method.to_string(),
            path,
            url: request.url.clone(),
            headers: request.headers.clone(),
            params: request.query.clone(),
            body: request.body.clone(),
        };
        debug!("Resolved request: {} {}", info.method, info.url);

        let attempts = AtomicU32::new(0);
        let start_time = Instant::now();
        let outcome = {
            let timeout = &self.timeout;
            let request = &request;
            let attempts = &attempts;
            self.retry
                .run_with_result_check(
                    move || {
                        attempts.fetch_add(1, Ordering::Relaxed);
                        timeout.run(client.send(request))
                    },
                    |response: &HttpResponse| {
                        self.is_retryable_status(response.status, step.expected_status)
                    },
                )
                .await
        };
        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        let attempts = attempts.into_inner();

        match outcome {
            Ok(response) => {
                self.record_response(step, store, response, info, elapsed_ms, attempts)
            }
            Err(err) => {
                warn!(
                    "Step {} failed after {} attempt(s): {}",
                    step.sequence, attempts, err
                );
                failed_step(step, info, err, elapsed_ms, attempts)
            }
        }
    }

    /// The substituted path and the request to send.
    fn build_request(
        &self,
        step: &TestStep,
        store: &VariableStore,
    ) -> Result<(String, HttpRequest), ExecutionError> {
        let depth = self.config.max_template_depth;
        let path = store.resolve_string_with_depth(&step.path, depth)?;

        let mut headers = BTreeMap::new();
        for (name, value) in &self.config.headers {
            headers.insert(name.clone(), store.resolve_string_with_depth(value, depth)?);
        }
        for (name, value) in &step.request_headers {
            // step headers replace defaults regardless of case
            headers.retain(|existing: &String, _| !existing.eq_ignore_ascii_case(name));
            let resolved = store.resolve_object_with_depth(value, depth)?;
            headers.insert(name.clone(), render_value(&resolved));
        }

        let mut query = BTreeMap::new();
        for (name, value) in &step.request_params {
            let resolved = store.resolve_object_with_depth(value, depth)?;
            query.insert(name.clone(), render_value(&resolved));
        }

        let body = step
            .request_body
            .as_ref()
            .map(|body| store.resolve_object_with_depth(body, depth))
            .transpose()?;

        let url = build_url(self.config.base_url.as_deref(), &path)?;
        Ok((
            path,
            HttpRequest {
                method: step.method,
                url,
                headers,
                query,
                body,
            },
        ))
    }

    /// Any 5xx plus the configured extra statuses, unless the step expects it.
    fn is_retryable_status(&self, status: u16, expected: Option<u16>) -> bool {
        // a step asserting a 503 must not retry its way past it
        if expected == Some(status) {
            return false;
        }
        (500..=599).contains(&status) || self.config.retry.retry_statuses.contains(&status)
    }

    fn record_response(
        &self,
        step: &TestStep,
        store: &mut VariableStore,
        response: HttpResponse,
        request: RequestInfo,
        elapsed_ms: u64,
        attempts: u32,
    ) -> StepResult {
        let status = response.status;
        let body = parse_body(&response.body);

        let (passed, error_message) = match step.expected_status {
            Some(expected) if status != expected => (
                false,
                Some(format!("expected status {expected}, got {status}")),
            ),
            Some(_) => (true, None),
            None if (200..300).contains(&status) => (true, None),
            None => (
                false,
                Some(format!("expected a 2xx status, got {status}")),
            ),
        };

        let extracted_values = extract_all(&body, &step.extract_rules);
        for (name, value) in &extracted_values {
            if let Err(err) = store.set(name, value.clone(), Scope::Step, None) {
                warn!("Failed to store extracted value '{}': {}", name, err);
            }
        }

        info!(
            "Step {} {} {} -> {} ({} ms, {} attempt(s)) - Passed: {}",
            step.sequence, request.method, request.path, status, elapsed_ms, attempts, passed
        );

        StepResult {
            sequence: step.sequence,
            status_code: Some(status),
            passed,
            response_time_ms: elapsed_ms,
            response_body: body,
            error_message,
            error_kind: None,
            timed_out: false,
            extracted_values,
            request,
            attempts,
        }
    }
}

fn failed_step(
    step: &TestStep,
    request: RequestInfo,
    err: ExecutionError,
    elapsed_ms: u64,
    attempts: u32,
) -> StepResult {
    StepResult {
        sequence: step.sequence,
        status_code: None,
        passed: false,
        response_time_ms: elapsed_ms,
        response_body: Value::Null,
        error_message: Some(err.to_string()),
        error_kind: Some(err.kind()),
        timed_out: err.is_timeout(),
        extracted_values: BTreeMap::new(),
        request,
        attempts,
    }
}

/// JSON when the body parses, raw text otherwise.
fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::error::ErrorKind;
    use crate::executor::mock::{Reply, ScriptedClient};
    use crate::model::HttpMethod;
    use serde_json::json;
    use std::time::Duration;

    fn fast_config() -> EngineConfig {
        EngineConfig {
            base_url: Some("http://api.test".to_string()),
            timeout_ms: 1_000,
            retry: RetryConfig {
                max_retries: 2,
                initial_delay_ms: 1,
                max_delay_ms: 5,
                jitter: 0.0,
                ..RetryConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn step(method: HttpMethod, path: &str) -> TestStep {
        TestStep {
            sequence: 1,
            method,
            path: path.to_string(),
            request_headers: BTreeMap::new(),
            request_body: None,
            request_params: BTreeMap::new(),
            extract_rules: BTreeMap::new(),
            expected_status: None,
        }
    }

    #[tokio::test]
    async fn test_resolves_templates_and_extracts() {
        let config = fast_config();
        let executor = StepExecutor::new(&config);
        let client =
            ScriptedClient::new(vec![Reply::Status(201, r#"{"id": "42", "tags": ["a"]}"#)]);
        let mut store = VariableStore::new();
        store.set("name", json!("Ann"), Scope::Case, None).unwrap();
        store.set("age", json!(31), Scope::Global, None).unwrap();
        store.set("token", json!("t0k"), Scope::Global, None).unwrap();

        let mut post = step(HttpMethod::Post, "/users");
        post.request_body = Some(json!({"name": "${name}", "age": "${age}"}));
        post.request_headers.insert("Authorization".into(), json!("Bearer ${token}"));
        post.request_params.insert("notify".into(), json!(true));
        post.extract_rules.insert("uid".into(), "$.id".into());
        post.extract_rules.insert("first_tag".into(), "$.tags[0]".into());
        post.extract_rules.insert("ignored".into(), "id".into());
        post.expected_status = Some(201);

        let result = executor.execute(&post, &mut store, &client).await;

        assert!(result.passed);
        assert_eq!(result.status_code, Some(201));
        assert_eq!(result.attempts, 1);
        assert_eq!(result.extracted_values.len(), 2);
        assert_eq!(store.get("uid").unwrap(), &json!("42"));
        assert_eq!(result.request.url, "http://api.test/users");
        assert_eq!(result.request.path, "/users");

        let sent = client.sent();
        assert_eq!(sent[0].body, Some(json!({"name": "Ann", "age": 31})));
        assert_eq!(sent[0].headers["Authorization"], "Bearer t0k");
        assert_eq!(sent[0].query["notify"], "true");
    }

    #[tokio::test]
    async fn test_status_classification() {
        let config = fast_config();
        let executor = StepExecutor::new(&config);
        let client = ScriptedClient::new(vec![
            Reply::Status(404, "not here"),
            Reply::Status(404, "{}"),
        ]);
        let mut store = VariableStore::new();

        let result = executor
            .execute(&step(HttpMethod::Get, "/missing"), &mut store, &client)
            .await;
        assert!(!result.passed);
        assert_eq!(result.response_body, json!("not here"));
        assert!(result.error_kind.is_none());
        assert!(result.error_message.unwrap().contains("404"));

        let mut expect_404 = step(HttpMethod::Get, "/missing");
        expect_404.expected_status = Some(404);
        let result = executor.execute(&expect_404, &mut store, &client).await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_retries_retryable_status() {
        let config = fast_config();
        let executor = StepExecutor::new(&config);
        let client = ScriptedClient::new(vec![
            Reply::Status(503, ""),
            Reply::Status(503, ""),
            Reply::Status(200, r#"{"ok": true}"#),
        ]);
        let mut store = VariableStore::new();

        let result = executor
            .execute(&step(HttpMethod::Get, "/flaky"), &mut store, &client)
            .await;
        assert!(result.passed);
        assert_eq!(result.attempts, 3);
        assert_eq!(client.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_retries_any_server_error_status() {
        let config = fast_config();
        let executor = StepExecutor::new(&config);
        let client = ScriptedClient::new(vec![
            Reply::Status(507, "full"),
            Reply::Status(200, "{}"),
        ]);
        let mut store = VariableStore::new();

        let result = executor
            .execute(&step(HttpMethod::Get, "/x"), &mut store, &client)
            .await;
        assert!(result.passed);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(client.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_statuses_extend_server_errors() {
        let config = fast_config();
        let executor = StepExecutor::new(&config);
        let client = ScriptedClient::new(vec![
            Reply::Status(429, "slow down"),
            Reply::Status(501, ""),
            Reply::Status(200, "{}"),
        ]);
        let mut store = VariableStore::new();

        let result = executor
            .execute(&step(HttpMethod::Get, "/x"), &mut store, &client)
            .await;
        assert!(result.passed);
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let config = fast_config();
        let executor = StepExecutor::new(&config);
        let client = ScriptedClient::new(vec![
            Reply::Status(409, "conflict"),
            Reply::Status(200, "{}"),
        ]);
        let mut store = VariableStore::new();

        let result = executor
            .execute(&step(HttpMethod::Post, "/x"), &mut store, &client)
            .await;
        assert!(!result.passed);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.status_code, Some(409));
    }

    #[tokio::test]
    async fn test_expected_error_status_is_not_retried() {
        let config = fast_config();
        let executor = StepExecutor::new(&config);
        let client = ScriptedClient::new(vec![Reply::Status(503, "")]);
        let mut store = VariableStore::new();

        let mut unavailable = step(HttpMethod::Get, "/down");
        unavailable.expected_status = Some(503);
        let result = executor.execute(&unavailable, &mut store, &client).await;
        assert!(result.passed);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_timeout_is_recorded_not_raised() {
        let mut config = fast_config();
        config.timeout_ms = 20;
        config.retry.max_retries = 1;
        let executor = StepExecutor::new(&config);
        let client = ScriptedClient::new(vec![
            Reply::Slow(Duration::from_millis(300), 200, "{}"),
            Reply::Slow(Duration::from_millis(300), 200, "{}"),
        ]);
        let mut store = VariableStore::new();

        let result = executor
            .execute(&step(HttpMethod::Get, "/slow"), &mut store, &client)
            .await;
        assert!(!result.passed);
        assert!(result.timed_out);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.error_kind, Some(ErrorKind::RetriesExhausted));
        assert!(result.status_code.is_none());
    }

    #[tokio::test]
    async fn test_template_error_skips_request() {
        let config = fast_config();
        let executor = StepExecutor::new(&config);
        let client = ScriptedClient::new(vec![]);
        let mut store = VariableStore::new();
        store.set("a", json!("${b}"), Scope::Global, None).unwrap();
        store.set("b", json!("${a}"), Scope::Global, None).unwrap();

        let result = executor
            .execute(&step(HttpMethod::Get, "/x/${a}"), &mut store, &client)
            .await;
        assert!(!result.passed);
        assert_eq!(result.error_kind, Some(ErrorKind::Variable));
        assert_eq!(result.attempts, 0);
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn test_step_scope_is_reset() {
        let config = fast_config();
        let executor = StepExecutor::new(&config);
        let client = ScriptedClient::new(vec![Reply::Status(200, "{}")]);
        let mut store = VariableStore::new();
        store.set("stale", json!(1), Scope::Step, None).unwrap();

        executor
            .execute(&step(HttpMethod::Get, "/"), &mut store, &client)
            .await;
        assert!(!store.contains("stale"));
    }
}
