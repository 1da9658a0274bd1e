use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apichain::{
    loader::load_api_description, CaseStatus, DependencyAnalyzer, DependencyType, EngineConfig,
    HttpMethod, NodeRef, ReqwestClient, RetryConfig, Strength, SuiteExecutor, SuiteLoader,
    SuiteStatus, TestSuite, VariableStore,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

struct TestServer {
    base_url: String,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let flaky_hits = Arc::new(AtomicUsize::new(0));

        let app = Router::new()
            .route(
                "/users",
                post(|| async move { (StatusCode::CREATED, Json(json!({"id": "42"}))) }),
            )
            .route(
                "/users/:id",
                get(|Path(id): Path<String>| async move {
                    if id == "42" {
                        (StatusCode::OK, Json(json!({"id": "42", "name": "A"})))
                    } else {
                        (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
                    }
                }),
            )
            .route(
                "/echo",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    Json(json!({"body": body, "auth": auth}))
                }),
            )
            .route(
                "/search",
                get(|Query(params): Query<HashMap<String, String>>| async move { Json(json!(params)) }),
            )
            .route(
                "/broken",
                get(|| async move { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
            .route(
                "/flaky",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"retry": true})))
                    } else {
                        (StatusCode::OK, Json(json!({"ok": true})))
                    }
                }),
            )
            .route(
                "/slow",
                get(|| async move {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Json(json!({"late": true}))
                }),
            )
            .with_state(flaky_hits);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

        let handle = tokio::spawn(async move {
            if let Err(err) = server.await {
                eprintln!("test server error: {err}");
            }
        });
        let base_url = format!("http://{addr}");

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                let _ = handle.await;
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn config(base_url: &str) -> EngineConfig {
    EngineConfig {
        timeout_ms: 2_000,
        retry: RetryConfig {
            max_retries: 3,
            initial_delay_ms: 5,
            max_delay_ms: 20,
            jitter: 0.0,
            ..RetryConfig::default()
        },
        ..EngineConfig::default()
    }
    .with_base_url(base_url)
}

fn suite(yaml: &str) -> TestSuite {
    TestSuite::from_yaml(yaml).unwrap_or_else(|e| panic!("failed to parse suite yaml: {e}"))
}

#[tokio::test]
async fn create_then_fetch_resolves_extracted_id() {
    let server = TestServer::spawn().await;
    let suite = SuiteLoader::new()
        .load_suite(fixture("users_suite.yaml"))
        .expect("failed to load suite fixture");
    let config = config(&server.base_url);
    let mut store = VariableStore::new();

    let result = SuiteExecutor::new(&config)
        .execute(&suite, &mut store, &ReqwestClient::new())
        .await
        .expect("suite should be valid");

    assert!(result.success, "suite should succeed: {result:?}");
    assert_eq!(result.status, SuiteStatus::Completed);

    let happy = &result.case_results[0];
    assert_eq!(happy.step_results.len(), 2);
    let create = &happy.step_results[0];
    assert_eq!(create.status_code, Some(201));
    assert_eq!(
        create.request.body,
        Some(json!({"name": "A", "email": "a@x.com"}))
    );
    let fetch = &happy.step_results[1];
    assert_eq!(fetch.request.path, "/users/42");
    assert_eq!(fetch.request.url, format!("{}/users/42", server.base_url));
    assert_eq!(fetch.extracted_values["fetched_name"], json!("A"));

    // the error-path case passes because the 404 was asserted
    assert_eq!(result.case_results[1].status, CaseStatus::Passed);

    server.shutdown().await;
}

#[tokio::test]
async fn typed_substitution_headers_and_params() {
    let server = TestServer::spawn().await;
    let mut config = config(&server.base_url);
    config
        .headers
        .insert("Authorization".to_string(), "Bearer ${token}".to_string());
    let suite = suite(
        r#"
id: echo
variables:
  token: s3cret
  limit: 5
cases:
  - id: echo-body
    steps:
      - sequence: 1
        method: POST
        path: /echo
        body:
          limit: ${limit}
          label: "limit=${limit}"
          nested:
            - ${token}
        extract:
          echoed_limit: $.body.limit
      - sequence: 2
        method: GET
        path: /search
        params:
          q: ${echoed_limit}
"#,
    );
    let mut store = VariableStore::new();

    let result = SuiteExecutor::new(&config)
        .execute(&suite, &mut store, &ReqwestClient::new())
        .await
        .unwrap();
    assert!(result.success, "suite should succeed: {result:?}");

    let steps = &result.case_results[0].step_results;
    assert_eq!(
        steps[0].response_body,
        json!({
            "body": {"limit": 5, "label": "limit=5", "nested": ["s3cret"]},
            "auth": "Bearer s3cret"
        })
    );
    assert_eq!(steps[1].response_body, json!({"q": "5"}));

    server.shutdown().await;
}

#[tokio::test]
async fn failing_case_stops_suite() {
    let server = TestServer::spawn().await;
    let config = config(&server.base_url);
    let suite = suite(
        r#"
id: fail-fast
cases:
  - id: first
    steps:
      - {sequence: 1, method: GET, path: /users/42, expected_status: 200}
      - {sequence: 2, method: GET, path: /users/7, expected_status: 200}
      - {sequence: 3, method: GET, path: /users/42, expected_status: 200}
  - id: second
    steps:
      - {sequence: 1, method: GET, path: /users/42}
"#,
    );
    let mut store = VariableStore::new();

    let result = SuiteExecutor::new(&config)
        .execute(&suite, &mut store, &ReqwestClient::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status, SuiteStatus::Failed);
    let first = &result.case_results[0];
    assert_eq!(first.status, CaseStatus::Failed);
    assert_eq!(first.step_results.len(), 2);
    assert_eq!(first.step_results[1].status_code, Some(404));
    assert_eq!(result.case_results[1].status, CaseStatus::Pending);
    assert!(result.case_results[1].step_results.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn retryable_status_is_retried_until_success() {
    let server = TestServer::spawn().await;
    let config = config(&server.base_url);
    let suite = suite(
        r#"
id: flaky
cases:
  - id: eventually-ok
    steps:
      - {sequence: 1, method: GET, path: /flaky, expected_status: 200}
"#,
    );
    let mut store = VariableStore::new();

    let result = SuiteExecutor::new(&config)
        .execute(&suite, &mut store, &ReqwestClient::new())
        .await
        .unwrap();

    assert!(result.success, "suite should succeed: {result:?}");
    assert_eq!(result.case_results[0].step_results[0].attempts, 3);

    server.shutdown().await;
}

#[tokio::test]
async fn server_error_without_retry_budget_fails_case() {
    let server = TestServer::spawn().await;
    let mut config = config(&server.base_url);
    config.retry = RetryConfig::disabled();
    let suite = suite(
        r#"
id: broken
cases:
  - id: boom
    steps:
      - {sequence: 1, method: GET, path: /broken}
"#,
    );
    let mut store = VariableStore::new();

    let result = SuiteExecutor::new(&config)
        .execute(&suite, &mut store, &ReqwestClient::new())
        .await
        .unwrap();

    let step = &result.case_results[0].step_results[0];
    assert_eq!(step.status_code, Some(500));
    assert_eq!(step.attempts, 1);
    assert_eq!(step.response_body, json!("boom"));
    assert_eq!(result.case_results[0].status, CaseStatus::Failed);

    server.shutdown().await;
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = TestServer::spawn().await;
    let mut config = config(&server.base_url);
    config.timeout_ms = 100;
    config.retry.max_retries = 1;
    let suite = suite(
        r#"
id: slow
cases:
  - id: too-slow
    steps:
      - {sequence: 1, method: GET, path: /slow}
"#,
    );
    let mut store = VariableStore::new();

    let result = SuiteExecutor::new(&config)
        .execute(&suite, &mut store, &ReqwestClient::new())
        .await
        .unwrap();

    let case = &result.case_results[0];
    assert_eq!(case.status, CaseStatus::Timeout);
    assert!(case.step_results[0].timed_out);
    assert_eq!(case.step_results[0].attempts, 2);
    assert!(!result.success);

    server.shutdown().await;
}

#[tokio::test]
async fn unreachable_target_is_an_error() {
    // bind and release a port so nothing is listening on it
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = config(&format!("http://{addr}"));
    config.retry.max_retries = 1;
    let suite = suite(
        r#"
id: offline
cases:
  - id: refused
    steps:
      - {sequence: 1, method: GET, path: /users/42}
"#,
    );
    let mut store = VariableStore::new();

    let result = SuiteExecutor::new(&config)
        .execute(&suite, &mut store, &ReqwestClient::new())
        .await
        .unwrap();

    let case = &result.case_results[0];
    assert_eq!(case.status, CaseStatus::Error);
    assert!(case.step_results[0].status_code.is_none());
    assert!(case.error_message.is_some());
}

fn register_suite(user: &str) -> TestSuite {
    suite(&format!(
        r#"
id: register-{user}
variables:
  wanted: {user}
cases:
  - id: register
    steps:
      - sequence: 1
        method: POST
        path: /echo
        body:
          id: ${{wanted}}
        extract:
          user_id: $.body.id
      - sequence: 2
        method: GET
        path: /search
        params:
          owner: ${{user_id}}
"#
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_suites_keep_separate_stores() {
    let server = TestServer::spawn().await;
    let config = Arc::new(config(&server.base_url));
    let client = Arc::new(ReqwestClient::new());

    let runs: Vec<_> = ["u-1", "u-2"]
        .into_iter()
        .map(|user| {
            let config = Arc::clone(&config);
            let client = Arc::clone(&client);
            let suite = register_suite(user);
            tokio::spawn(async move {
                let mut store = VariableStore::new();
                let result = SuiteExecutor::new(&config)
                    .execute(&suite, &mut store, &*client)
                    .await
                    .expect("suite should be valid");
                (result, store)
            })
        })
        .collect();

    for (run, user) in runs.into_iter().zip(["u-1", "u-2"]) {
        let (result, store) = run.await.expect("suite task panicked");
        assert!(result.success, "suite for {user} should succeed: {result:?}");
        let steps = &result.case_results[0].step_results;
        assert_eq!(steps[0].extracted_values["user_id"], json!(user));
        assert_eq!(steps[1].response_body, json!({"owner": user}));
        assert_eq!(store.get("user_id").unwrap(), &json!(user));
    }

    server.shutdown().await;
}

#[test]
fn analyzer_reports_dependencies_for_openapi_fixture() {
    let api = load_api_description(fixture("users_api.yaml")).expect("failed to load api fixture");
    let report = DependencyAnalyzer::default().analyze(&api);

    let op = |method, path: &str| NodeRef::Operation {
        method,
        path: path.to_string(),
    };
    let find = |kind: DependencyType, source: &NodeRef, target: &NodeRef| {
        report
            .dependencies
            .iter()
            .find(|d| d.dependency_type == kind && &d.source == source && &d.target == target)
    };

    let path_dep = find(
        DependencyType::PathParameter,
        &op(HttpMethod::Post, "/users"),
        &op(HttpMethod::Get, "/users/{id}"),
    )
    .expect("path parameter edge");
    assert_eq!(path_dep.field.as_deref(), Some("id"));
    assert_eq!(path_dep.strength, Strength::Required);

    assert!(find(
        DependencyType::ResourceOperation,
        &op(HttpMethod::Get, "/users/{id}"),
        &op(HttpMethod::Delete, "/users/{id}"),
    )
    .is_some());

    let owner = find(
        DependencyType::BodyReference,
        &op(HttpMethod::Post, "/users"),
        &op(HttpMethod::Post, "/teams"),
    )
    .expect("ownerId edge");
    assert_eq!(owner.strength, Strength::Required);

    let team = find(
        DependencyType::BodyReference,
        &op(HttpMethod::Post, "/teams"),
        &op(HttpMethod::Post, "/users"),
    )
    .expect("teamId edge");
    assert_eq!(team.strength, Strength::Optional);

    assert!(report
        .dependencies
        .iter()
        .all(|d| (0.0..=1.0).contains(&d.confidence)));
    assert_eq!(
        report.cycles,
        vec![vec!["/teams:POST", "/users:POST", "/teams:POST"]]
    );
    assert!(report
        .circular_refs
        .contains(&"#/components/schemas/User".to_string()));
    assert_eq!(report.unresolved_refs, vec!["#/components/schemas/Missing"]);
}
