//! Test-plan input model and execution result tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A generated test suite targeting one API operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Method of the operation under test.
    #[serde(default)]
    pub target_method: Option<HttpMethod>,
    /// Path of the operation under test.
    #[serde(default)]
    pub target_path: Option<String>,
    /// Suite-level fixtures, written at SUITE scope before the first
    /// case runs.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    pub cases: Vec<TestCase>,
}

/// One scenario inside a suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Set for deliberately error-path cases (e.g. "not_found").
    #[serde(default)]
    pub error_type: Option<String>,
    pub steps: Vec<TestStep>,
}

/// A single HTTP call inside a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStep {
    /// Execution position within the case.
    pub sequence: i64,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, alias = "headers")]
    pub request_headers: BTreeMap<String, Value>,
    #[serde(default, alias = "body")]
    pub request_body: Option<Value>,
    #[serde(default, alias = "params")]
    pub request_params: BTreeMap<String, Value>,
    /// Variable name → `$.`-prefixed response path.
    #[serde(default, alias = "extract")]
    pub extract_rules: BTreeMap<String, String>,
    #[serde(default)]
    pub expected_status: Option<u16>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "head")]
    Head,
    #[serde(alias = "options")]
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Parse a method name case-insensitively. Returns `None` for
    /// keys that are not HTTP methods (e.g. `parameters` inside an
    /// OpenAPI path item).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "delete" => Some(Self::Delete),
            "patch" => Some(Self::Patch),
            "head" => Some(Self::Head),
            "options" => Some(Self::Options),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TestSuite {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

impl TestCase {
    /// Steps in execution order.
    pub fn ordered_steps(&self) -> Vec<&TestStep> {
        let mut steps: Vec<&TestStep> = self.steps.iter().collect();
        steps.sort_by_key(|step| step.sequence);
        steps
    }
}

/// Lifecycle of a case run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteStatus {
    Running,
    Completed,
    Failed,
}

/// Resolved request as actually sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestInfo {
    pub method: String,
    /// Path after template substitution.
    pub path: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub sequence: i64,
    pub status_code: Option<u16>,
    pub passed: bool,
    pub response_time_ms: u64,
    /// Parsed JSON when possible, raw text otherwise.
    pub response_body: Value,
    pub error_message: Option<String>,
    /// Set when the step failed before an HTTP status was obtained
    /// (transport error, timeout, template error).
    #[serde(default)]
    pub error_kind: Option<crate::error::ErrorKind>,
    /// Whether that error was a timeout.
    #[serde(default)]
    pub timed_out: bool,
    pub extracted_values: BTreeMap<String, Value>,
    pub request: RequestInfo,
    /// Number of HTTP attempts, including retries.
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub name: String,
    pub status: CaseStatus,
    pub step_results: Vec<StepResult>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub suite_id: String,
    pub name: String,
    pub status: SuiteStatus,
    pub case_results: Vec<CaseResult>,
    pub success: bool,
    pub duration_ms: u64,
}

impl SuiteResult {
    pub fn passed_cases(&self) -> usize {
        self.case_results
            .iter()
            .filter(|c| c.status == CaseStatus::Passed)
            .count()
    }
}
