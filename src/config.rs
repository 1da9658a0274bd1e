//! Engine and analyzer configuration.
//!
//! Built once by the caller and passed into the executors and the
//! analyzer; nothing here is read from process-wide state.

use crate::policy::{BackoffStrategy, RetryPolicy, TimeoutPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Settings for running suites against a live target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix joined to relative step paths.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Default headers; a step's own header of the same name wins.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Per-request deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Keep running later cases after a case fails.
    #[serde(default)]
    pub continue_on_case_failure: bool,
    #[serde(default = "default_template_depth")]
    pub max_template_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            headers: BTreeMap::new(),
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
            continue_on_case_failure: false,
            max_template_depth: default_template_depth(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy::new(Duration::from_millis(self.timeout_ms))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.to_policy()
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_template_depth() -> usize {
    10
}

/// Retry settings applied around every HTTP call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Fraction of the delay added or removed at random (0.0-1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default)]
    pub strategy: BackoffStrategy,
    /// Statuses retried in addition to every 5xx response.
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
            jitter: default_jitter(),
            strategy: BackoffStrategy::default(),
            retry_statuses: default_retry_statuses(),
        }
    }
}

impl RetryConfig {
    /// Config that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
            .with_delays(
                Duration::from_millis(self.initial_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )
            .with_backoff_factor(self.backoff_factor)
            .with_jitter(self.jitter)
            .with_strategy(self.strategy)
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

fn default_retry_statuses() -> Vec<u16> {
    vec![429]
}

/// Heuristic increments applied to body-reference confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub base: f64,
    /// Resource name found in the synonym table.
    pub known_resource: f64,
    /// Resource name matched only by path.
    pub unknown_resource: f64,
    /// Field typed integer/string/uuid/int64.
    pub typed_field: f64,
    /// Field description mentions an identifier.
    pub descriptive_text: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            base: 0.5,
            known_resource: 0.3,
            unknown_resource: 0.2,
            typed_field: 0.1,
            descriptive_text: 0.1,
        }
    }
}

/// Settings for dependency inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub weights: ConfidenceWeights,
    /// Path-parameter edge confidence when a POST supplies the value.
    #[serde(default = "default_path_param_post")]
    pub path_param_post_confidence: f64,
    /// Path-parameter edge confidence for non-POST sources.
    #[serde(default = "default_path_param_fallback")]
    pub path_param_fallback_confidence: f64,
    #[serde(default = "default_resource_from_create")]
    pub resource_from_create_confidence: f64,
    #[serde(default = "default_resource_other")]
    pub resource_other_confidence: f64,
    #[serde(default = "default_schema_reference")]
    pub schema_reference_confidence: f64,
    /// Extra resource aliases, e.g. `author → [user, users]`. Merged
    /// over the built-in table.
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            weights: ConfidenceWeights::default(),
            path_param_post_confidence: default_path_param_post(),
            path_param_fallback_confidence: default_path_param_fallback(),
            resource_from_create_confidence: default_resource_from_create(),
            resource_other_confidence: default_resource_other(),
            schema_reference_confidence: default_schema_reference(),
            synonyms: BTreeMap::new(),
        }
    }
}

fn default_path_param_post() -> f64 {
    0.9
}

fn default_path_param_fallback() -> f64 {
    0.6
}

fn default_resource_from_create() -> f64 {
    0.8
}

fn default_resource_other() -> f64 {
    0.6
}

fn default_schema_reference() -> f64 {
    1.0
}
