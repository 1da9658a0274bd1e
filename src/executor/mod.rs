//! Sequential execution of suites, cases and steps.
//!
//! A [`SuiteExecutor`] runs cases in order through a [`CaseExecutor`],
//! which runs steps in `sequence` order through a [`StepExecutor`].
//! All three take the same [`VariableStore`](crate::variables::VariableStore)
//! and [`HttpClient`](crate::http::HttpClient) per call; the executors
//! themselves only hold configuration, so one executor can drive any
//! number of runs as long as each run has its own store.

mod case;
mod step;
mod suite;

pub use case::CaseExecutor;
pub use step::StepExecutor;
pub use suite::{validate_suite, SuiteExecutor};

use serde_json::Value;

/// Header and query values are sent as text.
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&json!("abc")), "abc");
        assert_eq!(render_value(&json!(42)), "42");
        assert_eq!(render_value(&json!(true)), "true");
        assert_eq!(render_value(&Value::Null), "");
    }
}
