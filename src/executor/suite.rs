use super::CaseExecutor;
use crate::config::EngineConfig;
use crate::error::ChainError;
use crate::http::HttpClient;
use crate::model::{CaseResult, CaseStatus, SuiteResult, SuiteStatus, TestSuite};
use crate::variables::{Scope, VariableStore};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Runs the cases of a suite in order.
///
/// SUITE scope is reset and seeded from the suite's fixtures once per
/// run, so every case sees the same fixtures. By default the run stops
/// at the first case that does not pass; see
/// [`EngineConfig::continue_on_case_failure`].
#[derive(Debug, Clone)]
pub struct SuiteExecutor<'a> {
    config: &'a EngineConfig,
    cases: CaseExecutor<'a>,
}

impl<'a> SuiteExecutor<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            cases: CaseExecutor::new(config),
        }
    }

    /// Execute `suite`.
    ///
    /// Only a malformed suite is an error; everything that goes wrong
    /// while running is recorded in the returned result.
    #[instrument(skip(self, suite, store, client), fields(suite = %suite.id))]
    pub async fn execute(
        &self,
        suite: &TestSuite,
        store: &mut VariableStore,
        client: &dyn HttpClient,
    ) -> Result<SuiteResult, ChainError> {
        validate_suite(suite)?;

        let start_time = Instant::now();
        info!("Starting test suite: {} ({} cases)", suite.id, suite.cases.len());

        store.clear_scope(Scope::Suite);
        for (name, value) in &suite.variables {
            if let Err(err) = store.set(name, value.clone(), Scope::Suite, None) {
                warn!("Failed to set suite variable '{}': {}", name, err);
            }
        }

        let mut case_results: Vec<CaseResult> = Vec::with_capacity(suite.cases.len());
        let mut stopped_by: Option<(String, CaseStatus)> = None;

        for case in &suite.cases {
            if let Some((failed_id, failed_status)) = &stopped_by {
                case_results.push(CaseResult {
                    case_id: case.id.clone(),
                    name: case.name.clone(),
                    status: CaseStatus::Pending,
                    step_results: Vec::new(),
                    error_message: Some(format!(
                        "not executed: suite stopped after case '{failed_id}' ended with {failed_status:?}"
                    )),
                    duration_ms: 0,
                });
                continue;
            }

            let result = self.cases.execute(case, store, client).await;
            if result.status != CaseStatus::Passed && !self.config.continue_on_case_failure {
                info!("Stopping suite due to case failure: {}", case.id);
                stopped_by = Some((case.id.clone(), result.status));
            }
            case_results.push(result);
        }

        let success = case_results
            .iter()
            .all(|case| case.status == CaseStatus::Passed);
        let result = SuiteResult {
            suite_id: suite.id.clone(),
            name: suite.name.clone(),
            status: if success {
                SuiteStatus::Completed
            } else {
                SuiteStatus::Failed
            },
            case_results,
            success,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Test suite finished: {} ({} ms) - {}/{} cases passed",
            suite.id,
            result.duration_ms,
            result.passed_cases(),
            result.case_results.len()
        );
        Ok(result)
    }
}

/// Reject suites that cannot be run as written: a case without steps,
/// a repeated case id, or a repeated step sequence within a case.
pub fn validate_suite(suite: &TestSuite) -> Result<(), ChainError> {
    let mut case_ids = HashSet::new();
    for case in &suite.cases {
        if !case_ids.insert(case.id.as_str()) {
            return Err(ChainError::DuplicateCase {
                suite_id: suite.id.clone(),
                case_id: case.id.clone(),
            });
        }
        if case.steps.is_empty() {
            return Err(ChainError::EmptyCase {
                case_id: case.id.clone(),
            });
        }
        let mut sequences = HashSet::new();
        for step in &case.steps {
            if !sequences.insert(step.sequence) {
                return Err(ChainError::DuplicateSequence {
                    case_id: case.id.clone(),
                    sequence: step.sequence,
                });
            }
        }
    }
    Ok(())
}
