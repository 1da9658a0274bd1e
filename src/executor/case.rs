use super::StepExecutor;
use crate::config::EngineConfig;
use crate::http::HttpClient;
use crate::model::{CaseResult, CaseStatus, StepResult, TestCase};
use crate::variables::{Scope, VariableStore};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Runs the steps of one case in `sequence` order, stopping at the
/// first step that does not pass.
#[derive(Debug, Clone)]
pub struct CaseExecutor<'a> {
    steps: StepExecutor<'a>,
}

impl<'a> CaseExecutor<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            steps: StepExecutor::new(config),
        }
    }

    /// Execute `case`. CASE and STEP scope are cleared first; values a
    /// step extracts are copied into CASE scope for the steps after it.
    #[instrument(skip(self, case, store, client), fields(case = %case.id))]
    pub async fn execute(
        &self,
        case: &TestCase,
        store: &mut VariableStore,
        client: &dyn HttpClient,
    ) -> CaseResult {
        let start_time = Instant::now();
        store.clear_scope(Scope::Case);
        store.clear_scope(Scope::Step);

        info!("Starting test case: {}", case.id);

        let steps = case.ordered_steps();
        let mut step_results = Vec::with_capacity(steps.len());
        let mut status = CaseStatus::Passed;
        let mut error_message = None;

        if steps.is_empty() {
            status = CaseStatus::Error;
            error_message = Some(format!("test case '{}' has no steps", case.id));
        }

        for (idx, step) in steps.iter().enumerate() {
            debug!(
                "Running step {}/{}: {} {}",
                idx + 1,
                steps.len(),
                step.method,
                step.path
            );

            let result = self.steps.execute(step, store, client).await;
            for (name, value) in &result.extracted_values {
                if let Err(err) = store.set(name, value.clone(), Scope::Case, None) {
                    warn!("Failed to promote '{}' to case scope: {}", name, err);
                }
            }

            let failed = !result.passed;
            if failed {
                status = classify(&result);
                error_message = Some(format!(
                    "step {} failed: {}",
                    result.sequence,
                    result
                        .error_message
                        .as_deref()
                        .unwrap_or("step did not pass")
                ));
            }
            step_results.push(result);

            if failed {
                info!("Stopping case due to step failure");
                break;
            }
        }

        let result = CaseResult {
            case_id: case.id.clone(),
            name: case.name.clone(),
            status,
            step_results,
            error_message,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Test case finished: {} ({} ms) - Status: {:?}",
            case.id, result.duration_ms, result.status
        );
        result
    }
}

/// Case status for a step that did not pass.
fn classify(step: &StepResult) -> CaseStatus {
    if step.timed_out {
        CaseStatus::Timeout
    } else if step.error_kind.is_some() {
        CaseStatus::Error
    } else {
        CaseStatus::Failed
    }
}
