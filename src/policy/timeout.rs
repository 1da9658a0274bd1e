use crate::error::ExecutionError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounds the wall-clock duration of an operation.
///
/// When the deadline fires first, the in-flight future is dropped
/// (cancelling it) and [`ExecutionError::Timeout`] is returned.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    limit: Duration,
}

impl TimeoutPolicy {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub async fn run<Fut, T>(&self, op: Fut) -> Result<T, ExecutionError>
    where
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        match tokio::time::timeout(self.limit, op).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    limit_ms = self.limit.as_millis() as u64,
                    "operation timed out"
                );
                Err(ExecutionError::Timeout { limit: self.limit })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RetryPolicy;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_slow_operation_times_out_and_result_is_discarded() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let result = TimeoutPolicy::new(Duration::from_millis(50))
            .run(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, ExecutionError>("late")
            })
            .await;

        assert!(matches!(result, Err(ExecutionError::Timeout { .. })));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!finished.load(Ordering::SeqCst), "operation kept running");
    }

    #[tokio::test]
    async fn test_fast_operation_passes_through() {
        let policy = TimeoutPolicy::new(Duration::from_millis(200));
        assert_eq!(policy.run(async { Ok::<_, ExecutionError>(7) }).await.unwrap(), 7);

        let err = policy
            .run(async { Err::<(), _>(ExecutionError::Request("bad".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Request(_)));
    }

    #[tokio::test]
    async fn test_retry_around_timeout_retries_each_timeout() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let timeout = TimeoutPolicy::new(Duration::from_millis(10));
        let timeout = &timeout;

        let err = RetryPolicy::new(2)
            .with_delays(Duration::from_millis(1), Duration::from_millis(1))
            .run(move || {
                let counter = counter.clone();
                timeout.run(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<(), ExecutionError>(())
                })
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.is_timeout());
    }
}
