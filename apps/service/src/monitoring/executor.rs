use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, error};

use super::check::Check;
use super::checker::Checker;
use super::types::{CheckResult, exception};

/// How often a failing check is retried before it counts as failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub retries: u32,
    pub interval: Duration,
}

/// Monitoring executor - executes individual monitoring checks
pub struct MonitoringExecutor {
    checker: Arc<dyn Checker>,
}

impl MonitoringExecutor {
    pub fn new(checker: Arc<dyn Checker>) -> Self {
        Self { checker }
    }

    /// Execute a check once, turning a panic inside it into a failed result
    pub async fn execute_check(&self, check: &Check) -> CheckResult {
        let start = Utc::now();

        match AssertUnwindSafe(check.execute(self.checker.as_ref())).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(url = check.url(), reason = %reason, "Check panicked");
                CheckResult::started(start).error(exception::PANIC, reason)
            }
        }
    }

    /// Execute a check, retrying failures up to `policy.retries` times.
    ///
    /// The returned result is the last attempt's, with `attempts` counting all
    /// of them.
    pub async fn execute_with_retries(&self, check: &Check, policy: RetryPolicy) -> CheckResult {
        let max_attempts = policy.retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            let result = self.execute_check(check).await;
            if result.passed || attempt >= max_attempts {
                return result.with_attempts(attempt);
            }

            debug!(
                url = check.url(),
                attempt,
                max_attempts,
                reason = result.reason.as_deref().unwrap_or_default(),
                "Check failed, retrying"
            );

            if !policy.interval.is_zero() {
                tokio::time::sleep(policy.interval).await;
            }
            attempt += 1;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "check panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::check::HttpCheck;
    use crate::monitoring::checker::{ProbeError, ProbeRequest, ProbeResponse};
    use crate::monitoring::testing::ScriptedChecker;

    fn check() -> Check {
        Check::Http(HttpCheck { url: "https://example.com".into(), timeout_seconds: 5.0 })
    }

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy { retries, interval: Duration::ZERO }
    }

    #[tokio::test]
    async fn test_single_attempt_without_retries() {
        let checker = Arc::new(ScriptedChecker::always(500));
        let executor = MonitoringExecutor::new(checker.clone());

        let result = executor.execute_with_retries(&check(), policy(0)).await;

        assert!(!result.passed);
        assert_eq!(result.attempts, 1);
        assert_eq!(checker.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_check_uses_every_retry() {
        let checker = Arc::new(ScriptedChecker::sequence(vec![Err(ProbeError::Connection(
            "refused".into(),
        ))]));
        let executor = MonitoringExecutor::new(checker.clone());

        let result = executor.execute_with_retries(&check(), policy(2)).await;

        assert!(!result.passed);
        assert_eq!(result.attempts, 3);
        assert_eq!(checker.calls(), 3);
        assert_eq!(result.exception_type.as_deref(), Some(exception::CONNECTION));
    }

    #[tokio::test]
    async fn test_retries_stop_at_first_pass() {
        let checker = Arc::new(ScriptedChecker::sequence(vec![Ok(503), Ok(200)]));
        let executor = MonitoringExecutor::new(checker.clone());

        let result = executor.execute_with_retries(&check(), policy(5)).await;

        assert!(result.passed);
        assert_eq!(result.attempts, 2);
        assert_eq!(checker.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_interval_is_waited() {
        let checker = Arc::new(ScriptedChecker::always(500));
        let executor = MonitoringExecutor::new(checker);
        let started = tokio::time::Instant::now();

        let retry = RetryPolicy { retries: 2, interval: Duration::from_secs(30) };
        executor.execute_with_retries(&check(), retry).await;

        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    struct PanickingChecker;

    #[async_trait::async_trait]
    impl Checker for PanickingChecker {
        async fn fetch(&self, _request: &ProbeRequest) -> Result<ProbeResponse, ProbeError> {
            panic!("probe exploded");
        }

        async fn render(&self, _url: &str, _timeout: Duration) -> Result<String, ProbeError> {
            panic!("probe exploded");
        }
    }

    #[tokio::test]
    async fn test_panicking_check_becomes_failed_result() {
        let executor = MonitoringExecutor::new(Arc::new(PanickingChecker));

        let result = executor.execute_check(&check()).await;

        assert!(!result.passed);
        assert_eq!(result.exception_type.as_deref(), Some(exception::PANIC));
        assert_eq!(result.reason.as_deref(), Some("probe exploded"));
    }
}
