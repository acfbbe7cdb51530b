//! Shared plumbing for AWS calls: deadlines and request accounting.

use crate::error::AwsError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of a single AWS API call, as reported to an [`ApiObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The call succeeded
    Success,
    /// The call returned an error
    Failure,
    /// The call hit its deadline
    Timeout,
}

impl CallOutcome {
    /// Label value for metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
        }
    }
}

/// Receives one notification per AWS API call.
pub trait ApiObserver: Send + Sync {
    /// Called once the call has finished, failed or timed out.
    fn observe(&self, operation: &'static str, outcome: CallOutcome);
}

/// Deadline and observer applied to every outgoing call.
#[derive(Clone)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub observer: Option<Arc<dyn ApiObserver>>,
}

impl std::fmt::Debug for CallPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallPolicy")
            .field("timeout", &self.timeout)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl CallPolicy {
    /// Run `fut` under the configured deadline and report its outcome.
    pub async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AwsError>
    where
        F: Future<Output = Result<T, AwsError>>,
    {
        debug!(operation, "AWS API call");
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AwsError::Timeout(operation.to_string())),
        };
        if let Some(observer) = &self.observer {
            let outcome = match &result {
                Ok(_) => CallOutcome::Success,
                Err(AwsError::Timeout(_)) => CallOutcome::Timeout,
                Err(_) => CallOutcome::Failure,
            };
            observer.observe(operation, outcome);
        }
        result
    }
}

/// DescribeTags accepts at most this many ARNs per request.
pub const DESCRIBE_TAGS_BATCH: usize = 20;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(&'static str, CallOutcome)>>);

    impl ApiObserver for Recorder {
        fn observe(&self, operation: &'static str, outcome: CallOutcome) {
            self.0.lock().unwrap().push((operation, outcome));
        }
    }

    #[tokio::test]
    async fn test_call_reports_outcomes() {
        let recorder = Arc::new(Recorder::default());
        let policy = CallPolicy {
            timeout: Duration::from_secs(5),
            observer: Some(recorder.clone()),
        };

        let ok: Result<u8, AwsError> = policy.call("DescribeTags", async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        let err: Result<u8, AwsError> = policy
            .call("AddTags", async { Err(AwsError::Api("boom".to_string())) })
            .await;
        assert!(err.is_err());

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![("DescribeTags", CallOutcome::Success), ("AddTags", CallOutcome::Failure)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out() {
        let policy = CallPolicy {
            timeout: Duration::from_millis(10),
            observer: None,
        };
        let result: Result<(), AwsError> = policy
            .call("DescribeSubnets", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AwsError::Timeout(op)) if op == "DescribeSubnets"));
    }
}
