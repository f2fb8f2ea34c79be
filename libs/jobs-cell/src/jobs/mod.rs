pub mod alert_check;
pub mod cleanup;
pub mod data_sync;
pub mod expiration_check;

pub use alert_check::AlertCheckJob;
pub use cleanup::CleanupJob;
pub use data_sync::DataSyncJob;
pub use expiration_check::ExpirationCheckJob;

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::error::JobError;
use crate::models::{JobExecutionResult, JobOutcome};

/// A unit of scheduled maintenance work.
///
/// Implementors provide `run`; `execute` wraps it so that every run, including a
/// failing one, yields a [`JobExecutionResult`] with its measured duration.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// Five-field cron expression.
    fn schedule(&self) -> &str;

    fn description(&self) -> &str;

    async fn run(&self, now: DateTime<Utc>) -> Result<JobOutcome, JobError>;

    async fn execute(&self, now: DateTime<Utc>) -> JobExecutionResult {
        info!(job = self.name(), "Job started");
        let start = Instant::now();
        let outcome = self.run(now).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (success, error, details) = match outcome {
            Ok(JobOutcome { details, failure: None }) => (true, None, details),
            Ok(JobOutcome {
                details,
                failure: Some(failure),
            }) => (false, Some(failure), details),
            Err(e) => (false, Some(e.to_string()), serde_json::Value::Null),
        };

        match &error {
            None => info!(job = self.name(), duration_ms, "Job completed"),
            Some(e) => error!(job = self.name(), duration_ms, "Job failed: {}", e),
        }

        JobExecutionResult {
            job_name: self.name().to_string(),
            success,
            duration_ms,
            error,
            details,
            started_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_utils::test_utils::fixed_now;

    struct ScriptedJob {
        outcome: fn() -> Result<JobOutcome, JobError>,
    }

    #[async_trait]
    impl Job for ScriptedJob {
        fn name(&self) -> &str {
            "scripted"
        }

        fn schedule(&self) -> &str {
            "* * * * *"
        }

        fn description(&self) -> &str {
            "Returns a fixed outcome"
        }

        async fn run(&self, _now: DateTime<Utc>) -> Result<JobOutcome, JobError> {
            (self.outcome)()
        }
    }

    #[tokio::test]
    async fn execute_reports_success_with_details() {
        let job = ScriptedJob {
            outcome: || Ok(JobOutcome::completed(json!({"rows": 3}))),
        };
        let result = job.execute(fixed_now()).await;

        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.details["rows"], 3);
        assert_eq!(result.job_name, "scripted");
        assert_eq!(result.started_at, fixed_now());
    }

    #[tokio::test]
    async fn execute_turns_errors_into_failed_results() {
        let failed = ScriptedJob {
            outcome: || Err(JobError::Failed("boom".to_string())),
        };
        let result = failed.execute(fixed_now()).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Job failed: boom"));

        let partial = ScriptedJob {
            outcome: || Ok(JobOutcome::failed(json!({"deleted": 1}), "pass 2 failed")),
        };
        let result = partial.execute(fixed_now()).await;
        assert!(!result.success);
        assert_eq!(result.details["deleted"], 1);
    }
}
