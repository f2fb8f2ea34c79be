use thiserror::Error;

use monitoring_cell::MonitoringError;
use shared_database::StoreError;
use shared_models::AppError;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Monitoring error: {0}")]
    Monitoring(#[from] MonitoringError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Relay rate limit exceeded")]
    RateLimited,

    #[error("Relay HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Relay returned {status}: {message}")]
    Status { status: u16, message: String },
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("Job already registered: {0}")]
    DuplicateJob(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job is already running: {0}")]
    AlreadyRunning(String),

    #[error("Scheduler already started")]
    AlreadyStarted,
}

impl From<SchedulerError> for AppError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::JobNotFound(_) => AppError::NotFound(err.to_string()),
            SchedulerError::AlreadyRunning(_) | SchedulerError::AlreadyStarted => AppError::Conflict(err.to_string()),
            SchedulerError::InvalidSchedule { .. } | SchedulerError::DuplicateJob(_) => {
                AppError::BadRequest(err.to_string())
            }
        }
    }
}
