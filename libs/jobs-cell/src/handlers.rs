// ==============================================================================
// JOBS CELL HANDLERS
// ==============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::instrument;

use crate::models::{JobExecutionResult, JobInfo};
use crate::services::JobScheduler;
use shared_models::AppError;

pub struct JobsHandlers {
    scheduler: Arc<JobScheduler>,
}

impl JobsHandlers {
    pub fn new(scheduler: Arc<JobScheduler>) -> Self {
        Self { scheduler }
    }
}

#[instrument(skip(handlers))]
pub async fn list_jobs(State(handlers): State<Arc<JobsHandlers>>) -> Json<Vec<JobInfo>> {
    Json(handlers.scheduler.jobs().await)
}

#[instrument(skip(handlers))]
pub async fn job_results(
    State(handlers): State<Arc<JobsHandlers>>,
) -> Json<HashMap<String, JobExecutionResult>> {
    Json(handlers.scheduler.last_results().await)
}

/// Runs the named job immediately and returns its result, failed runs included.
#[instrument(skip(handlers))]
pub async fn run_job(
    State(handlers): State<Arc<JobsHandlers>>,
    Path(name): Path<String>,
) -> Result<Json<JobExecutionResult>, AppError> {
    let result = handlers.scheduler.run_now(&name).await?;
    Ok(Json(result))
}
