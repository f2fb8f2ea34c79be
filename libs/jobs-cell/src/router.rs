use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{job_results, list_jobs, run_job, JobsHandlers};

pub fn create_jobs_router(handlers: Arc<JobsHandlers>) -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/results", get(job_results))
        .route("/jobs/{name}/run", post(run_job))
        .with_state(handlers)
}
