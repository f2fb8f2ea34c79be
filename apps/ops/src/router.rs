use std::sync::Arc;

use axum::{routing::get, Router};

use jobs_cell::{create_jobs_router, JobsHandlers};
use monitoring_cell::{create_monitoring_router, MonitoringHandlers};

pub fn create_router(monitoring: Arc<MonitoringHandlers>, jobs: Arc<JobsHandlers>) -> Router {
    Router::new()
        .route("/", get(|| async { "Key portal ops is running!" }))
        .merge(create_monitoring_router(monitoring))
        .merge(create_jobs_router(jobs))
}
