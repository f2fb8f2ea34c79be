use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;

use crate::setup_ops;
use jobs_cell::{create_jobs_router, JobsHandlers};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn lists_registered_jobs() {
    let ops = setup_ops().await;
    let router = create_jobs_router(Arc::new(JobsHandlers::new(ops.scheduler.clone())));

    let response = router
        .oneshot(Request::builder().uri("/jobs").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 3);
    assert_eq!(body[1]["name"], "cleanup");
    assert_eq!(body[1]["schedule"], "0 3 * * *");
}

#[tokio::test]
async fn manual_run_returns_the_result_and_shows_in_results() {
    let ops = setup_ops().await;
    let router = create_jobs_router(Arc::new(JobsHandlers::new(ops.scheduler.clone())));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/jobs/cleanup/run")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["job_name"], "cleanup");
    assert_eq!(body["success"], true);

    let response = router
        .oneshot(Request::builder().uri("/jobs/results").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["cleanup"]["success"], true);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let ops = setup_ops().await;
    let router = create_jobs_router(Arc::new(JobsHandlers::new(ops.scheduler.clone())));

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/jobs/nope/run")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Job not found: nope");
}
