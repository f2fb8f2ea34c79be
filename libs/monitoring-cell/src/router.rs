// =====================================================================================
// MONITORING CELL ROUTER
// =====================================================================================

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower_http::cors::CorsLayer;

use crate::handlers::{
    get_active_alerts, get_alert_summary, get_component_health, get_current_metrics, get_health_status,
    track_response_time, MonitoringHandlers,
};

pub fn create_monitoring_router(handlers: Arc<MonitoringHandlers>) -> Router {
    Router::new()
        .route("/health", get(get_health_status))
        .route("/health/component", get(get_component_health))
        .route("/metrics", get(get_current_metrics))
        .route("/alerts", get(get_active_alerts))
        .route("/alerts/summary", get(get_alert_summary))
        .route_layer(middleware::from_fn_with_state(handlers.clone(), track_response_time))
        .layer(CorsLayer::permissive())
        .with_state(handlers)
}
