// =====================================================================================
// MONITORING CELL HANDLERS
// =====================================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, instrument};

use crate::models::{
    AlertRecord, HealthCheckRequest, HealthCheckResponse, MetricsResponse, MonitoringError, ServiceHealth,
};
use crate::services::{AlertRuleEngine, HealthChecker, MetricsAggregator};

pub struct MonitoringHandlers {
    health_checker: Arc<HealthChecker>,
    metrics: Arc<MetricsAggregator>,
    alerts: Arc<AlertRuleEngine>,
}

impl MonitoringHandlers {
    pub fn new(
        health_checker: Arc<HealthChecker>,
        metrics: Arc<MetricsAggregator>,
        alerts: Arc<AlertRuleEngine>,
    ) -> Self {
        Self {
            health_checker,
            metrics,
            alerts,
        }
    }
}

// =====================================================================================
// HEALTH CHECK ENDPOINTS
// =====================================================================================

#[instrument(skip(handlers))]
pub async fn get_health_status(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(request): Query<HealthCheckRequest>,
) -> Result<Json<HealthCheckResponse>, MonitoringError> {
    let health = handlers.health_checker.check_all().await;

    let unhealthy_count = health.unhealthy_count() as u32;
    let healthy_count = health.services.len() as u32 - unhealthy_count;

    let response = HealthCheckResponse {
        status: health.overall,
        healthy_services: healthy_count,
        unhealthy_services: unhealthy_count,
        last_check: health.timestamp,
        details: if request.include_details.unwrap_or(false) {
            Some(health)
        } else {
            None
        },
    };

    Ok(Json(response))
}

#[instrument(skip(handlers))]
pub async fn get_component_health(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ServiceHealth>, MonitoringError> {
    let component_name = params
        .get("component")
        .ok_or_else(|| MonitoringError::HealthCheckFailed("Component name required".to_string()))?;

    let health = handlers
        .health_checker
        .check_component(component_name)
        .await
        .ok_or_else(|| MonitoringError::HealthCheckFailed(format!("Unknown component: {}", component_name)))?;

    Ok(Json(health))
}

// =====================================================================================
// METRICS ENDPOINTS
// =====================================================================================

#[instrument(skip(handlers))]
pub async fn get_current_metrics(
    State(handlers): State<Arc<MonitoringHandlers>>,
) -> Result<Json<MetricsResponse>, MonitoringError> {
    let current_metrics = handlers.metrics.snapshot().await?;
    let alerts = handlers.alerts.active_alerts().await?;

    Ok(Json(MetricsResponse {
        timestamp: current_metrics.timestamp,
        current_metrics,
        alerts,
    }))
}

// =====================================================================================
// ALERT ENDPOINTS
// =====================================================================================

#[instrument(skip(handlers))]
pub async fn get_active_alerts(
    State(handlers): State<Arc<MonitoringHandlers>>,
) -> Result<Json<Vec<AlertRecord>>, MonitoringError> {
    Ok(Json(handlers.alerts.active_alerts().await?))
}

#[instrument(skip(handlers))]
pub async fn get_alert_summary(
    State(handlers): State<Arc<MonitoringHandlers>>,
) -> Result<Json<HashMap<String, u32>>, MonitoringError> {
    Ok(Json(handlers.alerts.alert_summary().await?))
}

// =====================================================================================
// RESPONSE TIME MIDDLEWARE
// =====================================================================================

/// Records every request's latency as a response-time sample named after its route.
pub async fn track_response_time(
    State(handlers): State<Arc<MonitoringHandlers>>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let tags = HashMap::from([
        ("method".to_string(), method),
        ("status".to_string(), response.status().as_u16().to_string()),
    ]);
    if let Err(e) = handlers
        .metrics
        .record_response_time(&endpoint, elapsed_ms, Some(tags))
        .await
    {
        debug!("Failed to record response time for {}: {}", endpoint, e);
    }

    response
}

// =====================================================================================
// ERROR RESPONSE IMPLEMENTATION
// =====================================================================================

impl IntoResponse for MonitoringError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            MonitoringError::HealthCheckFailed(_) => (StatusCode::SERVICE_UNAVAILABLE, "Health check failed"),
            MonitoringError::MetricsError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Metrics collection error"),
            MonitoringError::AlertError(_) => (StatusCode::BAD_REQUEST, "Alert system error"),
            MonitoringError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "Store unavailable"),
            MonitoringError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Serialization error"),
        };

        (
            status,
            Json(serde_json::json!({
                "error": message,
                "details": self.to_string(),
                "timestamp": chrono::Utc::now()
            })),
        )
            .into_response()
    }
}
