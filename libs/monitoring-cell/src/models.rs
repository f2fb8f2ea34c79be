// =====================================================================================
// MONITORING CELL MODELS
// =====================================================================================

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::{NotificationChannel, NotificationType};

// -------------------------------------------------------------------------------------
// Metric samples
// -------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    ResponseTime,
    MemoryUsage,
    DatabaseQuery,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::ResponseTime => "response_time",
            MetricType::MemoryUsage => "memory_usage",
            MetricType::DatabaseQuery => "database_query",
        }
    }
}

/// Name under which process memory samples are recorded.
pub const HEAP_USED: &str = "heap_used";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub name: String,
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryTrend {
    pub trend: TrendDirection,
    pub percentage_change: f64,
    pub samples: usize,
}

impl MemoryTrend {
    pub fn stable(samples: usize) -> Self {
        Self {
            trend: TrendDirection::Stable,
            percentage_change: 0.0,
            samples,
        }
    }
}

/// Keys alert rules use to name the value they watch.
pub mod metric_keys {
    pub const QPS: &str = "qps";
    pub const AVG_RESPONSE_TIME: &str = "avg_response_time";
    pub const P95_RESPONSE_TIME: &str = "p95_response_time";
    pub const MEMORY_TREND: &str = "memory_trend";
    pub const UNHEALTHY_SERVICES: &str = "unhealthy_services";
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_per_second: f64,
    pub average_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub memory_trend: MemoryTrend,
    pub timestamp: DateTime<Utc>,
}

impl MetricsSnapshot {
    pub fn value_for(&self, metric: &str) -> Option<f64> {
        match metric {
            metric_keys::QPS => Some(self.requests_per_second),
            metric_keys::AVG_RESPONSE_TIME => Some(self.average_response_time_ms),
            metric_keys::P95_RESPONSE_TIME => Some(self.p95_response_time_ms),
            metric_keys::MEMORY_TREND => Some(self.memory_trend.percentage_change),
            _ => None,
        }
    }
}

// -------------------------------------------------------------------------------------
// Health
// -------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: ServiceStatus,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealthSnapshot {
    pub overall: HealthStatus,
    pub services: BTreeMap<String, ServiceHealth>,
    pub timestamp: DateTime<Utc>,
}

impl SystemHealthSnapshot {
    pub fn unhealthy_count(&self) -> usize {
        self.services
            .values()
            .filter(|service| service.status == ServiceStatus::Unhealthy)
            .count()
    }
}

// -------------------------------------------------------------------------------------
// Alerts
// -------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertCondition {
    GreaterThan,
    LessThan,
    EqualTo,
}

impl AlertCondition {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            AlertCondition::GreaterThan => value > threshold,
            AlertCondition::LessThan => value < threshold,
            AlertCondition::EqualTo => value == threshold,
        }
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AlertCondition::GreaterThan => "greater than",
            AlertCondition::LessThan => "less than",
            AlertCondition::EqualTo => "equal to",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    Emergency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub name: String,
    pub metric: String,
    pub condition: AlertCondition,
    pub threshold: f64,
    pub severity: AlertSeverity,
    #[serde(default)]
    pub channels: Vec<NotificationChannel>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Firing => "FIRING",
            AlertStatus::Resolved => "RESOLVED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub status: AlertStatus,
    pub value: f64,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// What [`AlertRuleEngine::apply`](crate::services::AlertRuleEngine::apply) did for one rule.
#[derive(Debug, Clone)]
pub enum AlertTransition {
    Triggered(AlertRecord),
    AlreadyFiring,
    Resolved(AlertRecord),
    Clear,
}

/// Counters from driving a batch of rules through the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertEvaluation {
    pub rules_evaluated: usize,
    pub triggered: usize,
    pub resolved: usize,
    pub already_firing: usize,
    /// Rules naming a metric with no current value.
    pub skipped: usize,
}

// -------------------------------------------------------------------------------------
// Notifications
// -------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct NotificationRequest {
    pub notification_type: NotificationType,
    pub user_id: Option<String>,
    pub title: String,
    pub message: String,
    pub channels: Vec<NotificationChannel>,
    pub data: serde_json::Value,
}

// -------------------------------------------------------------------------------------
// Request/Response models
// -------------------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckRequest {
    pub include_details: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub healthy_services: u32,
    pub unhealthy_services: u32,
    pub last_check: DateTime<Utc>,
    pub details: Option<SystemHealthSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub current_metrics: MetricsSnapshot,
    pub alerts: Vec<AlertRecord>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("Component health check failed: {0}")]
    HealthCheckFailed(String),
    #[error("Metrics collection error: {0}")]
    MetricsError(String),
    #[error("Alert system error: {0}")]
    AlertError(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification store error: {0}")]
    Store(#[from] StoreError),
    #[error("Notification rejected: {0}")]
    Rejected(String),
}
