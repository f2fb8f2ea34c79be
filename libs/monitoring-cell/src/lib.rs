// =====================================================================================
// MONITORING CELL - METRICS, HEALTH & ALERTING
// =====================================================================================
//
// This cell provides:
// - Response-time, query and memory metric samples with derived statistics
// - Concurrent dependency health checks
// - Alert rules with a deduplicated FIRING/RESOLVED lifecycle
// - Notification hand-off for alerts and reminders
//
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    AlertEvaluation, AlertRecord, AlertRule, AlertSeverity, AlertTransition, HealthStatus, MetricsSnapshot,
    MonitoringError, NotificationRequest, NotifyError, SystemHealthSnapshot,
};

pub use services::{
    AlertRuleEngine, HealthChecker, MetricsAggregator, NotificationSink, StoreNotificationSink,
};

pub use handlers::MonitoringHandlers;
pub use router::create_monitoring_router;
