pub mod alerts;
pub mod health;
pub mod metrics;
pub mod notifications;

pub use alerts::AlertRuleEngine;
pub use health::{CacheProbe, HealthChecker, HealthProbe, HttpProbe, StoreProbe};
pub use metrics::{AverageOptions, MetricsAggregator, MetricsConfig};
pub use notifications::{LogNotificationSink, NotificationSink, StoreNotificationSink};
