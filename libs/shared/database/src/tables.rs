//! Table names shared by every cell that talks to the record store.

pub const METRIC_SAMPLES: &str = "metric_samples";
pub const HEALTH_SNAPSHOTS: &str = "health_snapshots";
pub const ALERT_RULES: &str = "alert_rules";
pub const ALERT_RECORDS: &str = "alert_records";
pub const API_KEYS: &str = "api_keys";
pub const EXPIRATION_REMINDERS: &str = "expiration_reminders";
pub const USAGE_RECORDS: &str = "usage_records";
pub const USAGE_RECORDS_ARCHIVE: &str = "usage_records_archive";
pub const NOTIFICATIONS: &str = "notifications";
pub const JOB_LOGS: &str = "job_logs";
