use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use monitoring_cell::{AlertEvaluation, HealthStatus};
use shared_config::AppConfig;

// ==============================================================================
// JOB RESULTS
// ==============================================================================

/// What a job run produced. `failure` set means the run did not meet its contract.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub details: Value,
    pub failure: Option<String>,
}

impl JobOutcome {
    pub fn completed(details: Value) -> Self {
        Self {
            details,
            failure: None,
        }
    }

    pub fn failed(details: Value, failure: impl Into<String>) -> Self {
        Self {
            details,
            failure: Some(failure.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionResult {
    pub job_name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub details: Value,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub name: String,
    pub schedule: String,
    pub description: String,
    pub next_run: Option<DateTime<Utc>>,
    pub running: bool,
}

// ==============================================================================
// EXPIRATION CHECK
// ==============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TierReport {
    pub tier_days: i64,
    /// Expiry window `(range_start, range_end]` this tier covers.
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub checked: usize,
    pub sent: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpirationReport {
    pub checked: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    /// ACTIVE keys past their expiry that were marked EXPIRED.
    pub expired: u64,
    pub tiers: Vec<TierReport>,
    pub errors: Vec<String>,
}

// ==============================================================================
// DATA SYNC
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

impl SyncConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.sync_batch_size.max(1),
            retry_delay: Duration::from_millis(config.sync_retry_delay_ms),
        }
    }
}

/// Usage reported by the relay for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub usage: i64,
    pub model: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub keys_total: usize,
    pub keys_synced: usize,
    pub failed: usize,
    pub total_usage: i64,
    pub batches: usize,
    pub avg_sync_time_ms: f64,
    pub errors: Vec<String>,
}

// ==============================================================================
// CLEANUP
// ==============================================================================

#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub notification_retention_days: i64,
    pub job_log_retention_days: i64,
    pub usage_archive_after_days: i64,
    pub usage_archive_batch_size: usize,
    /// Referencing rows inspected per key lookup in the orphan pass.
    pub orphan_scan_batch_size: usize,
}

const ORPHAN_SCAN_BATCH_SIZE: usize = 100;

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            notification_retention_days: 30,
            job_log_retention_days: 90,
            usage_archive_after_days: 180,
            usage_archive_batch_size: 1000,
            orphan_scan_batch_size: ORPHAN_SCAN_BATCH_SIZE,
        }
    }
}

impl CleanupConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            notification_retention_days: config.notification_retention_days,
            job_log_retention_days: config.job_log_retention_days,
            usage_archive_after_days: config.usage_archive_after_days,
            usage_archive_batch_size: config.usage_archive_batch_size,
            orphan_scan_batch_size: ORPHAN_SCAN_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub notifications_deleted: u64,
    pub job_logs_deleted: u64,
    pub orphaned_reminders_deleted: u64,
    pub orphaned_usage_deleted: u64,
    pub usage_archived: u64,
    pub usage_deleted: u64,
    pub notifications_before: Option<u64>,
    pub notifications_after: Option<u64>,
    pub job_logs_before: Option<u64>,
    pub job_logs_after: Option<u64>,
    pub errors: Vec<String>,
}

// ==============================================================================
// ALERT CHECK
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AlertCheckReport {
    pub memory_recorded: bool,
    pub health: Option<HealthStatus>,
    pub requests_per_second: f64,
    pub p95_response_time_ms: f64,
    #[serde(flatten)]
    pub evaluation: AlertEvaluation,
    pub checked_at: DateTime<Utc>,
}
