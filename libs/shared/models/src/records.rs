// =====================================================================================
// PERSISTED RECORDS SHARED ACROSS CELLS
// =====================================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyStatus {
    Active,
    Disabled,
    Expired,
    Revoked,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "ACTIVE",
            KeyStatus::Disabled => "DISABLED",
            KeyStatus::Expired => "EXPIRED",
            KeyStatus::Revoked => "REVOKED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    /// Identifier of the key on the relay, used for usage lookups.
    pub key_identifier: String,
    pub status: KeyStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn new(user_id: &str, name: &str, key_identifier: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            key_identifier: key_identifier.to_string(),
            status: KeyStatus::Active,
            expires_at: None,
            last_used_at: None,
            created_at,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub usage: i64,
    pub model: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub duration_ms: Option<i64>,
    pub recorded_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn archived(&self, archived_at: DateTime<Utc>) -> ArchivedUsageRecord {
        ArchivedUsageRecord {
            id: Uuid::new_v4(),
            source_id: self.id,
            api_key_id: self.api_key_id,
            usage: self.usage,
            model: self.model.clone(),
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            duration_ms: self.duration_ms,
            recorded_at: self.recorded_at,
            archived_at,
        }
    }
}

/// Copy of a usage record moved out of the hot table. `source_id` is the id the
/// row had in `usage_records` and makes re-archiving the same row detectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedUsageRecord {
    pub id: Uuid,
    pub source_id: Uuid,
    pub api_key_id: Uuid,
    pub usage: i64,
    pub model: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub duration_ms: Option<i64>,
    pub recorded_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Alert,
    AlertResolved,
    ExpirationReminder,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Webhook,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub channels: Vec<NotificationChannel>,
    pub data: serde_json::Value,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
}

/// Marks that the reminder for a key at a given lead time was already sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpirationReminder {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub reminder_days: i64,
    pub sent_at: DateTime<Utc>,
}

impl ExpirationReminder {
    pub fn new(api_key_id: Uuid, reminder_days: i64, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            api_key_id,
            reminder_days,
            sent_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobRunStatus {
    Success,
    Failed,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Success => "SUCCESS",
            JobRunStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLog {
    pub id: Uuid,
    pub job_name: String,
    pub status: JobRunStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub details: serde_json::Value,
    pub executed_at: DateTime<Utc>,
}
