use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{ApiKey, KeyStatus, Notification, NotificationStatus, NotificationType};

use crate::clock::ManualClock;

/// 2026-06-15T12:00:00Z, a fixed instant every fixture is anchored to.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(fixed_now()))
}

pub struct TestConfig {
    pub supabase_url: String,
    pub relay_base_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            relay_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: if self.supabase_url.is_empty() {
                String::new()
            } else {
                "test-service-key".to_string()
            },
            relay_base_url: self.relay_base_url.clone(),
            relay_api_key: "test-relay-key".to_string(),
            relay_timeout_seconds: 2,
            sync_retry_delay_ms: 0,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestKeys;

impl TestKeys {
    pub fn active(name: &str, now: DateTime<Utc>) -> ApiKey {
        ApiKey::new("user-1", name, &format!("relay-{}", name), now - Duration::days(60))
    }

    pub fn expiring_in(name: &str, now: DateTime<Utc>, remaining: Duration) -> ApiKey {
        Self::active(name, now).with_expiry(now + remaining)
    }

    pub fn with_status(name: &str, now: DateTime<Utc>, status: KeyStatus) -> ApiKey {
        let mut key = Self::active(name, now);
        key.status = status;
        key
    }
}

pub fn notification(status: NotificationStatus, created_at: DateTime<Utc>) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        user_id: Some("user-1".to_string()),
        notification_type: NotificationType::System,
        title: "Test notification".to_string(),
        message: "Created by a test fixture".to_string(),
        channels: Vec::new(),
        data: serde_json::Value::Null,
        status,
        created_at,
    }
}
