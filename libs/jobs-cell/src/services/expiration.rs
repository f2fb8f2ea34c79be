// ==============================================================================
// EXPIRATION REMINDERS
// ==============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::JobError;
use monitoring_cell::{NotificationRequest, NotificationSink};
use shared_database::{tables, Filter, RecordStore, RecordStoreExt, StoreError};
use shared_models::{ApiKey, ExpirationReminder, KeyStatus, NotificationChannel, NotificationType};
use shared_utils::Clock;

pub struct ExpirationReminderService {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl ExpirationReminderService {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<dyn NotificationSink>, clock: Arc<dyn Clock>) -> Self {
        Self { store, notifier, clock }
    }

    pub async fn already_sent(&self, api_key_id: Uuid, tier_days: i64) -> Result<bool, StoreError> {
        let existing = self
            .store
            .count(
                tables::EXPIRATION_REMINDERS,
                &[
                    Filter::eq("api_key_id", api_key_id),
                    Filter::eq("reminder_days", tier_days),
                ],
            )
            .await?;
        Ok(existing > 0)
    }

    /// Records the reminder for `(key, tier_days)` and hands the notification off.
    /// The record is kept even when the notification cannot be queued.
    #[instrument(skip(self, key), fields(api_key_id = %key.id))]
    pub async fn send_reminder(&self, key: &ApiKey, tier_days: i64) -> Result<ExpirationReminder, JobError> {
        let reminder = ExpirationReminder::new(key.id, tier_days, self.clock.now());
        let reminder = self
            .store
            .insert_record(tables::EXPIRATION_REMINDERS, &reminder)
            .await?;

        let expires_on = key
            .expires_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "an unknown date".to_string());

        let request = NotificationRequest {
            notification_type: NotificationType::ExpirationReminder,
            user_id: Some(key.user_id.clone()),
            title: format!("API key expires in {} days", tier_days),
            message: format!("Your API key '{}' expires on {}.", key.name, expires_on),
            channels: vec![NotificationChannel::Email, NotificationChannel::System],
            data: json!({
                "api_key_id": key.id,
                "reminder_days": tier_days,
                "expires_at": key.expires_at,
            }),
        };
        if let Err(e) = self.notifier.send(request).await {
            warn!("Expiration reminder notification failed: {}", e);
        }

        info!(tier_days, "Expiration reminder sent for key {}", key.name);
        Ok(reminder)
    }

    /// Marks ACTIVE keys whose expiry has passed as EXPIRED.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let expired = self
            .store
            .update(
                tables::API_KEYS,
                &[
                    Filter::eq("status", KeyStatus::Active.as_str()),
                    Filter::lte("expires_at", now),
                ],
                json!({ "status": KeyStatus::Expired.as_str() }),
            )
            .await?;

        if expired > 0 {
            info!(expired, "Marked overdue keys as expired");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use monitoring_cell::StoreNotificationSink;
    use shared_database::MemoryStore;
    use shared_utils::test_utils::{fixed_now, test_clock, TestKeys};

    fn service(store: Arc<MemoryStore>) -> ExpirationReminderService {
        let clock = test_clock();
        let sink = Arc::new(StoreNotificationSink::new(store.clone(), clock.clone()));
        ExpirationReminderService::new(store, sink, clock)
    }

    #[tokio::test]
    async fn reminders_are_keyed_by_key_and_tier() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let key = TestKeys::expiring_in("alpha", fixed_now(), Duration::days(2));

        assert!(!service.already_sent(key.id, 3).await.unwrap());
        service.send_reminder(&key, 3).await.unwrap();

        assert!(service.already_sent(key.id, 3).await.unwrap());
        assert!(!service.already_sent(key.id, 7).await.unwrap());

        let notifications = store.rows(tables::NOTIFICATIONS).await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0]["type"], "EXPIRATION_REMINDER");
        assert_eq!(notifications[0]["user_id"], "user-1");
    }

    #[tokio::test]
    async fn reminder_survives_notification_failure() {
        let store = Arc::new(MemoryStore::new());
        store.set_table_unavailable(tables::NOTIFICATIONS, true).await;
        let service = service(store.clone());
        let key = TestKeys::expiring_in("alpha", fixed_now(), Duration::days(6));

        assert!(service.send_reminder(&key, 7).await.is_ok());
        assert_eq!(store.rows(tables::EXPIRATION_REMINDERS).await.len(), 1);
    }

    #[tokio::test]
    async fn overdue_active_keys_are_expired() {
        let store = Arc::new(MemoryStore::new());
        let now = fixed_now();
        let overdue = TestKeys::expiring_in("overdue", now, Duration::hours(-1));
        let current = TestKeys::expiring_in("current", now, Duration::days(10));
        let open_ended = TestKeys::active("open", now);
        for key in [&overdue, &current, &open_ended] {
            store.insert_record(tables::API_KEYS, key).await.unwrap();
        }

        let expired = service(store.clone()).expire_overdue(now).await.unwrap();
        assert_eq!(expired, 1);

        let row: Option<ApiKey> = store
            .find_first(tables::API_KEYS, vec![Filter::eq("id", overdue.id)])
            .await
            .unwrap();
        assert_eq!(row.unwrap().status, KeyStatus::Expired);
    }
}
