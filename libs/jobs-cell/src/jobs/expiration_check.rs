use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use crate::error::JobError;
use crate::jobs::Job;
use crate::models::{ExpirationReport, JobOutcome, TierReport};
use crate::services::expiration::ExpirationReminderService;
use shared_database::{tables, Filter, Query, RecordStore, RecordStoreExt};
use shared_models::{ApiKey, KeyStatus};

/// Reminder lead times in days, nearest first.
pub const REMINDER_TIERS: [i64; 3] = [3, 7, 30];

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Whole days left before `expires_at`, rounded up.
pub fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    ((expires_at - now).num_milliseconds() as f64 / MILLIS_PER_DAY).ceil() as i64
}

/// The nearest tier a key with `days_remaining` falls into.
pub fn reminder_tier(days_remaining: i64) -> Option<i64> {
    REMINDER_TIERS.iter().copied().find(|tier| days_remaining <= *tier)
}

pub struct ExpirationCheckJob {
    store: Arc<dyn RecordStore>,
    reminders: Arc<ExpirationReminderService>,
    schedule: String,
}

impl ExpirationCheckJob {
    pub fn new(store: Arc<dyn RecordStore>, reminders: Arc<ExpirationReminderService>, schedule: &str) -> Self {
        Self {
            store,
            reminders,
            schedule: schedule.to_string(),
        }
    }

    #[instrument(skip(self))]
    pub async fn check(&self, now: DateTime<Utc>) -> Result<ExpirationReport, JobError> {
        let expired = self.reminders.expire_overdue(now).await?;

        let horizon = REMINDER_TIERS[REMINDER_TIERS.len() - 1];
        let query = Query::new()
            .filter(Filter::eq("status", KeyStatus::Active.as_str()))
            .filter(Filter::gt("expires_at", now))
            .filter(Filter::lte("expires_at", now + Duration::days(horizon)));
        let keys: Vec<ApiKey> = self.store.find_records(tables::API_KEYS, &query).await?;

        let mut tiers: Vec<TierReport> = Vec::with_capacity(REMINDER_TIERS.len());
        let mut range_start = now;
        for tier_days in REMINDER_TIERS {
            let range_end = now + Duration::days(tier_days);
            tiers.push(TierReport {
                tier_days,
                range_start,
                range_end,
                checked: 0,
                sent: 0,
                skipped: 0,
            });
            range_start = range_end;
        }

        let mut failed = 0;
        let mut errors = Vec::new();

        for key in &keys {
            let Some(expires_at) = key.expires_at else {
                continue;
            };
            let Some(tier_days) = reminder_tier(days_remaining(expires_at, now)) else {
                continue;
            };
            let Some(tier) = tiers.iter_mut().find(|tier| tier.tier_days == tier_days) else {
                continue;
            };
            tier.checked += 1;

            let outcome = match self.reminders.already_sent(key.id, tier_days).await {
                Ok(true) => Ok(false),
                Ok(false) => self.reminders.send_reminder(key, tier_days).await.map(|_| true),
                Err(e) => Err(JobError::from(e)),
            };

            match outcome {
                Ok(true) => tier.sent += 1,
                Ok(false) => tier.skipped += 1,
                Err(e) => {
                    warn!(api_key_id = %key.id, "Expiration reminder failed: {}", e);
                    failed += 1;
                    errors.push(format!("{}: {}", key.id, e));
                }
            }
        }

        let report = ExpirationReport {
            checked: tiers.iter().map(|tier| tier.checked).sum(),
            sent: tiers.iter().map(|tier| tier.sent).sum(),
            skipped: tiers.iter().map(|tier| tier.skipped).sum(),
            failed,
            expired,
            tiers,
            errors,
        };

        info!(
            checked = report.checked,
            sent = report.sent,
            skipped = report.skipped,
            expired = report.expired,
            "Expiration check finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl Job for ExpirationCheckJob {
    fn name(&self) -> &str {
        "expiration-check"
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    fn description(&self) -> &str {
        "Sends 30/7/3-day expiration reminders and expires overdue keys"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobOutcome, JobError> {
        let report = self.check(now).await?;
        Ok(JobOutcome::completed(serde_json::to_value(report)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitoring_cell::StoreNotificationSink;
    use shared_database::MemoryStore;
    use shared_models::ExpirationReminder;
    use shared_utils::test_utils::{fixed_now, test_clock, TestKeys};

    fn job(store: Arc<MemoryStore>) -> ExpirationCheckJob {
        let clock = test_clock();
        let sink = Arc::new(StoreNotificationSink::new(store.clone(), clock.clone()));
        let reminders = Arc::new(ExpirationReminderService::new(store.clone(), sink, clock));
        ExpirationCheckJob::new(store, reminders, "0 9 * * *")
    }

    async fn insert_keys(store: &MemoryStore, keys: &[ApiKey]) {
        for key in keys {
            store.insert_record(tables::API_KEYS, key).await.unwrap();
        }
    }

    fn tier<'a>(report: &'a ExpirationReport, days: i64) -> &'a TierReport {
        report.tiers.iter().find(|tier| tier.tier_days == days).unwrap()
    }

    #[test]
    fn days_remaining_rounds_up() {
        let now = fixed_now();
        assert_eq!(days_remaining(now + Duration::hours(1), now), 1);
        assert_eq!(days_remaining(now + Duration::days(2), now), 2);
        assert_eq!(days_remaining(now + Duration::days(2) + Duration::minutes(1), now), 3);
        assert_eq!(days_remaining(now + Duration::days(7) + Duration::seconds(1), now), 8);
    }

    #[test]
    fn tiers_take_the_nearest_lead_time() {
        assert_eq!(reminder_tier(1), Some(3));
        assert_eq!(reminder_tier(2), Some(3));
        assert_eq!(reminder_tier(3), Some(3));
        assert_eq!(reminder_tier(4), Some(7));
        assert_eq!(reminder_tier(7), Some(7));
        assert_eq!(reminder_tier(8), Some(30));
        assert_eq!(reminder_tier(30), Some(30));
        assert_eq!(reminder_tier(31), None);
    }

    #[tokio::test]
    async fn key_two_days_out_lands_in_tier_three_only() {
        let store = Arc::new(MemoryStore::new());
        let now = fixed_now();
        let key = TestKeys::expiring_in("soon", now, Duration::days(2));
        insert_keys(&store, &[key.clone()]).await;

        let report = job(store.clone()).check(now).await.unwrap();

        assert_eq!(tier(&report, 3).sent, 1);
        assert_eq!(tier(&report, 7).checked, 0);
        assert_eq!(tier(&report, 30).checked, 0);

        let reminders: Vec<ExpirationReminder> = store
            .find_records(tables::EXPIRATION_REMINDERS, &Query::new())
            .await
            .unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].api_key_id, key.id);
        assert_eq!(reminders[0].reminder_days, 3);
    }

    #[tokio::test]
    async fn second_run_skips_reminders_already_sent() {
        let store = Arc::new(MemoryStore::new());
        let now = fixed_now();
        insert_keys(
            &store,
            &[
                TestKeys::expiring_in("three", now, Duration::days(3)),
                TestKeys::expiring_in("six", now, Duration::days(6)),
                TestKeys::expiring_in("twenty", now, Duration::days(20)),
            ],
        )
        .await;
        let job = job(store.clone());

        let first = job.check(now).await.unwrap();
        assert_eq!((first.checked, first.sent, first.skipped), (3, 3, 0));

        let second = job.check(now).await.unwrap();
        assert_eq!((second.checked, second.sent, second.skipped), (3, 0, 3));
        assert_eq!(store.rows(tables::EXPIRATION_REMINDERS).await.len(), 3);
        assert_eq!(store.rows(tables::NOTIFICATIONS).await.len(), 3);
    }

    #[tokio::test]
    async fn scan_ignores_inactive_distant_and_past_keys() {
        let store = Arc::new(MemoryStore::new());
        let now = fixed_now();
        let overdue = TestKeys::expiring_in("overdue", now, Duration::days(-1));
        let mut revoked = TestKeys::expiring_in("revoked", now, Duration::days(2));
        revoked.status = KeyStatus::Revoked;
        insert_keys(
            &store,
            &[
                overdue.clone(),
                revoked,
                TestKeys::expiring_in("distant", now, Duration::days(45)),
                TestKeys::active("forever", now),
            ],
        )
        .await;

        let report = job(store.clone()).check(now).await.unwrap();
        assert_eq!(report.checked, 0);
        assert_eq!(report.expired, 1);

        let stored: Option<ApiKey> = store
            .find_first(tables::API_KEYS, vec![Filter::eq("id", overdue.id)])
            .await
            .unwrap();
        assert_eq!(stored.unwrap().status, KeyStatus::Expired);
    }

    #[tokio::test]
    async fn tier_ranges_partition_the_scan_window() {
        let now = fixed_now();
        let report = job(Arc::new(MemoryStore::new())).check(now).await.unwrap();

        assert_eq!(tier(&report, 3).range_start, now);
        assert_eq!(tier(&report, 7).range_start, now + Duration::days(3));
        assert_eq!(tier(&report, 30).range_start, now + Duration::days(7));
        assert_eq!(tier(&report, 30).range_end, now + Duration::days(30));
    }

    #[tokio::test]
    async fn store_outage_fails_the_run() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true).await;

        let result = job(store).execute(fixed_now()).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }
}
