use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::Job;
use crate::models::{CleanupConfig, CleanupReport, JobOutcome};
use shared_database::{tables, Direction, Filter, Query, RecordStore, RecordStoreExt, StoreError};
use shared_models::{ArchivedUsageRecord, JobRunStatus, NotificationStatus, UsageRecord};

#[derive(serde::Deserialize)]
struct IdRow {
    id: Uuid,
}

#[derive(serde::Deserialize)]
struct KeyRefRow {
    id: Uuid,
    api_key_id: Uuid,
}

pub struct CleanupJob {
    store: Arc<dyn RecordStore>,
    config: CleanupConfig,
    schedule: String,
}

impl CleanupJob {
    pub fn new(store: Arc<dyn RecordStore>, config: CleanupConfig, schedule: &str) -> Self {
        Self {
            store,
            config,
            schedule: schedule.to_string(),
        }
    }

    /// Runs every retention pass. A failing pass is recorded in `errors` and
    /// the remaining passes still run.
    #[instrument(skip(self))]
    pub async fn cleanup(&self, now: DateTime<Utc>) -> CleanupReport {
        let mut report = CleanupReport {
            notifications_before: self.count_rows(tables::NOTIFICATIONS).await,
            job_logs_before: self.count_rows(tables::JOB_LOGS).await,
            ..CleanupReport::default()
        };

        match self.delete_old_notifications(now).await {
            Ok(deleted) => report.notifications_deleted = deleted,
            Err(e) => report.errors.push(format!("notifications: {}", e)),
        }

        match self.delete_old_job_logs(now).await {
            Ok(deleted) => report.job_logs_deleted = deleted,
            Err(e) => report.errors.push(format!("job_logs: {}", e)),
        }

        match self.delete_orphans().await {
            Ok((reminders, usage)) => {
                report.orphaned_reminders_deleted = reminders;
                report.orphaned_usage_deleted = usage;
            }
            Err(e) => report.errors.push(format!("orphans: {}", e)),
        }

        match self.archive_usage(now).await {
            Ok((archived, deleted)) => {
                report.usage_archived = archived;
                report.usage_deleted = deleted;
            }
            Err(e) => report.errors.push(format!("usage_archive: {}", e)),
        }

        report.notifications_after = self.count_rows(tables::NOTIFICATIONS).await;
        report.job_logs_after = self.count_rows(tables::JOB_LOGS).await;

        for error in &report.errors {
            warn!("Cleanup pass failed: {}", error);
        }
        info!(
            notifications = report.notifications_deleted,
            job_logs = report.job_logs_deleted,
            orphaned_reminders = report.orphaned_reminders_deleted,
            orphaned_usage = report.orphaned_usage_deleted,
            archived = report.usage_archived,
            "Cleanup finished"
        );
        report
    }

    async fn count_rows(&self, table: &str) -> Option<u64> {
        match self.store.count(table, &[]).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(table, "Row count unavailable: {}", e);
                None
            }
        }
    }

    /// Terminal notifications past retention. PENDING rows are kept regardless of age.
    async fn delete_old_notifications(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff = now - Duration::days(self.config.notification_retention_days);
        self.store
            .delete(
                tables::NOTIFICATIONS,
                &[
                    Filter::is_in(
                        "status",
                        [NotificationStatus::Sent.as_str(), NotificationStatus::Failed.as_str()],
                    ),
                    Filter::lt("created_at", cutoff),
                ],
            )
            .await
    }

    /// Only successful runs; failed-run logs are kept for diagnosis.
    async fn delete_old_job_logs(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff = now - Duration::days(self.config.job_log_retention_days);
        self.store
            .delete(
                tables::JOB_LOGS,
                &[
                    Filter::eq("status", JobRunStatus::Success.as_str()),
                    Filter::lt("executed_at", cutoff),
                ],
            )
            .await
    }

    async fn delete_orphans(&self) -> Result<(u64, u64), StoreError> {
        let reminders = self.delete_orphans_in(tables::EXPIRATION_REMINDERS).await?;
        let usage = self.delete_orphans_in(tables::USAGE_RECORDS).await?;
        Ok((reminders, usage))
    }

    /// Walks `table` by id in bounded chunks, looks up the keys each chunk
    /// references and deletes rows only for keys confirmed missing. Request
    /// size depends on the chunk, never on the number of keys.
    async fn delete_orphans_in(&self, table: &str) -> Result<u64, StoreError> {
        let chunk_size = self.config.orphan_scan_batch_size.max(1);
        let mut deleted = 0;
        let mut after: Option<Uuid> = None;

        loop {
            let mut query = Query::new().order_by("id", Direction::Asc).limit(chunk_size);
            if let Some(after) = after {
                query = query.filter(Filter::gt("id", after));
            }
            let chunk: Vec<KeyRefRow> = self.store.find_records(table, &query).await?;
            let Some(last) = chunk.last() else {
                break;
            };
            after = Some(last.id);

            let referenced: HashSet<Uuid> = chunk.iter().map(|row| row.api_key_id).collect();
            let existing: Vec<IdRow> = self
                .store
                .find_records(
                    tables::API_KEYS,
                    &Query::new().filter(Filter::is_in("id", &referenced)),
                )
                .await?;
            let existing: HashSet<Uuid> = existing.into_iter().map(|row| row.id).collect();

            let mut missing: Vec<Uuid> = referenced.difference(&existing).copied().collect();
            if !missing.is_empty() {
                missing.sort();
                deleted += self
                    .store
                    .delete(table, &[Filter::is_in("api_key_id", &missing)])
                    .await?;
            }

            if chunk.len() < chunk_size {
                break;
            }
        }

        Ok(deleted)
    }

    /// Moves at most one batch of old usage rows into the archive table.
    ///
    /// Rows whose `source_id` is already archived are not copied again, so a run
    /// interrupted between copy and delete is completed by the next one.
    async fn archive_usage(&self, now: DateTime<Utc>) -> Result<(u64, u64), StoreError> {
        let cutoff = now - Duration::days(self.config.usage_archive_after_days);
        let query = Query::new()
            .filter(Filter::lt("recorded_at", cutoff))
            .order_by("recorded_at", Direction::Asc)
            .limit(self.config.usage_archive_batch_size.max(1));
        let batch: Vec<UsageRecord> = self.store.find_records(tables::USAGE_RECORDS, &query).await?;
        if batch.is_empty() {
            return Ok((0, 0));
        }

        let ids: Vec<Uuid> = batch.iter().map(|record| record.id).collect();
        let already: Vec<ArchivedUsageRecord> = self
            .store
            .find_records(
                tables::USAGE_RECORDS_ARCHIVE,
                &Query::new().filter(Filter::is_in("source_id", &ids)),
            )
            .await?;
        let already: HashSet<Uuid> = already.into_iter().map(|record| record.source_id).collect();

        let rows = batch
            .iter()
            .filter(|record| !already.contains(&record.id))
            .map(|record| serde_json::to_value(record.archived(now)))
            .collect::<Result<Vec<Value>, _>>()?;

        let archived = if rows.is_empty() {
            0
        } else {
            self.store.insert_many(tables::USAGE_RECORDS_ARCHIVE, rows).await?
        };
        let deleted = self
            .store
            .delete(tables::USAGE_RECORDS, &[Filter::is_in("id", &ids)])
            .await?;

        Ok((archived, deleted))
    }
}

#[async_trait]
impl Job for CleanupJob {
    fn name(&self) -> &str {
        "cleanup"
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    fn description(&self) -> &str {
        "Applies retention to notifications, job logs, orphans and old usage"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobOutcome, JobError> {
        let report = self.cleanup(now).await;
        let failure = (!report.errors.is_empty()).then(|| report.errors.join("; "));
        let details = serde_json::to_value(report)?;

        Ok(match failure {
            None => JobOutcome::completed(details),
            Some(failure) => JobOutcome::failed(details, failure),
        })
    }
}
