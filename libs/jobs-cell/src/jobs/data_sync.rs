use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{JobError, RelayError};
use crate::jobs::Job;
use crate::models::{JobOutcome, SyncConfig, SyncReport, UsageStats};
use crate::services::usage_stats::UsageStatsClient;
use shared_database::{tables, Filter, Query, RecordStore, RecordStoreExt};
use shared_models::{ApiKey, KeyStatus, UsageRecord};

pub struct DataSyncJob {
    store: Arc<dyn RecordStore>,
    client: Arc<dyn UsageStatsClient>,
    config: SyncConfig,
    schedule: String,
}

impl DataSyncJob {
    pub fn new(
        store: Arc<dyn RecordStore>,
        client: Arc<dyn UsageStatsClient>,
        config: SyncConfig,
        schedule: &str,
    ) -> Self {
        Self {
            store,
            client,
            config,
            schedule: schedule.to_string(),
        }
    }

    /// Pulls relay usage for every ACTIVE key, `batch_size` keys at a time.
    /// A key that fails is counted and reported; it never stops the others.
    #[instrument(skip(self))]
    pub async fn sync(&self, now: DateTime<Utc>) -> Result<SyncReport, JobError> {
        let start = Instant::now();
        let query = Query::new().filter(Filter::eq("status", KeyStatus::Active.as_str()));
        let keys: Vec<ApiKey> = self.store.find_records(tables::API_KEYS, &query).await?;

        let mut report = SyncReport {
            keys_total: keys.len(),
            keys_synced: 0,
            failed: 0,
            total_usage: 0,
            batches: 0,
            avg_sync_time_ms: 0.0,
            errors: Vec::new(),
        };

        for batch in keys.chunks(self.config.batch_size.max(1)) {
            report.batches += 1;
            let results = join_all(batch.iter().map(|key| self.sync_key(key, now))).await;

            for (key, result) in batch.iter().zip(results) {
                match result {
                    Ok(usage) => {
                        report.keys_synced += 1;
                        report.total_usage += usage;
                    }
                    Err(e) => {
                        warn!(api_key_id = %key.id, "Usage sync failed: {}", e);
                        report.failed += 1;
                        report.errors.push(format!("{}: {}", key.name, e));
                    }
                }
            }
        }

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        if report.keys_synced > 0 {
            report.avg_sync_time_ms = duration_ms / report.keys_synced as f64;
        }

        info!(
            keys_synced = report.keys_synced,
            failed = report.failed,
            total_usage = report.total_usage,
            "Usage sync finished"
        );
        Ok(report)
    }

    async fn sync_key(&self, key: &ApiKey, now: DateTime<Utc>) -> Result<i64, JobError> {
        let stats = self.fetch_with_retry(&key.key_identifier).await?;
        if stats.usage <= 0 {
            debug!(api_key_id = %key.id, "No new usage");
            return Ok(0);
        }

        self.store
            .update(
                tables::API_KEYS,
                &[Filter::eq("id", key.id)],
                json!({ "last_used_at": now }),
            )
            .await?;

        let record = UsageRecord {
            id: Uuid::new_v4(),
            api_key_id: key.id,
            usage: stats.usage,
            model: stats.model,
            prompt_tokens: stats.prompt_tokens,
            completion_tokens: stats.completion_tokens,
            duration_ms: stats.duration,
            recorded_at: now,
        };
        self.store.insert_record(tables::USAGE_RECORDS, &record).await?;

        Ok(stats.usage)
    }

    /// One retry after `retry_delay` when the relay rate-limits.
    async fn fetch_with_retry(&self, key_identifier: &str) -> Result<UsageStats, RelayError> {
        match self.client.fetch_usage(key_identifier).await {
            Err(RelayError::RateLimited) => {
                warn!(key_identifier, "Rate limited by relay, retrying once");
                tokio::time::sleep(self.config.retry_delay).await;
                self.client.fetch_usage(key_identifier).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl Job for DataSyncJob {
    fn name(&self) -> &str {
        "data-sync"
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    fn description(&self) -> &str {
        "Synchronises per-key usage from the relay"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobOutcome, JobError> {
        let report = self.sync(now).await?;
        Ok(JobOutcome::completed(serde_json::to_value(report)?))
    }
}
