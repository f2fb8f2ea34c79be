// =====================================================================================
// SERVICE WIRING
// =====================================================================================

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::cli::JobSet;
use jobs_cell::{
    AlertCheckJob, CleanupConfig, CleanupJob, DataSyncJob, ExpirationCheckJob, ExpirationReminderService,
    HttpUsageStatsClient, JobScheduler, JobsHandlers, SyncConfig,
};
use monitoring_cell::{AlertRuleEngine, HealthChecker, MetricsAggregator, MonitoringHandlers, StoreNotificationSink};
use shared_config::AppConfig;
use shared_database::{store_from_config, CacheClient};
use shared_utils::{Clock, SystemClock};

pub struct Ops {
    pub scheduler: Arc<JobScheduler>,
    pub monitoring: Arc<MonitoringHandlers>,
    pub jobs: Arc<JobsHandlers>,
}

fn cache_from_config(config: &AppConfig) -> Option<CacheClient> {
    let url = config.redis_url.as_deref()?;
    match CacheClient::from_url(url) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Cache disabled, could not create Redis pool: {}", e);
            None
        }
    }
}

/// Builds the services and registers the jobs selected by `selection`.
pub async fn build(config: &AppConfig, selection: JobSet, clock: Arc<dyn Clock>) -> anyhow::Result<Ops> {
    let store = store_from_config(config);
    let cache = cache_from_config(config);
    let notifier = Arc::new(StoreNotificationSink::new(store.clone(), clock.clone()));

    let metrics = Arc::new(MetricsAggregator::new(store.clone(), clock.clone()));
    let health = Arc::new(
        HealthChecker::from_config(config, store.clone(), cache, clock.clone())
            .context("failed to build health checker")?,
    );
    let engine = Arc::new(AlertRuleEngine::new(store.clone(), notifier.clone(), clock.clone()));
    let scheduler = Arc::new(JobScheduler::new(store.clone(), clock.clone()));
    let schedules = &config.schedules;

    if selection.includes(JobSet::Check) {
        let reminders = Arc::new(ExpirationReminderService::new(store.clone(), notifier.clone(), clock.clone()));
        scheduler
            .register(Arc::new(ExpirationCheckJob::new(
                store.clone(),
                reminders,
                &schedules.expiration_check,
            )))
            .await?;
    }

    if selection.includes(JobSet::Sync) {
        let client = HttpUsageStatsClient::from_config(config).context("failed to build relay client")?;
        scheduler
            .register(Arc::new(DataSyncJob::new(
                store.clone(),
                Arc::new(client),
                SyncConfig::from_config(config),
                &schedules.data_sync,
            )))
            .await?;
    }

    if selection.includes(JobSet::Cleanup) {
        scheduler
            .register(Arc::new(CleanupJob::new(
                store.clone(),
                CleanupConfig::from_config(config),
                &schedules.cleanup,
            )))
            .await?;
    }

    if selection.includes(JobSet::Monitor) {
        scheduler
            .register(Arc::new(AlertCheckJob::new(
                metrics.clone(),
                Some(health.clone()),
                engine.clone(),
                &schedules.alert_check,
            )))
            .await?;
    }

    info!(jobs = ?selection, "Services initialised");

    Ok(Ops {
        monitoring: Arc::new(MonitoringHandlers::new(health, metrics, engine)),
        jobs: Arc::new(JobsHandlers::new(scheduler.clone())),
        scheduler,
    })
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
