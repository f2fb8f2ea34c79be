// ==============================================================================
// JOBS CELL INTEGRATION TESTS
// ==============================================================================

mod cleanup_test;
mod data_sync_test;
mod relay_client_test;
mod router_test;
mod scheduler_test;

use std::sync::Arc;

use jobs_cell::{
    AlertCheckJob, CleanupConfig, CleanupJob, ExpirationCheckJob, ExpirationReminderService, JobScheduler,
};
use monitoring_cell::{AlertRuleEngine, MetricsAggregator, StoreNotificationSink};
use shared_database::MemoryStore;
use shared_utils::test_utils::test_clock;
use shared_utils::ManualClock;

pub struct TestOps {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub scheduler: Arc<JobScheduler>,
}

/// Scheduler with the store-only jobs registered: expiration, cleanup and alert check.
pub async fn setup_ops() -> TestOps {
    let store = Arc::new(MemoryStore::new());
    let clock = test_clock();
    let sink = Arc::new(StoreNotificationSink::new(store.clone(), clock.clone()));

    let reminders = Arc::new(ExpirationReminderService::new(store.clone(), sink.clone(), clock.clone()));
    let metrics = Arc::new(MetricsAggregator::new(store.clone(), clock.clone()));
    let engine = Arc::new(AlertRuleEngine::new(store.clone(), sink, clock.clone()));

    let scheduler = Arc::new(JobScheduler::new(store.clone(), clock.clone()));
    scheduler
        .register(Arc::new(ExpirationCheckJob::new(store.clone(), reminders, "0 9 * * *")))
        .await
        .unwrap();
    scheduler
        .register(Arc::new(CleanupJob::new(store.clone(), CleanupConfig::default(), "0 3 * * *")))
        .await
        .unwrap();
    scheduler
        .register(Arc::new(AlertCheckJob::new(metrics, None, engine, "*/5 * * * *")))
        .await
        .unwrap();

    TestOps { store, clock, scheduler }
}
