use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jobs_cell::{DataSyncJob, HttpUsageStatsClient, Job, SyncConfig};
use shared_database::{tables, MemoryStore, RecordStoreExt};
use shared_models::KeyStatus;
use shared_utils::test_utils::{fixed_now, TestKeys};

async fn store_with(names: &[&str]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for name in names {
        store
            .insert_record(tables::API_KEYS, &TestKeys::active(name, fixed_now()))
            .await
            .unwrap();
    }
    store
}

fn job(store: Arc<MemoryStore>, server: &MockServer) -> DataSyncJob {
    let client = HttpUsageStatsClient::new(&server.uri(), "", Duration::from_secs(2)).unwrap();
    let config = SyncConfig {
        batch_size: 5,
        retry_delay: Duration::from_millis(10),
    };
    DataSyncJob::new(store, Arc::new(client), config, "0 * * * *")
}

#[tokio::test]
async fn rate_limited_key_recovers_after_one_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats/relay-beta"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "usage": 3 })))
        .mount(&server)
        .await;

    let store = store_with(&["alpha", "beta", "gamma"]).await;
    let report = job(store.clone(), &server).sync(fixed_now()).await.unwrap();

    assert_eq!(report.keys_synced, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.total_usage, 9);
    assert_eq!(store.rows(tables::USAGE_RECORDS).await.len(), 3);
}

#[tokio::test]
async fn unreachable_keys_are_reported_without_failing_the_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats/relay-broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "usage": 0 })))
        .mount(&server)
        .await;

    let store = store_with(&["ok", "broken"]).await;
    let result = job(store.clone(), &server).execute(fixed_now()).await;

    assert!(result.success);
    assert_eq!(result.details["keys_synced"], 1);
    assert_eq!(result.details["failed"], 1);
    assert!(store.rows(tables::USAGE_RECORDS).await.is_empty());
}

#[tokio::test]
async fn only_active_keys_are_synced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "usage": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(&["live"]).await;
    store
        .insert_record(
            tables::API_KEYS,
            &TestKeys::with_status("disabled", fixed_now(), KeyStatus::Disabled),
        )
        .await
        .unwrap();

    let report = assert_ok!(job(store, &server).sync(fixed_now()).await);
    assert_eq!(report.keys_total, 1);
}
