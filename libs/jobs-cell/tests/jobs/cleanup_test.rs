use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jobs_cell::{CleanupConfig, CleanupJob};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::test_utils::fixed_now;

const LIVE_KEY: &str = "11111111-1111-1111-1111-111111111111";
const DELETED_KEY: &str = "22222222-2222-2222-2222-222222222222";

fn postgrest_job(server: &MockServer) -> CleanupJob {
    let config = AppConfig {
        supabase_url: server.uri(),
        supabase_service_key: "test-service-key".to_string(),
        ..AppConfig::default()
    };
    CleanupJob::new(
        Arc::new(SupabaseClient::new(&config)),
        CleanupConfig::default(),
        "0 3 * * *",
    )
}

#[tokio::test]
async fn orphan_pass_deletes_only_keys_confirmed_missing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/expiration_reminders"))
        .and(query_param("order", "id.asc"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Range", "0-1/2")
                .set_body_json(json!([
                    {"id": "aaaaaaaa-0000-0000-0000-000000000001", "api_key_id": LIVE_KEY},
                    {"id": "aaaaaaaa-0000-0000-0000-000000000002", "api_key_id": DELETED_KEY}
                ])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/api_keys"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Range", "0-0/1")
                .set_body_json(json!([{ "id": LIVE_KEY }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/usage_records"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Range", "*/0")
                .set_body_json(json!([])),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/expiration_reminders"))
        .and(query_param("api_key_id", format!("in.(\"{}\")", DELETED_KEY)))
        .respond_with(ResponseTemplate::new(204).insert_header("Content-Range", "*/1"))
        .expect(1)
        .mount(&server)
        .await;

    let report = postgrest_job(&server).cleanup(fixed_now()).await;

    assert_eq!(report.orphaned_reminders_deleted, 1);
    assert_eq!(report.orphaned_usage_deleted, 0);
    assert!(
        !report.errors.iter().any(|error| error.starts_with("orphans:")),
        "{:?}",
        report.errors
    );
}
