use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jobs_cell::{HttpUsageStatsClient, RelayError, UsageStatsClient};

fn client(server: &MockServer) -> HttpUsageStatsClient {
    HttpUsageStatsClient::new(&server.uri(), "relay-secret", Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn parses_camel_case_usage_and_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats/relay-alpha"))
        .and(header("authorization", "Bearer relay-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "usage": 42,
            "model": "gpt-4o-mini",
            "promptTokens": 300,
            "completionTokens": 120,
            "duration": 850
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stats = client(&server).fetch_usage("relay-alpha").await.unwrap();

    assert_eq!(stats.usage, 42);
    assert_eq!(stats.model.as_deref(), Some("gpt-4o-mini"));
    assert_eq!(stats.prompt_tokens, Some(300));
    assert_eq!(stats.completion_tokens, Some(120));
    assert_eq!(stats.duration, Some(850));
}

#[tokio::test]
async fn too_many_requests_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    assert_matches!(
        client(&server).fetch_usage("relay-alpha").await,
        Err(RelayError::RateLimited)
    );
}

#[tokio::test]
async fn server_errors_keep_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    assert_matches!(
        client(&server).fetch_usage("relay-alpha").await,
        Err(RelayError::Status { status: 503, message }) if message == "maintenance"
    );
}
