use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, error};

use crate::error::RelayError;
use crate::models::UsageStats;
use shared_config::AppConfig;

/// Remote source of per-key usage figures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageStatsClient: Send + Sync {
    async fn fetch_usage(&self, key_identifier: &str) -> Result<UsageStats, RelayError>;
}

pub struct HttpUsageStatsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpUsageStatsClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, RelayError> {
        Self::new(
            &config.relay_base_url,
            &config.relay_api_key,
            Duration::from_secs(config.relay_timeout_seconds),
        )
    }
}

#[async_trait]
impl UsageStatsClient for HttpUsageStatsClient {
    async fn fetch_usage(&self, key_identifier: &str) -> Result<UsageStats, RelayError> {
        let url = format!("{}/stats/{}", self.base_url, key_identifier);
        debug!("Fetching usage from {}", url);

        let mut request = self.client.get(&url);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RelayError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("Relay usage error ({}): {}", status, message);
            return Err(RelayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}
