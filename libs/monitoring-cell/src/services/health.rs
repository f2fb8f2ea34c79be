// =====================================================================================
// HEALTH CHECK SERVICE
// =====================================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::models::{HealthStatus, MonitoringError, ServiceHealth, ServiceStatus, SystemHealthSnapshot};
use shared_config::AppConfig;
use shared_database::{tables, CacheClient, RecordStore};
use shared_utils::Clock;

pub const LATEST_HEALTH_CACHE_KEY: &str = "health:latest";
const LATEST_HEALTH_TTL_SECONDS: u64 = 60;

/// One dependency check. An `Err` marks the dependency unhealthy; `Ok` may carry metadata.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn probe(&self) -> Result<Option<Value>, MonitoringError>;
}

pub struct StoreProbe {
    store: Arc<dyn RecordStore>,
}

impl StoreProbe {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthProbe for StoreProbe {
    fn name(&self) -> &str {
        "database"
    }

    async fn probe(&self) -> Result<Option<Value>, MonitoringError> {
        self.store.ping().await?;
        Ok(None)
    }
}

pub struct CacheProbe {
    cache: Option<CacheClient>,
}

impl CacheProbe {
    pub fn new(cache: Option<CacheClient>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl HealthProbe for CacheProbe {
    fn name(&self) -> &str {
        "cache"
    }

    async fn probe(&self) -> Result<Option<Value>, MonitoringError> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| MonitoringError::HealthCheckFailed("cache not configured".to_string()))?;
        cache
            .ping()
            .await
            .map_err(|e| MonitoringError::HealthCheckFailed(e.to_string()))?;
        Ok(None)
    }
}

/// GETs a remote health endpoint; any 2xx within the timeout is healthy.
pub struct HttpProbe {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(name: &str, url: &str, timeout: Duration) -> Result<Self, MonitoringError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitoringError::HealthCheckFailed(e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> Result<Option<Value>, MonitoringError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| MonitoringError::HealthCheckFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitoringError::HealthCheckFailed(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        Ok(Some(json!({ "status_code": status.as_u16() })))
    }
}

pub struct HealthChecker {
    probes: Vec<Arc<dyn HealthProbe>>,
    store: Arc<dyn RecordStore>,
    cache: Option<CacheClient>,
    clock: Arc<dyn Clock>,
}

impl HealthChecker {
    pub fn new(
        probes: Vec<Arc<dyn HealthProbe>>,
        store: Arc<dyn RecordStore>,
        cache: Option<CacheClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            probes,
            store,
            cache,
            clock,
        }
    }

    /// Store, cache and relay probes as configured.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn RecordStore>,
        cache: Option<CacheClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MonitoringError> {
        let relay_health_url = format!("{}/health", config.relay_base_url.trim_end_matches('/'));
        let probes: Vec<Arc<dyn HealthProbe>> = vec![
            Arc::new(StoreProbe::new(store.clone())),
            Arc::new(CacheProbe::new(cache.clone())),
            Arc::new(HttpProbe::new(
                "relay",
                &relay_health_url,
                Duration::from_secs(config.relay_timeout_seconds),
            )?),
        ];

        Ok(Self::new(probes, store, cache, clock))
    }

    pub fn components(&self) -> Vec<String> {
        self.probes.iter().map(|probe| probe.name().to_string()).collect()
    }

    /// Probes every dependency concurrently. Never fails: a failing probe is
    /// reported as an unhealthy service.
    #[instrument(skip(self))]
    pub async fn check_all(&self) -> SystemHealthSnapshot {
        let results = join_all(self.probes.iter().map(|probe| run_probe(probe.as_ref()))).await;
        let services: BTreeMap<String, ServiceHealth> = self
            .probes
            .iter()
            .map(|probe| probe.name().to_string())
            .zip(results)
            .collect();

        let snapshot = SystemHealthSnapshot {
            overall: overall_status(&services),
            services,
            timestamp: self.clock.now(),
        };

        info!(
            overall = ?snapshot.overall,
            unhealthy = snapshot.unhealthy_count(),
            "Health check completed"
        );

        self.persist(&snapshot).await;
        snapshot
    }

    pub async fn check_component(&self, name: &str) -> Option<ServiceHealth> {
        let probe = self.probes.iter().find(|probe| probe.name() == name)?;
        Some(run_probe(probe.as_ref()).await)
    }

    async fn persist(&self, snapshot: &SystemHealthSnapshot) {
        match serde_json::to_value(snapshot) {
            Ok(row) => {
                if let Err(e) = self.store.insert(tables::HEALTH_SNAPSHOTS, row).await {
                    warn!("Failed to persist health snapshot: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize health snapshot: {}", e),
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache
                .set_json(LATEST_HEALTH_CACHE_KEY, snapshot, LATEST_HEALTH_TTL_SECONDS)
                .await
            {
                debug!("Failed to cache health snapshot: {}", e);
            }
        }
    }
}

async fn run_probe(probe: &dyn HealthProbe) -> ServiceHealth {
    let start = Instant::now();
    let result = probe.probe().await;
    let response_time_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(metadata) => ServiceHealth {
            status: ServiceStatus::Healthy,
            response_time_ms,
            error: None,
            metadata,
        },
        Err(e) => {
            warn!(service = probe.name(), "Health probe failed: {}", e);
            ServiceHealth {
                status: ServiceStatus::Unhealthy,
                response_time_ms,
                error: Some(e.to_string()),
                metadata: None,
            }
        }
    }
}

pub fn overall_status(services: &BTreeMap<String, ServiceHealth>) -> HealthStatus {
    let healthy = services
        .values()
        .filter(|service| service.status == ServiceStatus::Healthy)
        .count();

    if healthy == services.len() {
        HealthStatus::Healthy
    } else if healthy == 0 {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}
