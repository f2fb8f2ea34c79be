// =====================================================================================
// METRICS AGGREGATOR SERVICE
// =====================================================================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{
    MemoryTrend, MetricSample, MetricType, MetricsSnapshot, MonitoringError, TrendDirection, HEAP_USED,
};
use shared_database::{tables, Direction, Filter, Query, RecordStore, RecordStoreExt};
use shared_utils::Clock;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Trailing window for QPS.
    pub qps_window: Duration,
    /// Trailing window for the average and P95 reported by `snapshot`.
    pub stats_window: Duration,
    pub memory_trend_samples: usize,
    pub memory_trend_threshold_percent: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            qps_window: Duration::seconds(60),
            stats_window: Duration::hours(1),
            memory_trend_samples: 10,
            memory_trend_threshold_percent: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AverageOptions {
    pub exclude_outliers: bool,
}

pub struct MetricsAggregator {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    config: MetricsConfig,
    system: Mutex<System>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(store, clock, MetricsConfig::default())
    }

    pub fn with_config(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, config: MetricsConfig) -> Self {
        Self {
            store,
            clock,
            config,
            system: Mutex::new(System::new()),
        }
    }

    pub async fn record(
        &self,
        metric_type: MetricType,
        name: &str,
        value: f64,
        unit: &str,
        tags: HashMap<String, String>,
    ) -> Result<MetricSample, MonitoringError> {
        let sample = MetricSample {
            id: Uuid::new_v4(),
            metric_type,
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            tags,
            timestamp: self.clock.now(),
        };
        Ok(self.store.insert_record(tables::METRIC_SAMPLES, &sample).await?)
    }

    #[instrument(skip(self, tags))]
    pub async fn record_response_time(
        &self,
        endpoint: &str,
        value_ms: f64,
        tags: Option<HashMap<String, String>>,
    ) -> Result<MetricSample, MonitoringError> {
        let mut tags = tags.unwrap_or_default();
        tags.insert("endpoint".to_string(), endpoint.to_string());
        self.record(MetricType::ResponseTime, endpoint, value_ms, "ms", tags).await
    }

    pub async fn record_database_query(&self, query_name: &str, value_ms: f64) -> Result<MetricSample, MonitoringError> {
        self.record(MetricType::DatabaseQuery, query_name, value_ms, "ms", HashMap::new())
            .await
    }

    /// Snapshot of this process's memory as one `memory_usage/heap_used` sample (MB).
    #[instrument(skip(self))]
    pub async fn record_memory_usage(&self) -> Result<MetricSample, MonitoringError> {
        let (resident, virtual_memory, system_used, system_total) = {
            let pid = sysinfo::get_current_pid()
                .map_err(|e| MonitoringError::MetricsError(e.to_string()))?;
            let mut system = self
                .system
                .lock()
                .map_err(|_| MonitoringError::MetricsError("system info lock poisoned".to_string()))?;
            system.refresh_memory();
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            let (resident, virtual_memory) = system
                .process(pid)
                .map(|process| (process.memory(), process.virtual_memory()))
                .unwrap_or((0, 0));
            (resident, virtual_memory, system.used_memory(), system.total_memory())
        };

        let tags = HashMap::from([
            ("rss_mb".to_string(), format!("{:.2}", resident as f64 / BYTES_PER_MB)),
            ("virtual_mb".to_string(), format!("{:.2}", virtual_memory as f64 / BYTES_PER_MB)),
            ("system_used_mb".to_string(), format!("{:.2}", system_used as f64 / BYTES_PER_MB)),
            ("system_total_mb".to_string(), format!("{:.2}", system_total as f64 / BYTES_PER_MB)),
        ]);

        debug!(resident_bytes = resident, "Recording memory usage");
        self.record(MetricType::MemoryUsage, HEAP_USED, resident as f64 / BYTES_PER_MB, "MB", tags)
            .await
    }

    /// Response-time samples per second over the trailing window ending at `now`.
    pub async fn get_qps(&self, now: Option<DateTime<Utc>>) -> Result<f64, MonitoringError> {
        let now = now.unwrap_or_else(|| self.clock.now());
        let window_start = now - self.config.qps_window;
        let count = self
            .store
            .count(
                tables::METRIC_SAMPLES,
                &[
                    Filter::eq("type", MetricType::ResponseTime.as_str()),
                    Filter::gte("timestamp", window_start),
                    Filter::lte("timestamp", now),
                ],
            )
            .await?;

        Ok(count as f64 / self.config.qps_window.num_seconds() as f64)
    }

    /// Mean over every matching response-time sample, regardless of age.
    pub async fn get_average_response_time(
        &self,
        endpoint: Option<&str>,
        options: AverageOptions,
    ) -> Result<f64, MonitoringError> {
        let values = self.response_times(endpoint, None).await?;
        Ok(if options.exclude_outliers {
            mean_excluding_outliers(&values)
        } else {
            mean(&values)
        })
    }

    pub async fn get_p95_response_time(&self, endpoint: Option<&str>) -> Result<f64, MonitoringError> {
        let values = self.response_times(endpoint, None).await?;
        Ok(p95(&values))
    }

    pub async fn get_memory_trend(&self) -> Result<MemoryTrend, MonitoringError> {
        let query = Query::new()
            .filter(Filter::eq("type", MetricType::MemoryUsage.as_str()))
            .filter(Filter::eq("name", HEAP_USED))
            .order_by("timestamp", Direction::Desc)
            .limit(self.config.memory_trend_samples);
        let samples: Vec<MetricSample> = self.store.find_records(tables::METRIC_SAMPLES, &query).await?;
        let newest_first: Vec<f64> = samples.iter().map(|sample| sample.value).collect();

        Ok(memory_trend(&newest_first, self.config.memory_trend_threshold_percent))
    }

    /// Current aggregates for alert evaluation. Average and P95 here cover
    /// only the trailing `stats_window`, so stale traffic cannot keep a rule firing.
    #[instrument(skip(self))]
    pub async fn snapshot(&self) -> Result<MetricsSnapshot, MonitoringError> {
        let now = self.clock.now();
        let values = self
            .response_times(None, Some((now - self.config.stats_window, now)))
            .await?;

        Ok(MetricsSnapshot {
            requests_per_second: self.get_qps(Some(now)).await?,
            average_response_time_ms: mean(&values),
            p95_response_time_ms: p95(&values),
            memory_trend: self.get_memory_trend().await?,
            timestamp: now,
        })
    }

    async fn response_times(
        &self,
        endpoint: Option<&str>,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<f64>, MonitoringError> {
        let mut query = Query::new().filter(Filter::eq("type", MetricType::ResponseTime.as_str()));
        if let Some((from, to)) = window {
            query = query
                .filter(Filter::gte("timestamp", from))
                .filter(Filter::lte("timestamp", to));
        }
        if let Some(endpoint) = endpoint {
            query = query.filter(Filter::eq("name", endpoint));
        }

        let samples: Vec<MetricSample> = self.store.find_records(tables::METRIC_SAMPLES, &query).await?;
        Ok(samples.into_iter().map(|sample| sample.value).collect())
    }
}

// -------------------------------------------------------------------------------------
// Statistics
// -------------------------------------------------------------------------------------

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Value at sorted index `ceil(n * 0.95) - 1`; 0 for no samples.
pub fn p95(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let index = ((sorted.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
    sorted[index.min(sorted.len() - 1)]
}

/// Mean after dropping values outside `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]`.
/// Quartiles are taken at indices `floor(n*0.25)` and `floor(n*0.75)`; sets of
/// four or fewer values are averaged as-is.
pub fn mean_excluding_outliers(values: &[f64]) -> f64 {
    if values.len() <= 4 {
        return mean(values);
    }

    let sorted = sorted(values);
    let n = sorted.len() as f64;
    let q1 = sorted[(n * 0.25).floor() as usize];
    let q3 = sorted[(n * 0.75).floor() as usize];
    let iqr = q3 - q1;
    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;

    let kept: Vec<f64> = sorted
        .into_iter()
        .filter(|value| *value >= lower && *value <= upper)
        .collect();
    mean(&kept)
}

/// Trend over samples ordered newest first.
pub fn memory_trend(newest_first: &[f64], threshold_percent: f64) -> MemoryTrend {
    let samples = newest_first.len();
    if samples < 2 {
        return MemoryTrend::stable(samples);
    }

    let newest = newest_first[0];
    let oldest = newest_first[samples - 1];
    if oldest == 0.0 {
        return MemoryTrend::stable(samples);
    }

    let percentage_change = (newest - oldest) / oldest * 100.0;
    let trend = if percentage_change > threshold_percent {
        TrendDirection::Increasing
    } else if percentage_change < -threshold_percent {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    MemoryTrend {
        trend,
        percentage_change,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p95_uses_ceiling_index() {
        let values = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0];
        // ceil(10 * 0.95) - 1 = 9
        assert_eq!(p95(&values), 100.0);

        let twenty: Vec<f64> = (1..=20).map(f64::from).collect();
        // ceil(19) - 1 = 18 -> the 19th value
        assert_eq!(p95(&twenty), 19.0);

        assert_eq!(p95(&[42.0]), 42.0);
        assert_eq!(p95(&[]), 0.0);
    }

    #[test]
    fn p95_sorts_before_indexing() {
        assert_eq!(p95(&[5.0, 1.0, 3.0]), 5.0);
    }

    #[test]
    fn outlier_exclusion_drops_values_beyond_upper_fence() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 1000.0];
        // Q1 = 2, Q3 = 5, IQR = 3, fences [-2.5, 9.5]
        assert_eq!(mean_excluding_outliers(&values), 3.0);
        assert!(mean(&values) > 100.0);
    }

    #[test]
    fn outlier_exclusion_needs_more_than_four_samples() {
        let values = [1.0, 2.0, 3.0, 1000.0];
        assert_eq!(mean_excluding_outliers(&values), mean(&values));
    }

    #[test]
    fn mean_of_nothing_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean_excluding_outliers(&[]), 0.0);
    }

    #[test]
    fn memory_trend_classification() {
        let rising = memory_trend(&[120.0, 100.0], 5.0);
        assert_eq!(rising.trend, TrendDirection::Increasing);
        assert_eq!(rising.percentage_change, 20.0);

        let falling = memory_trend(&[90.0, 95.0, 100.0], 5.0);
        assert_eq!(falling.trend, TrendDirection::Decreasing);

        let flat = memory_trend(&[104.0, 100.0], 5.0);
        assert_eq!(flat.trend, TrendDirection::Stable);

        let single = memory_trend(&[100.0], 5.0);
        assert_eq!(single.trend, TrendDirection::Stable);
        assert_eq!(single.percentage_change, 0.0);
    }
}
