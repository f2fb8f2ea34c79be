use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::error::JobError;
use crate::jobs::Job;
use crate::models::{AlertCheckReport, JobOutcome};
use monitoring_cell::{AlertRuleEngine, HealthChecker, MetricsAggregator};

const LOAD_RULES_QUERY: &str = "alert_rules.load";

/// Periodic driver of the alert engine: samples memory, probes health, then
/// evaluates every enabled rule against the current aggregates.
pub struct AlertCheckJob {
    metrics: Arc<MetricsAggregator>,
    health: Option<Arc<HealthChecker>>,
    engine: Arc<AlertRuleEngine>,
    schedule: String,
}

impl AlertCheckJob {
    pub fn new(
        metrics: Arc<MetricsAggregator>,
        health: Option<Arc<HealthChecker>>,
        engine: Arc<AlertRuleEngine>,
        schedule: &str,
    ) -> Self {
        Self {
            metrics,
            health,
            engine,
            schedule: schedule.to_string(),
        }
    }

    #[instrument(skip(self))]
    pub async fn check(&self, now: DateTime<Utc>) -> Result<AlertCheckReport, JobError> {
        let memory_recorded = match self.metrics.record_memory_usage().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Memory sample not recorded: {}", e);
                false
            }
        };

        let health = match &self.health {
            Some(checker) => Some(checker.check_all().await),
            None => None,
        };

        let snapshot = self.metrics.snapshot().await?;
        let started = Instant::now();
        let rules = self.engine.load_rules().await?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        if let Err(e) = self.metrics.record_database_query(LOAD_RULES_QUERY, elapsed_ms).await {
            warn!("Rule load timing not recorded: {}", e);
        }
        let evaluation = self.engine.evaluate(&rules, &snapshot, health.as_ref()).await?;

        info!(
            rules = evaluation.rules_evaluated,
            triggered = evaluation.triggered,
            resolved = evaluation.resolved,
            "Alert check finished"
        );

        Ok(AlertCheckReport {
            memory_recorded,
            health: health.map(|snapshot| snapshot.overall),
            requests_per_second: snapshot.requests_per_second,
            p95_response_time_ms: snapshot.p95_response_time_ms,
            evaluation,
            checked_at: now,
        })
    }
}

#[async_trait]
impl Job for AlertCheckJob {
    fn name(&self) -> &str {
        "alert-check"
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    fn description(&self) -> &str {
        "Evaluates alert rules against current metrics and health"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobOutcome, JobError> {
        let report = self.check(now).await?;
        Ok(JobOutcome::completed(serde_json::to_value(report)?))
    }
}
