// =====================================================================================
// ALERT RULE ENGINE
// =====================================================================================

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    metric_keys, AlertEvaluation, AlertRecord, AlertRule, AlertSeverity, AlertStatus, AlertTransition,
    MetricsSnapshot, MonitoringError, NotificationRequest, SystemHealthSnapshot,
};
use crate::services::notifications::NotificationSink;
use shared_database::{tables, Direction, Filter, Query, RecordStore, RecordStoreExt};
use shared_models::NotificationType;
use shared_utils::Clock;

pub struct AlertRuleEngine {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    // Serialises the FIRING lookup with the write that follows it.
    transitions: Mutex<()>,
}

impl AlertRuleEngine {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<dyn NotificationSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
            transitions: Mutex::new(()),
        }
    }

    pub async fn load_rules(&self) -> Result<Vec<AlertRule>, MonitoringError> {
        let query = Query::new().filter(Filter::eq("enabled", true));
        Ok(self.store.find_records(tables::ALERT_RULES, &query).await?)
    }

    pub fn evaluate_rule(&self, rule: &AlertRule, value: f64) -> bool {
        rule.condition.holds(value, rule.threshold)
    }

    async fn firing_record(&self, rule_id: Uuid) -> Result<Option<AlertRecord>, MonitoringError> {
        Ok(self
            .store
            .find_first(
                tables::ALERT_RECORDS,
                vec![
                    Filter::eq("rule_id", rule_id),
                    Filter::eq("status", AlertStatus::Firing.as_str()),
                ],
            )
            .await?)
    }

    /// Opens a FIRING record for `rule` unless one is already open.
    /// Returns `None` when the rule was already firing.
    #[instrument(skip(self, rule), fields(rule = %rule.name))]
    pub async fn trigger_alert(&self, rule: &AlertRule, value: f64) -> Result<Option<AlertRecord>, MonitoringError> {
        let record = {
            let _guard = self.transitions.lock().await;
            if self.firing_record(rule.id).await?.is_some() {
                return Ok(None);
            }

            let record = AlertRecord {
                id: Uuid::new_v4(),
                rule_id: rule.id,
                status: AlertStatus::Firing,
                value,
                message: alert_message(rule, value),
                triggered_at: self.clock.now(),
                resolved_at: None,
            };
            self.store.insert_record(tables::ALERT_RECORDS, &record).await?
        };

        match rule.severity {
            AlertSeverity::Critical | AlertSeverity::Emergency => {
                error!(
                    alert_id = %record.id,
                    severity = ?rule.severity,
                    metric = %rule.metric,
                    value = %value,
                    threshold = %rule.threshold,
                    "CRITICAL ALERT TRIGGERED: {}", rule.name
                );
            }
            AlertSeverity::Warning => {
                warn!(
                    alert_id = %record.id,
                    metric = %rule.metric,
                    value = %value,
                    "WARNING ALERT: {}", rule.name
                );
            }
            AlertSeverity::Info => {
                info!(alert_id = %record.id, "INFO ALERT: {}", rule.name);
            }
        }

        self.notify(NotificationRequest {
            notification_type: NotificationType::Alert,
            user_id: None,
            title: format!("[{:?}] {}", rule.severity, rule.name),
            message: record.message.clone(),
            channels: rule.channels.clone(),
            data: json!({
                "alert_id": record.id,
                "rule_id": rule.id,
                "metric": rule.metric,
                "value": value,
                "threshold": rule.threshold,
                "severity": rule.severity,
            }),
        })
        .await;

        Ok(Some(record))
    }

    /// Closes the open FIRING record for `rule`, if any.
    #[instrument(skip(self, rule), fields(rule = %rule.name))]
    pub async fn resolve_alert(&self, rule: &AlertRule, value: f64) -> Result<Option<AlertRecord>, MonitoringError> {
        let record = {
            let _guard = self.transitions.lock().await;
            let Some(mut record) = self.firing_record(rule.id).await? else {
                return Ok(None);
            };

            let resolved_at = self.clock.now();
            self.store
                .update(
                    tables::ALERT_RECORDS,
                    &[Filter::eq("id", record.id)],
                    json!({
                        "status": AlertStatus::Resolved.as_str(),
                        "resolved_at": resolved_at,
                    }),
                )
                .await?;
            record.status = AlertStatus::Resolved;
            record.resolved_at = Some(resolved_at);
            record
        };

        info!(alert_id = %record.id, value = %value, "Alert resolved: {}", rule.name);

        self.notify(NotificationRequest {
            notification_type: NotificationType::AlertResolved,
            user_id: None,
            title: format!("[RESOLVED] {}", rule.name),
            message: format!(
                "Alert '{}' resolved: {} is back to {} (threshold {})",
                rule.name, rule.metric, value, rule.threshold
            ),
            channels: rule.channels.clone(),
            data: json!({
                "alert_id": record.id,
                "rule_id": rule.id,
                "value": value,
            }),
        })
        .await;

        Ok(Some(record))
    }

    /// Triggers or resolves `rule` depending on whether `value` breaches it.
    pub async fn apply(&self, rule: &AlertRule, value: f64) -> Result<AlertTransition, MonitoringError> {
        if self.evaluate_rule(rule, value) {
            Ok(match self.trigger_alert(rule, value).await? {
                Some(record) => AlertTransition::Triggered(record),
                None => AlertTransition::AlreadyFiring,
            })
        } else {
            Ok(match self.resolve_alert(rule, value).await? {
                Some(record) => AlertTransition::Resolved(record),
                None => AlertTransition::Clear,
            })
        }
    }

    /// Drives every rule against the current metric values.
    #[instrument(skip_all, fields(rules = rules.len()))]
    pub async fn evaluate(
        &self,
        rules: &[AlertRule],
        metrics: &MetricsSnapshot,
        health: Option<&SystemHealthSnapshot>,
    ) -> Result<AlertEvaluation, MonitoringError> {
        let mut evaluation = AlertEvaluation::default();

        for rule in rules {
            let Some(value) = current_value(&rule.metric, metrics, health) else {
                warn!(rule = %rule.name, metric = %rule.metric, "No current value for metric, skipping rule");
                evaluation.skipped += 1;
                continue;
            };

            evaluation.rules_evaluated += 1;
            match self.apply(rule, value).await? {
                AlertTransition::Triggered(_) => evaluation.triggered += 1,
                AlertTransition::AlreadyFiring => evaluation.already_firing += 1,
                AlertTransition::Resolved(_) => evaluation.resolved += 1,
                AlertTransition::Clear => {}
            }
        }

        Ok(evaluation)
    }

    pub async fn active_alerts(&self) -> Result<Vec<AlertRecord>, MonitoringError> {
        let query = Query::new()
            .filter(Filter::eq("status", AlertStatus::Firing.as_str()))
            .order_by("triggered_at", Direction::Desc);
        Ok(self.store.find_records(tables::ALERT_RECORDS, &query).await?)
    }

    /// FIRING alerts counted by the severity of their rule.
    pub async fn alert_summary(&self) -> Result<HashMap<String, u32>, MonitoringError> {
        let active = self.active_alerts().await?;
        let rules: Vec<AlertRule> = self.store.find_records(tables::ALERT_RULES, &Query::new()).await?;
        let severities: HashMap<Uuid, AlertSeverity> =
            rules.into_iter().map(|rule| (rule.id, rule.severity)).collect();

        let mut summary = HashMap::new();
        for alert in active {
            let key = severities
                .get(&alert.rule_id)
                .map(|severity| format!("{:?}", severity))
                .unwrap_or_else(|| "Unknown".to_string());
            *summary.entry(key).or_insert(0) += 1;
        }

        Ok(summary)
    }

    async fn notify(&self, request: NotificationRequest) {
        if let Err(e) = self.notifier.send(request).await {
            warn!("Alert notification failed: {}", e);
        }
    }
}

fn alert_message(rule: &AlertRule, value: f64) -> String {
    format!(
        "Alert '{}' triggered: {} {} {} (current value: {})",
        rule.name, rule.metric, rule.condition, rule.threshold, value
    )
}

fn current_value(metric: &str, metrics: &MetricsSnapshot, health: Option<&SystemHealthSnapshot>) -> Option<f64> {
    if metric == metric_keys::UNHEALTHY_SERVICES {
        return health.map(|health| health.unhealthy_count() as f64);
    }
    metrics.value_for(metric)
}
