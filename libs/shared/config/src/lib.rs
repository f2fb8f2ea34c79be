use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_RELAY_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub redis_url: Option<String>,
    pub relay_base_url: String,
    pub relay_api_key: String,
    pub relay_timeout_seconds: u64,
    pub notification_retention_days: i64,
    pub job_log_retention_days: i64,
    pub usage_archive_after_days: i64,
    pub usage_archive_batch_size: usize,
    pub sync_batch_size: usize,
    pub sync_retry_delay_ms: u64,
    pub schedules: JobSchedules,
    pub status_port: u16,
}

/// Cron expressions for the four maintenance jobs.
#[derive(Debug, Clone)]
pub struct JobSchedules {
    pub expiration_check: String,
    pub data_sync: String,
    pub cleanup: String,
    pub alert_check: String,
}

impl Default for JobSchedules {
    fn default() -> Self {
        Self {
            expiration_check: "0 9 * * *".to_string(),
            data_sync: "0 * * * *".to_string(),
            cleanup: "0 3 * * *".to_string(),
            alert_check: "*/5 * * * *".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_service_key: String::new(),
            redis_url: None,
            relay_base_url: DEFAULT_RELAY_BASE_URL.to_string(),
            relay_api_key: String::new(),
            relay_timeout_seconds: 10,
            notification_retention_days: 30,
            job_log_retention_days: 90,
            usage_archive_after_days: 180,
            usage_archive_batch_size: 1000,
            sync_batch_size: 5,
            sync_retry_delay_ms: 1000,
            schedules: JobSchedules::default(),
            status_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let schedule_defaults = JobSchedules::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, falling back to the in-memory store");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            relay_base_url: env::var("RELAY_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("RELAY_BASE_URL not set, using default");
                    DEFAULT_RELAY_BASE_URL.to_string()
                }),
            relay_api_key: env::var("RELAY_API_KEY").unwrap_or_default(),
            relay_timeout_seconds: parse_or("RELAY_TIMEOUT_SECONDS", defaults.relay_timeout_seconds),
            notification_retention_days: parse_or(
                "NOTIFICATION_RETENTION_DAYS",
                defaults.notification_retention_days,
            ),
            job_log_retention_days: parse_or("JOB_LOG_RETENTION_DAYS", defaults.job_log_retention_days),
            usage_archive_after_days: parse_or(
                "USAGE_ARCHIVE_AFTER_DAYS",
                defaults.usage_archive_after_days,
            ),
            usage_archive_batch_size: parse_or(
                "USAGE_ARCHIVE_BATCH_SIZE",
                defaults.usage_archive_batch_size,
            ),
            sync_batch_size: parse_or("SYNC_BATCH_SIZE", defaults.sync_batch_size),
            sync_retry_delay_ms: parse_or("SYNC_RETRY_DELAY_MS", defaults.sync_retry_delay_ms),
            schedules: JobSchedules {
                expiration_check: env::var("SCHEDULE_EXPIRATION_CHECK")
                    .unwrap_or(schedule_defaults.expiration_check),
                data_sync: env::var("SCHEDULE_DATA_SYNC").unwrap_or(schedule_defaults.data_sync),
                cleanup: env::var("SCHEDULE_CLEANUP").unwrap_or(schedule_defaults.cleanup),
                alert_check: env::var("SCHEDULE_ALERT_CHECK")
                    .unwrap_or(schedule_defaults.alert_check),
            },
            status_port: parse_or("STATUS_PORT", defaults.status_port),
        };

        if !config.is_store_configured() {
            warn!("Persistent store not configured - records will not survive a restart");
        }

        config
    }

    pub fn is_store_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_key.is_empty()
    }

    pub fn is_cache_configured(&self) -> bool {
        self.redis_url.is_some()
    }
}

fn parse_or<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_retention() {
        let config = AppConfig::default();
        assert_eq!(config.notification_retention_days, 30);
        assert_eq!(config.job_log_retention_days, 90);
        assert_eq!(config.usage_archive_after_days, 180);
        assert_eq!(config.usage_archive_batch_size, 1000);
        assert_eq!(config.sync_batch_size, 5);
        assert_eq!(config.sync_retry_delay_ms, 1000);
        assert!(!config.is_store_configured());
        assert!(!config.is_cache_configured());
    }

    #[test]
    fn invalid_numeric_values_fall_back_to_default() {
        env::set_var("KEYPORTAL_TEST_BATCH", "not-a-number");
        assert_eq!(parse_or("KEYPORTAL_TEST_BATCH", 5usize), 5);
        env::set_var("KEYPORTAL_TEST_BATCH", "12");
        assert_eq!(parse_or("KEYPORTAL_TEST_BATCH", 5usize), 12);
        env::remove_var("KEYPORTAL_TEST_BATCH");
    }
}
