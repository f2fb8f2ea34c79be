pub mod expiration;
pub mod schedule;
pub mod scheduler;
pub mod usage_stats;

pub use expiration::ExpirationReminderService;
pub use schedule::Schedule;
pub use scheduler::JobScheduler;
pub use usage_stats::{HttpUsageStatsClient, UsageStatsClient};
