use clap::{Parser, ValueEnum};

/// Scheduled maintenance and monitoring for the key portal.
#[derive(Debug, Parser)]
#[command(name = "keyportal-ops", version)]
pub struct Cli {
    /// Which jobs to register.
    #[arg(value_enum, default_value_t = JobSet::All)]
    pub jobs: JobSet,

    /// Run the selected jobs once and exit; non-zero exit status if any failed.
    #[arg(long)]
    pub once: bool,

    /// Port for the status HTTP server (overrides STATUS_PORT).
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JobSet {
    /// Expiration reminders
    Check,
    /// Relay usage sync
    Sync,
    /// Retention sweeps
    Cleanup,
    /// Alert evaluation
    Monitor,
    All,
}

impl JobSet {
    pub fn includes(&self, other: JobSet) -> bool {
        *self == JobSet::All || *self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_all_jobs_on_a_schedule() {
        let cli = Cli::try_parse_from(["keyportal-ops"]).unwrap();
        assert_eq!(cli.jobs, JobSet::All);
        assert!(!cli.once);
        assert_eq!(cli.port, None);
    }

    #[test]
    fn parses_subcommand_and_flags() {
        let cli = Cli::try_parse_from(["keyportal-ops", "cleanup", "--once", "--port", "4100"]).unwrap();
        assert_eq!(cli.jobs, JobSet::Cleanup);
        assert!(cli.once);
        assert_eq!(cli.port, Some(4100));
    }

    #[test]
    fn rejects_unknown_job_sets() {
        assert!(Cli::try_parse_from(["keyportal-ops", "reindex"]).is_err());
    }

    #[test]
    fn all_includes_every_set() {
        for set in [JobSet::Check, JobSet::Sync, JobSet::Cleanup, JobSet::Monitor] {
            assert!(JobSet::All.includes(set));
            assert!(set.includes(set));
        }
        assert!(!JobSet::Sync.includes(JobSet::Cleanup));
    }
}
