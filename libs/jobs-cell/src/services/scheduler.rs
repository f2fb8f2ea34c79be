// ==============================================================================
// JOB SCHEDULER
// ==============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::jobs::Job;
use crate::models::{JobExecutionResult, JobInfo};
use crate::services::schedule::Schedule;
use shared_database::{tables, RecordStore, RecordStoreExt};
use shared_models::{JobLog, JobRunStatus};
use shared_utils::Clock;

struct JobEntry {
    job: Arc<dyn Job>,
    schedule: Schedule,
    running: AtomicBool,
}

/// Clears the running flag when a run ends, including by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct JobScheduler {
    entries: RwLock<Vec<Arc<JobEntry>>>,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    last_results: RwLock<HashMap<String, JobExecutionResult>>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            entries: RwLock::new(Vec::new()),
            store,
            clock,
            last_results: RwLock::new(HashMap::new()),
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub async fn register(&self, job: Arc<dyn Job>) -> Result<(), SchedulerError> {
        let schedule = Schedule::parse(job.schedule())?;
        let mut entries = self.entries.write().await;
        if entries.iter().any(|entry| entry.job.name() == job.name()) {
            return Err(SchedulerError::DuplicateJob(job.name().to_string()));
        }

        info!(job = job.name(), schedule = %schedule, "Registered job");
        entries.push(Arc::new(JobEntry {
            job,
            schedule,
            running: AtomicBool::new(false),
        }));
        Ok(())
    }

    /// Spawns one timer loop per registered job.
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            return Err(SchedulerError::AlreadyStarted);
        }
        self.shutdown.send_replace(false);

        for entry in self.entries.read().await.iter() {
            let scheduler = Arc::clone(self);
            let entry = Arc::clone(entry);
            let shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                scheduler.run_loop(entry, shutdown).await
            }));
        }

        info!(jobs = handles.len(), "Job scheduler started");
        Ok(())
    }

    /// Signals every loop to stop and waits for in-flight runs to finish.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Job loop ended abnormally: {}", e);
            }
        }
        info!("Job scheduler stopped");
    }

    async fn run_loop(self: Arc<Self>, entry: Arc<JobEntry>, mut shutdown: watch::Receiver<bool>) {
        let name = entry.job.name().to_string();
        debug!("Job loop started: {}", name);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = self.clock.now();
            let Some(next_run) = entry.schedule.next_after(now) else {
                warn!(job = %name, "Schedule never fires again, stopping loop");
                break;
            };
            let wait = (next_run - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.dispatch(&entry).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Job loop ended: {}", name);
    }

    /// Runs the job unless a run is already in flight.
    async fn dispatch(&self, entry: &JobEntry) -> Option<JobExecutionResult> {
        if entry
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(job = entry.job.name(), "Previous run still in progress, skipping");
            return None;
        }
        let _running = RunningGuard(&entry.running);

        let result = entry.job.execute(self.clock.now()).await;
        self.record(&result).await;
        Some(result)
    }

    async fn record(&self, result: &JobExecutionResult) {
        self.last_results
            .write()
            .await
            .insert(result.job_name.clone(), result.clone());

        let log = JobLog {
            id: Uuid::new_v4(),
            job_name: result.job_name.clone(),
            status: if result.success {
                JobRunStatus::Success
            } else {
                JobRunStatus::Failed
            },
            duration_ms: result.duration_ms,
            error: result.error.clone(),
            details: result.details.clone(),
            executed_at: result.started_at,
        };
        if let Err(e) = self.store.insert_record(tables::JOB_LOGS, &log).await {
            warn!(job = %result.job_name, "Failed to write job log: {}", e);
        }
    }

    async fn entry(&self, name: &str) -> Result<Arc<JobEntry>, SchedulerError> {
        self.entries
            .read()
            .await
            .iter()
            .find(|entry| entry.job.name() == name)
            .cloned()
            .ok_or_else(|| SchedulerError::JobNotFound(name.to_string()))
    }

    pub async fn run_now(&self, name: &str) -> Result<JobExecutionResult, SchedulerError> {
        let entry = self.entry(name).await?;
        info!(job = name, "Manual run requested");
        self.dispatch(&entry)
            .await
            .ok_or_else(|| SchedulerError::AlreadyRunning(name.to_string()))
    }

    /// Runs every registered job once, in registration order.
    pub async fn run_all_now(&self) -> Vec<JobExecutionResult> {
        let entries: Vec<Arc<JobEntry>> = self.entries.read().await.clone();
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(result) = self.dispatch(&entry).await {
                results.push(result);
            }
        }
        results
    }

    pub async fn jobs(&self) -> Vec<JobInfo> {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .iter()
            .map(|entry| JobInfo {
                name: entry.job.name().to_string(),
                schedule: entry.schedule.to_string(),
                description: entry.job.description().to_string(),
                next_run: entry.schedule.next_after(now),
                running: entry.running.load(Ordering::Acquire),
            })
            .collect()
    }

    pub async fn last_results(&self) -> HashMap<String, JobExecutionResult> {
        self.last_results.read().await.clone()
    }
}
