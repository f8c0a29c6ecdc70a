//! Named recurring background jobs and their supervision.
//!
//! The registry owns every `ScanJob` for the lifetime of the process. Job
//! identities are unique, intervals are immutable after registration, and
//! firings of the same job are serialized: a firing that arrives while the
//! previous run is still in flight waits on the per-job gate and then runs
//! (defer, not drop, not overlap). A failed or timed-out run marks the job
//! `failed` and is reported, but the cadence keeps going.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex as StdMutex, RwLock},
    time::Duration,
};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, warn};

pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Adapts an async closure into a registrable entry point.
pub fn job_fn<F, Fut>(f: F) -> JobFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job already registered: {0}")]
    Duplicate(String),

    #[error("unknown job: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
struct JobStatus {
    state: JobState,
    last_run: Option<DateTime<Utc>>,
}

struct ScanJob {
    name: String,
    interval: Duration,
    timeout: Duration,
    entry: JobFn,
    status: StdMutex<JobStatus>,
    // Serializes firings of this job: scheduled ticks and run_once callers
    // alike queue on this gate.
    gate: Mutex<()>,
}

impl ScanJob {
    fn set_state(&self, state: JobState, last_run: Option<DateTime<Utc>>) {
        let mut status = self.status.lock().expect("job status lock poisoned");
        status.state = state;
        if last_run.is_some() {
            status.last_run = last_run;
        }
    }

    async fn invoke(self: &Arc<Self>) -> anyhow::Result<()> {
        let _gate = self.gate.lock().await;
        self.set_state(JobState::Running, None);
        debug!(target: "jobs", job = %self.name, "job run started");

        let outcome =
            tokio::time::timeout(self.timeout, (self.entry)()).await;
        let finished = Utc::now();
        match outcome {
            Ok(Ok(())) => {
                self.set_state(JobState::Idle, Some(finished));
                debug!(target: "jobs", job = %self.name, "job run finished");
                Ok(())
            }
            Ok(Err(err)) => {
                self.set_state(JobState::Failed, Some(finished));
                Err(err)
            }
            Err(_) => {
                self.set_state(JobState::Failed, Some(finished));
                Err(anyhow!(
                    "job '{}' timed out after {:?}",
                    self.name,
                    self.timeout
                ))
            }
        }
    }
}

/// Snapshot of one registered job, as reported by `/api/jobs` and `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub name: String,
    pub interval_ms: u64,
    pub state: JobState,
    pub last_run: Option<DateTime<Utc>>,
}

/// Cancellation handle for a scheduled job. Cancelling (or dropping) the
/// handle stops future firings; it does not abort a run already in flight
/// past its await points within the same poll.
pub struct ScheduledJob {
    name: String,
    handle: JoinHandle<()>,
}

impl ScheduledJob {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Drop for ScheduledJob {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Owned registry of recurring background work. Created once at startup and
/// handed to the orchestrator by reference; jobs live as long as the
/// process.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<ScanJob>>>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.jobs.read().ok().map(|guard| guard.len());
        f.debug_struct("JobRegistry")
            .field("jobs", &count)
            .finish()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named job. Reusing a name is a programming error and fails
    /// fast at startup.
    pub fn register(
        &self,
        name: impl Into<String>,
        interval: Duration,
        timeout: Duration,
        entry: JobFn,
    ) -> Result<(), JobError> {
        let name = name.into();
        let mut guard = self.jobs.write().expect("job table lock poisoned");
        if guard.contains_key(&name) {
            return Err(JobError::Duplicate(name));
        }
        guard.insert(
            name.clone(),
            Arc::new(ScanJob {
                name,
                interval,
                timeout,
                entry,
                status: StdMutex::new(JobStatus {
                    state: JobState::Idle,
                    last_run: None,
                }),
                gate: Mutex::new(()),
            }),
        );
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Arc<ScanJob>, JobError> {
        self.jobs
            .read()
            .expect("job table lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| JobError::Unknown(name.to_string()))
    }

    /// Invokes the job's entry point immediately, outside the timer cadence.
    /// Used for the startup "initial scan" and the manual scan endpoint.
    pub async fn run_once(&self, name: &str) -> anyhow::Result<()> {
        let job = self.get(name)?;
        job.invoke().await
    }

    /// Installs a periodic trigger firing every `interval`, with the first
    /// firing one full interval after installation. Runs until the process
    /// terminates or the returned handle is cancelled.
    pub fn schedule(&self, name: &str) -> Result<ScheduledJob, JobError> {
        let job = self.get(name)?;
        let handle = tokio::spawn(run_schedule(Arc::clone(&job)));
        Ok(ScheduledJob {
            name: job.name.clone(),
            handle,
        })
    }

    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        let guard = self.jobs.read().expect("job table lock poisoned");
        let mut snapshots: Vec<JobSnapshot> = guard
            .values()
            .map(|job| {
                let status =
                    job.status.lock().expect("job status lock poisoned");
                JobSnapshot {
                    name: job.name.clone(),
                    interval_ms: job.interval.as_millis() as u64,
                    state: status.state,
                    last_run: status.last_run,
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

async fn run_schedule(job: Arc<ScanJob>) {
    let mut ticker = interval_at(Instant::now() + job.interval, job.interval);
    // A tick missed because the previous run overran fires as soon as the
    // gate frees up, then the cadence resumes from there.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = job.invoke().await {
            warn!(
                target: "jobs",
                job = %job.name,
                error = %err,
                "scheduled run failed; keeping future cadence"
            );
        }
    }
}
