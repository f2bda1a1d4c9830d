//! Background start/stop jobs.
//!
//! Jobs are persisted to the shared SQLite table at every transition and
//! executed on a bounded pool of tokio tasks.

mod retention;

pub use retention::*;

use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use uuid::Uuid;

use crate::compose::{ComposeOutcome, ComposeRunner};
use crate::config::WORKER_POOL_SIZE;
use crate::db::{DbError, Job, JobAction, Store};

/// Submits compose jobs and reports their progress.
pub struct JobExecutor {
    store: Arc<Store>,
    runner: Arc<ComposeRunner>,
    /// Jobs this process has accepted and not yet finished.
    active: Arc<RwLock<HashMap<String, Job>>>,
    permits: Arc<Semaphore>,
}

impl JobExecutor {
    pub fn new(store: Arc<Store>, runner: Arc<ComposeRunner>) -> Self {
        Self::with_pool_size(store, runner, WORKER_POOL_SIZE)
    }

    pub fn with_pool_size(store: Arc<Store>, runner: Arc<ComposeRunner>, workers: usize) -> Self {
        Self {
            store,
            runner,
            active: Arc::new(RwLock::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn runner(&self) -> &ComposeRunner {
        &self.runner
    }

    /// Record a pending job and queue it. Returns the job id immediately.
    ///
    /// A job whose compose path is unknown still runs and fails with
    /// "compose file not found".
    pub async fn submit_job(
        &self,
        action: JobAction,
        service_name: Option<String>,
        compose_path: Option<PathBuf>,
    ) -> Result<String, DbError> {
        let id = Uuid::new_v4().simple().to_string();
        let job = Job::new(id.clone(), action, service_name);

        self.store.save_job(&job)?;
        self.active.write().await.insert(id.clone(), job.clone());

        tracing::info!(
            "Queued {} job {} for {}",
            action.as_str(),
            id,
            job.name.as_deref().unwrap_or("<unnamed>")
        );

        let worker = Worker {
            store: self.store.clone(),
            runner: self.runner.clone(),
            active: self.active.clone(),
        };
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            worker.run(job, compose_path).await;
        });

        Ok(id)
    }

    /// Read a job from the shared store, so jobs submitted by any replica
    /// are visible.
    pub fn get_job(&self, id: &str) -> Result<Option<Job>, DbError> {
        self.store.get_job(id)
    }

    /// Snapshot of this process's unfinished jobs, oldest first.
    pub async fn in_flight(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .active
            .read()
            .await
            .values()
            .filter(|j| !j.status.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }
}

struct Worker {
    store: Arc<Store>,
    runner: Arc<ComposeRunner>,
    active: Arc<RwLock<HashMap<String, Job>>>,
}

impl Worker {
    async fn run(&self, mut job: Job, compose_path: Option<PathBuf>) {
        job.start(Utc::now());
        self.persist(&job).await;

        let outcome = match compose_path {
            Some(path) => {
                let runner = self.runner.clone();
                let action = job.action.compose_action();
                // A panicking run must still leave a terminal row behind.
                match tokio::spawn(async move { runner.run_compose(&path, action).await }).await {
                    Ok(outcome) => outcome,
                    Err(e) => ComposeOutcome {
                        success: false,
                        output: format!("job worker crashed: {}", e),
                    },
                }
            }
            None => ComposeOutcome {
                success: false,
                output: "compose file not found".to_string(),
            },
        };

        job.finish(outcome.success, outcome.output, Utc::now());
        self.active.write().await.remove(&job.id);
        if let Err(e) = self.store.save_job(&job) {
            tracing::error!("Failed to record result of job {}: {}", job.id, e);
        }

        tracing::info!(
            "Job {} ({} {}) finished: {}",
            job.id,
            job.action.as_str(),
            job.name.as_deref().unwrap_or("<unnamed>"),
            job.status.as_str()
        );
    }

    async fn persist(&self, job: &Job) {
        if let Err(e) = self.store.save_job(job) {
            tracing::error!("Failed to record job {} as {}: {}", job.id, job.status.as_str(), e);
        }
        if let Some(entry) = self.active.write().await.get_mut(&job.id) {
            *entry = job.clone();
        }
    }
}
