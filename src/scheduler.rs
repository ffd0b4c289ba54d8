//! Dependency-ordered execution with at-most-once semantics.
//!
//! The scheduler owns the job registry and the run-state table. The first
//! request for a job spawns its execution and registers a shared handle under
//! the job id while the table lock is held; every later request, concurrent or
//! not, awaits that same handle. A job therefore runs at most once per
//! scheduler, and all of its dependents observe the same result.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared, join_all},
};
use tracing::{debug, error, warn};

use crate::{
    error::{GoerError, Result},
    execution::{ShellExecutor, StepExecutor},
    job::{Definitions, Job, resolve},
    output::{Reporter, TerminalReporter},
};

type JobHandle = Shared<BoxFuture<'static, bool>>;

pub struct Scheduler {
    jobs: HashMap<String, Job>,
    running: Mutex<HashMap<String, JobHandle>>,
    executor: Arc<dyn StepExecutor>,
    reporter: Arc<dyn Reporter>,
}

impl Scheduler {
    /// Builds the registry from definitions. Nothing runs if this fails.
    pub fn resolve(definitions: Definitions) -> Result<Self> {
        Ok(Self::from_jobs(resolve(definitions)?))
    }

    fn from_jobs(jobs: HashMap<String, Job>) -> Self {
        Self {
            jobs,
            running: Mutex::new(HashMap::new()),
            executor: Arc::new(ShellExecutor::default()),
            reporter: Arc::new(TerminalReporter::default()),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn job(&self, job_id: &str) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    pub fn jobs(&self) -> &HashMap<String, Job> {
        &self.jobs
    }

    /// Sorted ids of every registered job.
    pub fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    /// Runs `job_id` after everything it depends on. Returns `false` for an
    /// unknown id, a failed dependency, a failed step or any fault on the way.
    pub async fn run(self: &Arc<Self>, job_id: &str) -> bool {
        if !self.jobs.contains_key(job_id) {
            let err = GoerError::UnknownJob(job_id.to_string());
            warn!(job = %job_id, "requested job is not registered");
            self.reporter.job_failed(job_id, &err.to_string());
            return false;
        }

        self.handle(job_id).await
    }

    /// Returns the shared handle for `job_id`, spawning the job if this is the
    /// first request. Lookup and insertion happen under one lock.
    fn handle(self: &Arc<Self>, job_id: &str) -> JobHandle {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(handle) = running.get(job_id) {
            debug!(job = %job_id, "joining in-flight or finished job");
            return handle.clone();
        }

        let task = tokio::spawn(Arc::clone(self).execute(job_id.to_string()));

        let id = job_id.to_string();
        let reporter = Arc::clone(&self.reporter);
        let handle = async move {
            match task.await {
                Ok(success) => success,
                Err(e) => {
                    error!(job = %id, error = %e, "job task aborted");
                    reporter.job_failed(&id, &format!("job task aborted: {}", e));
                    false
                }
            }
        }
        .boxed()
        .shared();

        running.insert(job_id.to_string(), handle.clone());
        handle
    }

    async fn execute(self: Arc<Self>, job_id: String) -> bool {
        let Some(job) = self.jobs.get(&job_id) else {
            self.reporter
                .job_failed(&job_id, &GoerError::UnknownJob(job_id.clone()).to_string());
            return false;
        };

        let outcome = self.try_execute(job).await;
        job.settle(outcome, self.reporter.as_ref())
    }

    async fn try_execute(self: &Arc<Self>, job: &Job) -> Result<bool> {
        if !job.depends_on.is_empty() && !self.run_dependencies(job).await {
            self.reporter.job_failed(&job.id, "dependency failed");
            return Ok(false);
        }

        if job.can_skip()? {
            self.reporter.job_skipped(&job.id);
            return Ok(true);
        }

        job.run_steps(self.executor.as_ref(), self.reporter.as_ref())
            .await
    }

    /// Waits for every dependency, even after one has failed, so shared
    /// handles settle for their other waiters.
    async fn run_dependencies(self: &Arc<Self>, job: &Job) -> bool {
        debug!(job = %job.id, dependencies = ?job.depends_on, "running dependencies");

        let handles: Vec<JobHandle> = job.depends_on.iter().map(|dep| self.handle(dep)).collect();

        join_all(handles).await.into_iter().all(|success| success)
    }
}
