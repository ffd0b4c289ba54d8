use std::{sync::Arc, time::Instant};

use futures::future::join_all;
use tracing::{info, warn};

use crate::{error::GoerError, scheduler::Scheduler};

/// Runs batches of requested jobs on top of a [`Scheduler`].
pub struct Goer {
    scheduler: Arc<Scheduler>,
}

/// Outcome of one batch: which requested jobs failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub failed: Vec<String>,
    pub unknown: Vec<String>,
}

impl BatchReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty() && self.unknown.is_empty()
    }
}

impl Goer {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn list_job_ids(&self) -> Vec<String> {
        self.scheduler.job_ids()
    }

    /// Runs every requested job concurrently and reports overall success.
    pub async fn run(&self, job_ids: &[String]) -> bool {
        self.run_batch(job_ids).await.success()
    }

    pub async fn run_batch(&self, job_ids: &[String]) -> BatchReport {
        let started = Instant::now();
        let reporter = self.scheduler.reporter();
        let mut report = BatchReport::default();

        let mut requested = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            if self.scheduler.job(job_id).is_some() {
                requested.push(job_id.as_str());
            } else {
                let err = GoerError::UnknownJob(job_id.clone());
                warn!(job = %job_id, "{}", err);
                reporter.job_failed(job_id, &err.to_string());
                report.unknown.push(job_id.clone());
            }
        }

        info!(jobs = ?requested, "running batch");
        let results = join_all(requested.iter().map(|id| self.scheduler.run(id))).await;

        report.failed = requested
            .iter()
            .zip(results)
            .filter(|(_, success)| !success)
            .map(|(id, _)| id.to_string())
            .collect();

        let elapsed = started.elapsed();
        let mut failed = report.unknown.clone();
        failed.extend(report.failed.iter().cloned());
        reporter.batch_finished(elapsed, &failed);
        info!(elapsed_ms = elapsed.as_millis() as u64, success = report.success(), "batch finished");

        report
    }
}
