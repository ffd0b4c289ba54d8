use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use goer::output::{OutputStream, Reporter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Started(String),
    Skipped(String),
    Step(String, String),
    Line(String, OutputStream, String),
    Finished(String),
    Failed(String, String),
    Batch { failed: Vec<String> },
}

/// Reporter that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn events_mut(&self) -> MutexGuard<'_, Vec<ReportEvent>> {
        self.events.lock().unwrap()
    }

    fn push(&self, event: ReportEvent) {
        self.events_mut().push(event);
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events_mut().clone()
    }

    pub fn skipped(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::Skipped(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// `(job, detail)` for every failure reported.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::Failed(id, detail) => Some((id, detail)),
                _ => None,
            })
            .collect()
    }

    pub fn failure_of(&self, job_id: &str) -> Option<String> {
        self.failures()
            .into_iter()
            .find(|(id, _)| id == job_id)
            .map(|(_, detail)| detail)
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::Batch { failed } => Some(failed),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn job_started(&self, job_id: &str) {
        self.push(ReportEvent::Started(job_id.to_string()));
    }

    fn job_skipped(&self, job_id: &str) {
        self.push(ReportEvent::Skipped(job_id.to_string()));
    }

    fn step_started(&self, job_id: &str, command: &str) {
        self.push(ReportEvent::Step(job_id.to_string(), command.to_string()));
    }

    fn line(&self, job_id: &str, stream: OutputStream, line: &str) {
        self.push(ReportEvent::Line(job_id.to_string(), stream, line.to_string()));
    }

    fn job_finished(&self, job_id: &str) {
        self.push(ReportEvent::Finished(job_id.to_string()));
    }

    fn job_failed(&self, job_id: &str, detail: &str) {
        self.push(ReportEvent::Failed(job_id.to_string(), detail.to_string()));
    }

    fn batch_finished(&self, _elapsed: Duration, failed: &[String]) {
        self.push(ReportEvent::Batch {
            failed: failed.to_vec(),
        });
    }
}
