use std::{
    collections::{HashMap, HashSet},
    io,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use futures::future::BoxFuture;
use goer::{
    error::Result,
    execution::{StepExecutor, StepRequest},
    output::{OutputStream, Reporter},
    util::CommandError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    Started { job: String, command: String },
    Finished { job: String, command: String, code: i32 },
}

#[derive(Default)]
struct State {
    log: Vec<StepEvent>,
    running: usize,
    max_running: usize,
}

/// A step executor that never spawns a process.
///
/// - records every step it is asked to run, in order
/// - echoes the command back to the reporter as one stdout line
/// - exits 0 unless a code was scripted for the command
/// - optionally sleeps per step so concurrent jobs overlap
#[derive(Default)]
pub struct FakeExecutor {
    exit_codes: HashMap<String, i32>,
    spawn_errors: HashSet<String>,
    delay: Option<Duration>,
    state: Mutex<State>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exit_code(mut self, command: &str, code: i32) -> Self {
        self.exit_codes.insert(command.to_string(), code);
        self
    }

    /// Make `command` fail as if the shell could not be started.
    pub fn with_spawn_error(mut self, command: &str) -> Self {
        self.spawn_errors.insert(command.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn events(&self) -> Vec<StepEvent> {
        self.state().log.clone()
    }

    /// Commands in the order they started.
    pub fn executed(&self) -> Vec<String> {
        self.state()
            .log
            .iter()
            .filter_map(|event| match event {
                StepEvent::Started { command, .. } => Some(command.clone()),
                StepEvent::Finished { .. } => None,
            })
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.executed().iter().filter(|c| *c == command).count()
    }

    /// Jobs whose steps ran, once per job, in order of their first step.
    pub fn jobs_run(&self) -> Vec<String> {
        let mut jobs: Vec<String> = Vec::new();
        for event in &self.state().log {
            if let StepEvent::Started { job, .. } = event {
                if !jobs.contains(job) {
                    jobs.push(job.clone());
                }
            }
        }
        jobs
    }

    /// Highest number of steps that were running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.state().max_running
    }

    async fn run_step(&self, request: StepRequest<'_>, reporter: &dyn Reporter) -> Result<i32> {
        if self.spawn_errors.contains(request.command) {
            return Err(CommandError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("cannot spawn `{}`", request.command),
            ))
            .into());
        }

        {
            let mut state = self.state();
            state.log.push(StepEvent::Started {
                job: request.job_id.to_string(),
                command: request.command.to_string(),
            });
            state.running += 1;
            state.max_running = state.max_running.max(state.running);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        reporter.line(request.job_id, OutputStream::Stdout, request.command);

        let code = self.exit_codes.get(request.command).copied().unwrap_or(0);

        let mut state = self.state();
        state.running -= 1;
        state.log.push(StepEvent::Finished {
            job: request.job_id.to_string(),
            command: request.command.to_string(),
            code,
        });

        Ok(code)
    }
}

impl StepExecutor for FakeExecutor {
    fn execute<'a>(
        &'a self,
        request: StepRequest<'a>,
        reporter: &'a dyn Reporter,
    ) -> BoxFuture<'a, Result<i32>> {
        Box::pin(self.run_step(request, reporter))
    }
}
