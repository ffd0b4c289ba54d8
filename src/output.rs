use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use clap::ValueEnum;
use colored::{Color, Colorize};
use serde::Deserialize;

#[derive(ValueEnum, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Stream job output live.
    #[default]
    Stream,
    /// Print each job's output as a single block after it completes.
    Group,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Sink for everything the runner wants the user to see.
///
/// Every event carries the id of the job it belongs to. Implementations must
/// tolerate calls from many jobs at once.
pub trait Reporter: Send + Sync {
    fn job_started(&self, job_id: &str);
    fn job_skipped(&self, job_id: &str);
    fn step_started(&self, job_id: &str, command: &str);
    fn line(&self, job_id: &str, stream: OutputStream, line: &str);
    fn job_finished(&self, job_id: &str);
    fn job_failed(&self, job_id: &str, detail: &str);
    fn batch_finished(&self, elapsed: Duration, failed: &[String]);
}

const PALETTE: [Color; 8] = [
    Color::Blue,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::Cyan,
    Color::BrightBlue,
    Color::BrightGreen,
    Color::BrightMagenta,
];

#[derive(Default)]
struct TerminalState {
    colors: HashMap<String, Color>,
    groups: HashMap<String, Vec<String>>,
}

/// Colorized terminal output. Colors are handed out round-robin the first
/// time a job id is seen.
pub struct TerminalReporter {
    mode: OutputMode,
    state: Mutex<TerminalState>,
}

impl TerminalReporter {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            state: Mutex::new(TerminalState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, TerminalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pretty_id(state: &mut TerminalState, job_id: &str) -> String {
        let next = state.colors.len() % PALETTE.len();
        let color = *state
            .colors
            .entry(job_id.to_string())
            .or_insert(PALETTE[next]);
        job_id.color(color).to_string()
    }

    fn header(message: &str) -> String {
        format!("--- {}", message).bold().to_string()
    }

    fn error(message: &str) -> String {
        format!("--- {}", message).red().bold().to_string()
    }

    /// Writes a job's buffered block (group mode) followed by `closing`.
    /// Holding the state lock while printing keeps blocks from interleaving.
    fn flush(&self, job_id: &str, closing: String, to_stderr: bool) {
        let mut state = self.state();
        if let Some(lines) = state.groups.remove(job_id) {
            for line in lines {
                println!("{}", line);
            }
        }
        if to_stderr {
            eprintln!("{}", closing);
        } else {
            println!("{}", closing);
        }
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new(OutputMode::default())
    }
}

impl Reporter for TerminalReporter {
    fn job_started(&self, job_id: &str) {
        let mut state = self.state();
        let id = Self::pretty_id(&mut state, job_id);
        println!("{}", Self::header(&format!("starting '{}'", id)));
    }

    fn job_skipped(&self, job_id: &str) {
        let mut state = self.state();
        let id = Self::pretty_id(&mut state, job_id);
        println!(
            "{}",
            Self::header(&format!("skipping '{}' since all rules passed", id))
        );
    }

    fn step_started(&self, job_id: &str, command: &str) {
        let mut state = self.state();
        let id = Self::pretty_id(&mut state, job_id);
        let rendered = format!("{}$ {}", id, command);
        match self.mode {
            OutputMode::Stream => println!("{}", rendered),
            OutputMode::Group => state
                .groups
                .entry(job_id.to_string())
                .or_default()
                .push(rendered),
        }
    }

    fn line(&self, job_id: &str, stream: OutputStream, line: &str) {
        let mut state = self.state();
        let id = Self::pretty_id(&mut state, job_id);
        let rendered = format!("{}| {}", id, line);
        match (self.mode, stream) {
            (OutputMode::Stream, OutputStream::Stdout) => println!("{}", rendered),
            (OutputMode::Stream, OutputStream::Stderr) => eprintln!("{}", rendered),
            (OutputMode::Group, _) => state
                .groups
                .entry(job_id.to_string())
                .or_default()
                .push(rendered),
        }
    }

    fn job_finished(&self, job_id: &str) {
        let id = Self::pretty_id(&mut self.state(), job_id);
        self.flush(job_id, Self::header(&format!("job '{}' done", id)), false);
    }

    fn job_failed(&self, job_id: &str, detail: &str) {
        let id = Self::pretty_id(&mut self.state(), job_id);
        self.flush(
            job_id,
            Self::error(&format!("job '{}' failed: {}", id, detail)),
            true,
        );
    }

    fn batch_finished(&self, elapsed: Duration, failed: &[String]) {
        if !failed.is_empty() {
            eprintln!("{}", Self::error(&format!("failed: {}", failed.join(", "))));
        }
        let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
        println!(
            "{}",
            Self::header(&format!("elapsed: {}", humantime::format_duration(elapsed)))
        );
    }
}
