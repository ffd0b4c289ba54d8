pub mod config;
pub mod dependency;

pub use config::{JobFile, load_jobs};
pub use dependency::{required_jobs, resolve, sort_topologically};

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use tracing::{debug, error};

use crate::{
    error::Result,
    execution::{StepExecutor, StepRequest},
    output::Reporter,
    rules::{Rule, all_can_skip},
};

/// One shell command of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub command: String,
}

impl Step {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl From<&str> for Step {
    fn from(command: &str) -> Self {
        Step::new(command)
    }
}

impl From<String> for Step {
    fn from(command: String) -> Self {
        Step::new(command)
    }
}

/// Identity of a [`JobDef`]. Definitions refer to each other through these
/// rather than through names; resolution maps them back to job ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefRef(u64);

impl DefRef {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        DefRef(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DefRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "definition #{}", self.0)
    }
}

/// A job as authored, before it has an id.
#[derive(Debug)]
pub struct JobDef {
    reference: DefRef,
    pub steps: Vec<Step>,
    pub dependencies: Vec<DefRef>,
    pub rules: Vec<Box<dyn Rule>>,
    pub workdir: Option<PathBuf>,
    pub env: Option<HashMap<String, String>>,
}

impl JobDef {
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Step>,
    {
        Self {
            reference: DefRef::next(),
            steps: steps.into_iter().map(Into::into).collect(),
            dependencies: Vec::new(),
            rules: Vec::new(),
            workdir: None,
            env: None,
        }
    }

    /// A definition with no steps, useful for grouping dependencies.
    pub fn group() -> Self {
        Self::new(Vec::<Step>::new())
    }

    pub fn reference(&self) -> DefRef {
        self.reference
    }

    pub fn after(mut self, dependency: &JobDef) -> Self {
        self.dependencies.push(dependency.reference());
        self
    }

    pub fn add_dependency(&mut self, dependency: DefRef) {
        self.dependencies.push(dependency);
    }

    pub fn rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Job definitions keyed by the id each will be registered under.
pub type Definitions = BTreeMap<String, JobDef>;

/// A resolved job: its dependencies are plain ids into the same registry.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub steps: Vec<Step>,
    pub depends_on: Vec<String>,
    pub rules: Vec<Box<dyn Rule>>,
    pub workdir: Option<PathBuf>,
    pub env: Option<HashMap<String, String>>,
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
            depends_on: Vec::new(),
            rules: Vec::new(),
            workdir: None,
            env: None,
        }
    }

    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Step>,
    {
        self.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Whether every rule allows skipping. A job without rules never skips.
    pub fn can_skip(&self) -> Result<bool> {
        let skip = all_can_skip(&self.rules)?;
        debug!(job = %self.id, rules = self.rules.len(), skip, "evaluated skip rules");
        Ok(skip)
    }

    /// Runs this job's own steps, ignoring dependencies.
    ///
    /// Skips entirely when the rules allow it. Any fault is reported and turned
    /// into `false`.
    pub async fn run(&self, executor: &dyn StepExecutor, reporter: &dyn Reporter) -> bool {
        let outcome = match self.can_skip() {
            Ok(true) => {
                reporter.job_skipped(&self.id);
                return true;
            }
            Ok(false) => self.run_steps(executor, reporter).await,
            Err(e) => Err(e),
        };

        self.settle(outcome, reporter)
    }

    /// Runs the steps in order, stopping at the first non-zero exit code.
    ///
    /// `Ok(false)` means a step failed and has already been reported; `Err`
    /// means a step could not be run at all.
    pub async fn run_steps(
        &self,
        executor: &dyn StepExecutor,
        reporter: &dyn Reporter,
    ) -> Result<bool> {
        reporter.job_started(&self.id);

        for (index, step) in self.steps.iter().enumerate() {
            reporter.step_started(&self.id, &step.command);

            let request = StepRequest {
                job_id: &self.id,
                command: &step.command,
                env: self.env.as_ref(),
                workdir: self.workdir.as_deref(),
            };

            let code = executor.execute(request, reporter).await?;
            if code != 0 {
                reporter.job_failed(
                    &self.id,
                    &format!(
                        "step {} `{}` failed with exit code {}",
                        index + 1,
                        step.command,
                        code
                    ),
                );
                return Ok(false);
            }
        }

        reporter.job_finished(&self.id);
        Ok(true)
    }

    pub(crate) fn settle(&self, outcome: Result<bool>, reporter: &dyn Reporter) -> bool {
        match outcome {
            Ok(success) => success,
            Err(e) => {
                error!(job = %self.id, error = %e, "job failed with error");
                reporter.job_failed(&self.id, &e.to_string());
                false
            }
        }
    }
}
