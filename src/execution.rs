use std::{collections::HashMap, io::Error as IoError, path::Path, sync::Arc, thread};

use futures::future::BoxFuture;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::Semaphore,
};
use tracing::debug;

use crate::{
    error::Result,
    output::{OutputStream, Reporter},
    util::{CommandError, shell_command},
};

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Everything needed to run one step of a job.
#[derive(Debug, Clone, Copy)]
pub struct StepRequest<'a> {
    pub job_id: &'a str,
    pub command: &'a str,
    /// Variables layered over the inherited environment.
    pub env: Option<&'a HashMap<String, String>>,
    pub workdir: Option<&'a Path>,
}

/// Runs a single step to completion and returns its exit code.
///
/// Every output line must reach `reporter` before the returned future
/// resolves. A non-zero exit code is data for the caller, not an error; `Err`
/// is reserved for failures to run the step at all.
pub trait StepExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: StepRequest<'a>,
        reporter: &'a dyn Reporter,
    ) -> BoxFuture<'a, Result<i32>>;
}

/// Runs steps through the platform shell, at most `workers` at a time.
pub struct ShellExecutor {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl ShellExecutor {
    pub fn new(workers: Option<usize>) -> Self {
        let workers = workers.unwrap_or_else(default_workers).max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    async fn run_step(&self, request: StepRequest<'_>, reporter: &dyn Reporter) -> Result<i32> {
        // Held only while the process runs, never across dependency waits.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| CommandError::Io(IoError::other(e)))?;

        let mut cmd = shell_command(request.command);
        if let Some(env) = request.env {
            cmd.envs(env);
        }
        if let Some(workdir) = request.workdir {
            cmd.current_dir(workdir);
        }

        let mut child = cmd.spawn().map_err(CommandError::Io)?;
        debug!(job = %request.job_id, command = %request.command, pid = ?child.id(), "spawned step");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdout_result, stderr_result) = tokio::join!(
            forward_lines(stdout, request.job_id, OutputStream::Stdout, reporter),
            forward_lines(stderr, request.job_id, OutputStream::Stderr, reporter),
        );
        stdout_result?;
        stderr_result?;

        let status = child.wait().await.map_err(CommandError::Io)?;
        let code = status.code().unwrap_or(-1);

        debug!(job = %request.job_id, command = %request.command, exit_code = code, "step exited");
        Ok(code)
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StepExecutor for ShellExecutor {
    fn execute<'a>(
        &'a self,
        request: StepRequest<'a>,
        reporter: &'a dyn Reporter,
    ) -> BoxFuture<'a, Result<i32>> {
        Box::pin(self.run_step(request, reporter))
    }
}

async fn forward_lines<R>(
    pipe: Option<R>,
    job_id: &str,
    stream: OutputStream,
    reporter: &dyn Reporter,
) -> std::result::Result<(), CommandError>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Ok(());
    };

    let mut segments = BufReader::new(pipe).split(b'\n');
    while let Some(segment) = segments.next_segment().await? {
        let line = String::from_utf8_lossy(&segment);
        reporter.line(job_id, stream, line.trim_end_matches('\r'));
    }

    Ok(())
}
