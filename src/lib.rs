pub mod cli;
pub mod error;
pub mod execution;
pub mod goer;
pub mod job;
pub mod logging;
pub mod output;
pub mod rules;
pub mod scheduler;
pub mod util;

use std::{path::Path, sync::Arc};

use tracing::debug;

use crate::{
    cli::Cli,
    error::Result,
    execution::ShellExecutor,
    goer::Goer,
    job::{JobFile, load_jobs, required_jobs},
    output::{OutputMode, TerminalReporter},
    scheduler::Scheduler,
};

/// Loads the job file and does what the command line asked for. Returns the
/// overall success of the run; listing and dry runs always succeed.
pub async fn run(args: Cli) -> Result<bool> {
    let JobFile {
        definitions,
        workers,
        output,
    } = load_jobs(Path::new(&args.file))?;

    let workers = args.workers.or(workers);
    let output_mode = args.output.or(output).unwrap_or(OutputMode::Stream);
    let executor = ShellExecutor::new(workers);
    debug!(workers = executor.workers(), ?output_mode, "loaded {}", args.file);

    let scheduler = Scheduler::resolve(definitions)?
        .with_executor(Arc::new(executor))
        .with_reporter(Arc::new(TerminalReporter::new(output_mode)));
    let goer = Goer::new(scheduler);

    if args.jobs.is_empty() {
        println!("available jobs: {}", goer.list_job_ids().join(" "));
        return Ok(true);
    }

    if args.dry_run {
        print_plan(&goer, &args.jobs)?;
        return Ok(true);
    }

    Ok(goer.run(&args.jobs).await)
}

fn print_plan(goer: &Goer, job_ids: &[String]) -> Result<()> {
    let scheduler = goer.scheduler();
    let plan = required_jobs(scheduler.jobs(), job_ids)?;

    println!("Dry run mode - showing what would be executed:");
    for job_id in &plan {
        let Some(job) = scheduler.job(job_id) else {
            continue;
        };

        if job.steps.is_empty() {
            println!("  {} (no steps)", job.id);
        }
        for step in &job.steps {
            println!("  {} would run: {}", job.id, step.command);
        }
    }

    Ok(())
}
