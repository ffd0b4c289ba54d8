use clap::Parser;

use crate::output::OutputMode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Job file to use
    #[arg(short = 'f', long = "file", default_value = "Goerfile.toml")]
    pub file: String,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Override the number of steps allowed to run at once
    #[arg(short = 'j', long = "workers")]
    pub workers: Option<usize>,

    /// Show what would be executed without running jobs
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// How to display job output in the terminal
    #[arg(long = "output", value_enum)]
    pub output: Option<OutputMode>,

    /// Jobs to run; lists the known jobs if none are given
    pub jobs: Vec<String>,
}
