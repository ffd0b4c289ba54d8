//! Diagnostic logging via `tracing`.
//!
//! Level priority:
//! 1. `--verbose` → debug
//! 2. `GOER_LOG` environment variable, in `EnvFilter` syntax
//! 3. warn
//!
//! Diagnostics go to stderr. Job output is the reporter's business and never
//! passes through here.

use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{GoerError, Result};

pub const LOG_ENV: &str = "GOER_LOG";

pub fn init_logging(verbose: bool) -> Result<()> {
    fmt()
        .with_env_filter(build_filter(verbose, std::env::var(LOG_ENV).ok().as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| GoerError::Config(format!("Could not initialise logging: {}", e)))
}

fn build_filter(verbose: bool, env_value: Option<&str>) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }

    env_value
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}
