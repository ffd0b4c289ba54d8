use clap::Parser;
use std::process;

use goer::{cli::Cli, logging::init_logging};

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("Warning: {}", e);
    }

    match goer::run(args).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
