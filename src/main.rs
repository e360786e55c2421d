mod batch;
mod cli;
mod config;
mod engine;
mod error;
mod model;
mod orchestrator;
mod sweep;
mod text_summary;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Route diagnostics to stderr; `SWEEPRUN_LOG` takes precedence over `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "sweeprun=warn",
        1 => "sweeprun=info",
        _ => "sweeprun=debug",
    };
    let filter =
        EnvFilter::try_from_env("SWEEPRUN_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();
    init_tracing(args.global.verbose);

    match cli::run(args).await {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
