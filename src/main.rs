mod batch;
mod cli;
mod client;
mod config;
mod error;
mod job;
mod log_tailer;
mod monitor;
mod report;
mod sink;

use clap::Parser;
use cli::Cli;
use report::ExitStatus;
use sink::{OutputSink, TerminalSink};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut sink = TerminalSink::new();
    let status = match cli::run(cli, &mut sink) {
        Ok(status) => status,
        Err(e) => {
            sink.error(&format!("{:#}", e));
            sink.info("Use --help for usage information.");
            ExitStatus::ClientFailure
        }
    };

    std::process::exit(status.code());
}
