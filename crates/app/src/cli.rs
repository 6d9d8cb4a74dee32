use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::tracking::{self, ProbeCliArgs, ProbeConfig, StreamCliArgs, StreamConfig};

/// Stream webcam hand landmarks as JSON to a single TCP client.
#[derive(Debug, Parser)]
#[command(name = "hand-stream", version, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    stream: StreamCliArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture, detect and stream to one client (the default).
    Run(StreamCliArgs),
    /// Connect to a running streamer and log the reports it sends.
    Probe(ProbeCliArgs),
}

pub fn handle_commands(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Command::Run(args)) => run_stream(args),
        None => run_stream(cli.stream),
        Some(Command::Probe(args)) => {
            let config = ProbeConfig::try_from(args)?;
            tracking::init_tracing(config.verbose);
            tracking::run_probe(config)?;
            Ok(())
        }
    }
}

fn run_stream(args: StreamCliArgs) -> Result<()> {
    let config = StreamConfig::try_from(args)?;
    tracking::init_tracing(config.verbose);
    let outcome = tracking::run(config)?;
    info!(
        "Stopped ({:?}) after {} frame(s), {} skipped, {} report(s), {} byte(s)",
        outcome.reason,
        outcome.stats.frames_captured,
        outcome.stats.frames_skipped,
        outcome.stats.reports_sent,
        outcome.stats.bytes_sent
    );
    Ok(())
}
