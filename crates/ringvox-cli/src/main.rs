//! Ringvox CLI - inspect, decode and simulate playback of audio assets.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ringvox")]
#[command(author, version, about = "Ringvox audio engine CLI", long_about = None)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show format and length of audio files
    Info(commands::info::InfoArgs),

    /// Decode an audio file to WAV or raw PCM
    Cat(commands::cat::CatArgs),

    /// Play files through the engine on a virtual device
    Simulate(commands::simulate::SimulateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    match cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Cat(args) => commands::cat::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
    }
}
