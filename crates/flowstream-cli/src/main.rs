//! flowstream CLI - play, record and simulate flow-controlled audio streams.

mod commands;
mod wav;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowstream")]
#[command(author, version, about = "Flow-controlled audio stream CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a WAV file through a playback stream
    Play(commands::play::PlayArgs),

    /// Record from a record stream into a WAV file
    Record(commands::record::RecordArgs),

    /// Run a profile against the simulated transport
    Simulate(commands::simulate::SimulateArgs),

    /// List sample formats, directions and stream flags
    Formats(commands::formats::FormatsArgs),

    /// List and manage stream profiles
    Profiles(commands::profiles::ProfilesArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays clean; bridge log:: calls from cpal
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => commands::play::run(args),
        Commands::Record(args) => commands::record::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Formats(args) => commands::formats::run(args),
        Commands::Profiles(args) => commands::profiles::run(args),
    }
}
