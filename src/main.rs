//! sfx CLI entry point.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

/// sfx - build self-extracting executables
#[derive(Parser, Debug)]
#[command(name = "sfx")]
#[command(about = "Bundle files and an entry point into a self-extracting executable")]
#[command(
    long_about = "sfx appends a compressed archive and a small footer to a prebuilt \
extractor stub. Running the result unpacks the archive into a fresh temporary \
directory and runs the entry point there.\n\n\
Quick start:\n  \
sfx pack -o hello -m ./hello.sh hello.sh\n  \
./hello\n\n\
Inspect a composed binary:\n  \
sfx inspect ./hello"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Package files into a self-extracting executable
    Pack(cli::pack::PackCmd),

    /// Show the footer of a self-extracting executable
    Inspect(cli::inspect::InspectCmd),
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on RUST_LOG or default to warn
    init_logging();

    tracing::debug!(version = sfx::VERSION, "starting sfx");

    let result = match cli.command {
        Commands::Pack(cmd) => cmd.run(),
        Commands::Inspect(cmd) => cmd.run(),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sfx=warn,sfx_pack=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
