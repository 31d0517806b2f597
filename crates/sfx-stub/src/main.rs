//! Extractor stub for self-extracting binaries.
//!
//! This is the head of every composed binary. When run, it:
//! 1. Reads the trailer and footer from its own executable image
//! 2. Extracts the appended archive into a fresh temporary directory
//! 3. Runs the entry point there, if one was packed
//!
//! The stub takes no flags. Logging is controlled with `RUST_LOG` and goes to
//! stderr so the entry point owns stdout.

use std::process::ExitCode;

use sfx_pack::{ExtractConfig, Extractor, PackError};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_logging();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ PackError::EntryPointFailed { .. }) => {
            tracing::warn!(error = %e, "entry point did not succeed");
            ExitCode::from(e.exit_code())
        }
        Err(e) => {
            tracing::error!(error = %e, "extraction failed");
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn run() -> sfx_pack::Result<()> {
    let extractor = Extractor::current(ExtractConfig::default())?;

    let location = extractor.location();
    tracing::debug!(
        exe = %extractor.path().display(),
        archive_start = location.archive_start,
        archive_len = location.archive_len,
        entry_point = ?location.footer.entry_point,
        "self-located"
    );

    let extraction = extractor.extract()?;
    tracing::info!(
        dir = %extraction.dir.display(),
        files = extraction.files,
        "extraction complete"
    );

    extraction.launch()
}

/// Initialize the tracing subscriber.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sfx_pack=info,sfx_stub=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
