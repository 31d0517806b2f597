//! Pack command for creating self-extracting binaries.
//!
//! Creates a binary that contains:
//! - The extractor stub
//! - A zstd-compressed tar of the inputs
//! - A footer recording where the archive starts and what to run

use std::path::PathBuf;

use clap::Args;
use sfx::locate::find_stub;
use sfx::{Error, Result};
use sfx_pack::archive::ZSTD_LEVEL;
use sfx_pack::packer::pack;
use sfx_pack::PackConfig;
use tracing::info;

use super::format_bytes;

/// Default output path.
const DEFAULT_OUTPUT: &str = "sfx.out";

/// Package files and directories into a self-extracting executable.
///
/// Directories are added recursively. Entry paths are relative to each
/// input's parent, so `sfx pack app/` extracts to `<tmp>/app/...`.
///
/// Examples:
///   sfx pack -o hello -m ./hello.sh hello.sh
///   sfx pack -o tool -m "bin/tool --serve" bin/ share/
///   sfx pack --stub ./target/release/sfx-stub -o data data/
#[derive(Args, Debug)]
pub struct PackCmd {
    /// Files and directories to pack
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output file path for the composed binary
    #[arg(short = 'o', long, value_name = "PATH", default_value_os_t = default_output())]
    pub output: PathBuf,

    /// Command to run in the extraction directory, split on spaces
    #[arg(short = 'm', long = "main", value_name = "CMD")]
    pub entry_point: Option<String>,

    /// zstd compression level (1-22)
    #[arg(long, default_value_t = ZSTD_LEVEL, value_name = "N")]
    pub level: i32,

    /// Path to the extractor stub (defaults to searching for sfx-stub)
    #[arg(long, value_name = "PATH")]
    pub stub: Option<PathBuf>,
}

impl PackCmd {
    pub fn run(self) -> Result<()> {
        if !(1..=22).contains(&self.level) {
            return Err(Error::invalid_argument(format!(
                "compression level must be between 1 and 22, got {}",
                self.level
            )));
        }

        let stub = match self.stub {
            Some(path) => path,
            None => find_stub()?,
        };
        info!(
            stub = %stub.display(),
            output = %self.output.display(),
            inputs = self.inputs.len(),
            "packing"
        );

        let mut config = PackConfig::new(&stub, &self.output).with_compression_level(self.level);
        if let Some(ref command) = self.entry_point {
            config = config.with_command_line(command);
        }

        let info = pack(config, &self.inputs)?;

        println!(
            "Packed: {} ({} entries, stub: {}, archive: {}, total: {})",
            self.output.display(),
            info.entries,
            format_bytes(info.stub_size),
            format_bytes(info.archive_size),
            format_bytes(info.total_size)
        );
        match self.entry_point {
            Some(ref command) => println!("Entry point: {}", command),
            None => println!("Entry point: none (extract only)"),
        }
        println!("\nRun with: {}", self.output.display());

        Ok(())
    }
}

fn default_output() -> PathBuf {
    PathBuf::from(format!("{}{}", DEFAULT_OUTPUT, std::env::consts::EXE_SUFFIX))
}
