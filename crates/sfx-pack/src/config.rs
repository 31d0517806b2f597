//! Configuration values for the packer and the extractor.
//!
//! Both are plain immutable values built by the caller (usually a CLI) and
//! handed to [`Packer::create`](crate::Packer::create) or
//! [`Extractor::open`](crate::Extractor::open).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::ZSTD_LEVEL;

/// Default prefix for extraction directory names.
pub const DEFAULT_DIR_PREFIX: &str = "sfx";

/// Settings for building one composed binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackConfig {
    /// Stub executable copied to the head of the output.
    pub stub: PathBuf,

    /// Output path, created or truncated.
    pub output: PathBuf,

    /// Command to run after extraction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_point: Vec<String>,

    /// zstd compression level.
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

fn default_compression_level() -> i32 {
    ZSTD_LEVEL
}

impl PackConfig {
    /// Create a config with no entry point and the default compression level.
    pub fn new(stub: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            stub: stub.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            entry_point: Vec::new(),
            compression_level: ZSTD_LEVEL,
        }
    }

    /// Set the entry point as an argv vector.
    pub fn with_entry_point(mut self, entry_point: Vec<String>) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Set the entry point from a command line (see [`parse_command_line`]).
    pub fn with_command_line(self, command: &str) -> Self {
        self.with_entry_point(parse_command_line(command))
    }

    /// Set the zstd compression level.
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }
}

/// Split a command line into an argv vector.
///
/// Arguments are separated by whitespace; there is no quoting. A blank
/// command yields an empty vector, meaning no entry point.
pub fn parse_command_line(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

/// Settings for extraction runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Directory in which extraction directories are created.
    /// `None` uses the system temp directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_root: Option<PathBuf>,

    /// Name prefix of each extraction directory.
    #[serde(default = "default_dir_prefix")]
    pub dir_prefix: String,
}

fn default_dir_prefix() -> String {
    DEFAULT_DIR_PREFIX.to_string()
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            temp_root: None,
            dir_prefix: default_dir_prefix(),
        }
    }
}

impl ExtractConfig {
    /// Create extraction directories under `root` instead of the system temp dir.
    pub fn with_temp_root(mut self, root: impl AsRef<Path>) -> Self {
        self.temp_root = Some(root.as_ref().to_path_buf());
        self
    }

    /// Directory that extraction directories are created in.
    pub fn root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}
