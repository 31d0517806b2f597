//! Error types for the sfx command line.
//!
//! Messages follow the same style as [`sfx_pack::PackError`]: lowercase,
//! `"<operation> failed: <reason>"` or `"<entity> not found: <identifier>"`,
//! with the offending path or value included when there is one.

use std::path::PathBuf;

use sfx_pack::PackError;
use thiserror::Error;

/// Result type alias using sfx's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sfx operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Packing, inspecting or extracting failed.
    #[error(transparent)]
    Pack(#[from] PackError),

    /// No extractor stub was found in any search location.
    #[error("stub not found: {name} (searched {})", display_paths(.searched))]
    StubNotFound {
        /// File name that was looked for.
        name: String,
        /// Directories that were searched, in order.
        searched: Vec<PathBuf>,
    },

    /// A command-line value was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
