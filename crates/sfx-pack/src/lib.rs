//! Self-extracting executables.
//!
//! This crate builds and consumes composed binaries: a runnable stub followed
//! by a compressed archive of payload files and a small trailing footer that
//! lets the stub find and unpack that archive when it runs itself.
//!
//! # Binary Format
//!
//! ```text
//! +---------------------------+
//! | Stub Executable           |  copied byte-for-byte
//! +---------------------------+
//! | Archive (tar, zstd)       |  payload files
//! +---------------------------+
//! | Footer (JSON)             |  archive_offset, entry_point
//! +---------------------------+
//! | Trailer (2 bytes, u16 BE) |  length of the footer
//! +---------------------------+
//! ```
//!
//! `archive_offset` is measured backward from the first byte of the footer
//! to the first byte of the archive. Reading therefore runs in reverse:
//! trailer, then footer, then archive.
//!
//! # Example
//!
//! ```no_run
//! use sfx_pack::{ExtractConfig, Extractor, PackConfig, Packer};
//!
//! let config = PackConfig::new("sfx-stub", "app").with_command_line("./run.sh");
//! let mut packer = Packer::create(config)?;
//! packer.add_files(&["run.sh", "assets"])?;
//! packer.finalize()?;
//!
//! let extraction = Extractor::open("app", ExtractConfig::default())?.extract()?;
//! extraction.launch()?;
//! # Ok::<(), sfx_pack::PackError>(())
//! ```

#![deny(missing_docs)]

pub mod archive;
pub mod config;
pub mod extract;
pub mod format;
pub mod launch;
pub mod packer;
pub mod trace;

pub use config::{ExtractConfig, PackConfig};
pub use extract::{read_footer, Extraction, Extractor, FooterLocation};
pub use format::{Footer, MAX_FOOTER_SIZE, TRAILER_SIZE};
pub use launch::{run_entry_point, EntryPointFailure};
pub use packer::{PackedInfo, Packer};

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Exit code used when an error has no more specific mapping.
pub const EXIT_FAILURE: u8 = 1;

/// Exit code used when the entry point could not be started.
pub const EXIT_NOT_STARTED: u8 = 127;

/// Errors that can occur during pack and extract operations.
#[derive(Debug, Error)]
pub enum PackError {
    /// The file is too short to hold the 2-byte trailer.
    #[error("trailer truncated: file is {len} bytes, need at least {}", TRAILER_SIZE)]
    TruncatedTrailer {
        /// Length of the file that was inspected.
        len: u64,
    },

    /// The footer region does not decode to a valid footer.
    #[error("corrupt footer at offset {offset}: {reason}")]
    CorruptFooter {
        /// Byte offset of the offending region.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// The encoded footer cannot be described by a 2-byte trailer.
    #[error("footer too large: {len} bytes, limit is {}", MAX_FOOTER_SIZE)]
    FooterTooLarge {
        /// Encoded footer length.
        len: usize,
    },

    /// `add_files` was called on a packer that already wrote its archive.
    #[error("archive already packed: files may only be added once")]
    AlreadyPacked,

    /// Two inputs map to the same archive path.
    #[error("duplicate archive entry {}: from {}", relative_path.display(), path.display())]
    DuplicateEntry {
        /// Source file that would overwrite an earlier entry.
        path: PathBuf,
        /// Archive path both inputs map to.
        relative_path: PathBuf,
    },

    /// Footer serialization failed.
    #[error("footer encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A filesystem or stream operation failed.
    #[error("{operation} failed: {}: {source}", path.display())]
    Io {
        /// The operation that failed (e.g. "open stub", "create file").
        operation: &'static str,
        /// The path the operation was applied to.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Unpacking the archive failed. Files written so far are left in `dir`.
    #[error("extraction failed: {}: {source}", dir.display())]
    ExtractionFailed {
        /// Extraction directory, possibly partially populated.
        dir: PathBuf,
        /// What went wrong.
        #[source]
        source: Box<PackError>,
    },

    /// The entry point could not be started or did not succeed.
    #[error("entry point {program} failed: {failure}")]
    EntryPointFailed {
        /// Program name (`entry_point[0]`).
        program: String,
        /// How it failed.
        #[source]
        failure: EntryPointFailure,
    },
}

impl PackError {
    /// Create an I/O error annotated with the operation and path.
    pub fn io(operation: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a corrupt-footer error for the region starting at `offset`.
    pub fn corrupt_footer(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptFooter {
            offset,
            reason: reason.into(),
        }
    }

    /// Shift the offset of a [`PackError::CorruptFooter`] by `base`.
    ///
    /// The codec reports offsets relative to the footer bytes it was given;
    /// callers that know where those bytes live in the file rebase them.
    pub fn at_offset(self, base: u64) -> Self {
        match self {
            Self::CorruptFooter { offset, reason } => Self::CorruptFooter {
                offset: base + offset,
                reason,
            },
            other => other,
        }
    }

    /// Process exit code for this error.
    ///
    /// A non-zero exit of the entry point is passed through verbatim so that
    /// a self-extracting binary behaves like the program it wraps.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::EntryPointFailed { failure, .. } => match failure {
                EntryPointFailure::NotStarted(_) => EXIT_NOT_STARTED,
                EntryPointFailure::Exited(code) => u8::try_from(*code)
                    .ok()
                    .filter(|code| *code != 0)
                    .unwrap_or(EXIT_FAILURE),
                EntryPointFailure::Signaled(signal) => u8::try_from(128 + *signal)
                    .unwrap_or(EXIT_FAILURE),
            },
            _ => EXIT_FAILURE,
        }
    }
}

/// Result type for pack operations.
pub type Result<T> = std::result::Result<T, PackError>;

/// Attach operation and path context to `io::Result`s.
pub trait IoResultExt<T> {
    /// Convert the error into a [`PackError::Io`] naming `operation` and `path`.
    fn io_context(self, operation: &'static str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn io_context(self, operation: &'static str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| PackError::io(operation, path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_context_message() {
        let result: io::Result<()> = Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = result.io_context("open stub", "/tmp/stub").unwrap_err();
        assert_eq!(err.to_string(), "open stub failed: /tmp/stub: gone");
    }

    #[test]
    fn test_at_offset_rebases_corrupt_footer() {
        let err = PackError::corrupt_footer(3, "bad").at_offset(100);
        assert!(matches!(err, PackError::CorruptFooter { offset: 103, .. }));

        let err = PackError::AlreadyPacked.at_offset(100);
        assert!(matches!(err, PackError::AlreadyPacked));
    }

    #[test]
    fn test_exit_codes() {
        let failed = |failure| PackError::EntryPointFailed {
            program: "app".to_string(),
            failure,
        };

        assert_eq!(failed(EntryPointFailure::Exited(3)).exit_code(), 3);
        assert_eq!(failed(EntryPointFailure::Exited(256)).exit_code(), EXIT_FAILURE);
        assert_eq!(failed(EntryPointFailure::Signaled(9)).exit_code(), 137);
        assert_eq!(
            failed(EntryPointFailure::NotStarted(io::ErrorKind::NotFound.into())).exit_code(),
            EXIT_NOT_STARTED
        );
        assert_eq!(PackError::TruncatedTrailer { len: 1 }.exit_code(), EXIT_FAILURE);
        assert_eq!(PackError::AlreadyPacked.exit_code(), EXIT_FAILURE);
        assert_eq!(
            PackError::DuplicateEntry {
                path: PathBuf::from("y/a.txt"),
                relative_path: PathBuf::from("a.txt"),
            }
            .exit_code(),
            EXIT_FAILURE
        );
    }
}
