//! sfx - self-extracting executables
//!
//! sfx composes a prebuilt extractor stub with a compressed archive of files
//! and a small footer into one executable. Running the result unpacks the
//! archive into a fresh temporary directory and optionally runs an entry
//! point there.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │  sfx CLI (pack, inspect)                        │
//! ├─────────────────────────────────────────────────┤
//! │  sfx-pack (footer codec, packer, extractor)     │
//! ├─────────────────────────────────────────────────┤
//! │  sfx-stub (head of every composed binary)       │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! The heavy lifting lives in [`sfx_pack`]. This crate adds the stub lookup
//! and the error type used by the command line.
//!
//! # Example
//!
//! ```no_run
//! use sfx::locate::find_stub;
//! use sfx_pack::{packer::pack, PackConfig};
//!
//! let stub = find_stub()?;
//! let config = PackConfig::new(stub, "hello").with_command_line("./hello.sh");
//! let info = pack(config, &["hello.sh"])?;
//! println!("packed {} entries", info.entries);
//! # Ok::<(), sfx::Error>(())
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod locate;

pub use error::{Error, Result};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
