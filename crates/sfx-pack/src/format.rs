//! Footer and trailer encoding for composed binaries.
//!
//! The footer is the only structured metadata in a composed binary. It is
//! written once, after the archive, and located at run time through the
//! fixed-size trailer that follows it.

use serde::{Deserialize, Serialize};

use crate::{PackError, Result};

/// Trailer size in bytes (fixed).
pub const TRAILER_SIZE: usize = 2;

/// Largest encoded footer a trailer can describe.
pub const MAX_FOOTER_SIZE: usize = u16::MAX as usize;

/// Trailing metadata of a composed binary.
///
/// Encoded as compact JSON with the fields in declaration order:
/// ```text
/// {"archive_offset":1234,"entry_point":["./run.sh","--flag"]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Footer {
    /// Distance from the first footer byte back to the first archive byte.
    pub archive_offset: i64,

    /// Command to run after extraction. Empty means none.
    pub entry_point: Vec<String>,
}

impl Footer {
    /// Create a footer for an archive of `archive_offset` bytes.
    pub fn new(archive_offset: i64, entry_point: Vec<String>) -> Self {
        Self {
            archive_offset,
            entry_point,
        }
    }

    /// Serialize the footer.
    ///
    /// Fails with [`PackError::FooterTooLarge`] if the encoding would not fit
    /// in the trailer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_FOOTER_SIZE {
            return Err(PackError::FooterTooLarge { len: bytes.len() });
        }
        Ok(bytes)
    }

    /// Deserialize a footer.
    ///
    /// Only the exact encoding produced by [`Footer::encode`] is accepted.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let footer: Footer = serde_json::from_slice(bytes)
            .map_err(|e| PackError::corrupt_footer(0, e.to_string()))?;

        if serde_json::to_vec(&footer)? != bytes {
            return Err(PackError::corrupt_footer(0, "non-canonical footer encoding"));
        }

        Ok(footer)
    }
}

/// Serialize the trailer for a footer of `len` bytes.
pub fn encode_trailer(len: usize) -> Result<[u8; TRAILER_SIZE]> {
    let len = u16::try_from(len).map_err(|_| PackError::FooterTooLarge { len })?;
    Ok(len.to_be_bytes())
}

/// Deserialize a trailer into the footer length it describes.
pub fn decode_trailer(bytes: &[u8]) -> Result<u16> {
    let trailer: [u8; TRAILER_SIZE] = bytes
        .try_into()
        .map_err(|_| PackError::TruncatedTrailer {
            len: bytes.len() as u64,
        })?;
    Ok(u16::from_be_bytes(trailer))
}
