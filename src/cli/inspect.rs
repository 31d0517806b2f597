//! Inspect command for reading the footer of a composed binary.

use std::path::PathBuf;

use clap::Args;
use sfx::Result;
use sfx_pack::{read_footer, FooterLocation};

use super::format_bytes;

/// Show where the archive sits in a self-extracting executable and what it
/// runs after extraction.
///
/// Nothing is extracted.
#[derive(Args, Debug)]
pub struct InspectCmd {
    /// Self-extracting executable to inspect
    #[arg(value_name = "BINARY")]
    pub binary: PathBuf,
}

impl InspectCmd {
    pub fn run(self) -> Result<()> {
        let location = read_footer(&self.binary)?;
        print!("{}", render(&self.binary, &location));
        Ok(())
    }
}

fn render(binary: &std::path::Path, location: &FooterLocation) -> String {
    let entry_point = if location.footer.entry_point.is_empty() {
        "none".to_string()
    } else {
        location.footer.entry_point.join(" ")
    };

    format!(
        "Binary:         {}\n\
         Stub:           {}\n\
         Archive:        {} at offset {}\n\
         Footer:         {} bytes at offset {}\n\
         Archive offset: {}\n\
         Entry point:    {}\n",
        binary.display(),
        format_bytes(location.archive_start),
        format_bytes(location.archive_len),
        location.archive_start,
        location.footer_len,
        location.footer_offset,
        location.footer.archive_offset,
        entry_point,
    )
}
