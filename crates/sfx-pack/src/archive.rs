//! Streaming archive writer and reader.
//!
//! Payload files are stored as a tar stream inside a single zstd frame. Both
//! halves stream: the writer copies each source file straight into the
//! encoder and the reader hands out entries whose content is decoded on
//! demand, so memory use does not depend on payload size.

use std::fs::{File, Metadata};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{IoResultExt, Result};

/// Compression level for zstd (19 = high compression).
pub const ZSTD_LEVEL: i32 = 19;

type Encoder<W> = zstd::stream::write::Encoder<'static, W>;
type Decoder<R> = zstd::stream::read::Decoder<'static, BufReader<R>>;

/// Writes file entries into a compressed tar stream.
pub struct ArchiveWriter<W: Write> {
    builder: tar::Builder<Encoder<W>>,
    entries: u64,
}

impl<W: Write> ArchiveWriter<W> {
    /// Start a compressed archive on `sink`.
    pub fn new(sink: W, level: i32) -> io::Result<Self> {
        let encoder = Encoder::new(sink, level)?;
        Ok(Self {
            builder: tar::Builder::new(encoder),
            entries: 0,
        })
    }

    /// Append the regular file at `source` as `relative_path`.
    ///
    /// Mode bits, size, modification and access times come from the source's
    /// metadata. The content is streamed, never buffered whole.
    pub fn append_file(&mut self, relative_path: &Path, source: &Path) -> Result<()> {
        let file = File::open(source).io_context("open input file", source)?;
        let metadata = file.metadata().io_context("stat input file", source)?;

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(metadata.len());
        header.set_mode(mode_bits(&metadata));
        let mtime = metadata.modified().map(unix_seconds).unwrap_or(0);
        header.set_mtime(mtime);
        if let Some(gnu) = header.as_gnu_mut() {
            gnu.set_atime(metadata.accessed().map(unix_seconds).unwrap_or(mtime));
        }

        self.builder
            .append_data(&mut header, relative_path, file)
            .io_context("archive input file", source)?;
        self.entries += 1;

        tracing::debug!(
            path = %relative_path.display(),
            size = metadata.len(),
            "archived file"
        );
        Ok(())
    }

    /// Number of entries written so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Close the tar stream, then the compression stream, and return the sink.
    pub fn finish(self) -> io::Result<W> {
        let encoder = self.builder.into_inner()?;
        encoder.finish()
    }
}

/// Reads file entries from a compressed tar stream.
///
/// The stream is consumed as it is read; a fresh reader over a freshly
/// positioned source is needed to read it again.
pub struct ArchiveReader<R: Read> {
    archive: tar::Archive<Decoder<R>>,
}

impl<R: Read> ArchiveReader<R> {
    /// Open a compressed archive positioned at the start of `source`.
    pub fn new(source: R) -> io::Result<Self> {
        let decoder = Decoder::new(source)?;
        Ok(Self {
            archive: tar::Archive::new(decoder),
        })
    }

    /// Iterate the entries. May only be called once per reader.
    pub fn entries(&mut self) -> io::Result<ArchiveEntries<'_, R>> {
        Ok(ArchiveEntries {
            inner: self.archive.entries()?,
        })
    }
}

/// Lazy iterator over archive entries.
pub struct ArchiveEntries<'a, R: 'a + Read> {
    inner: tar::Entries<'a, Decoder<R>>,
}

impl<'a, R: 'a + Read> Iterator for ArchiveEntries<'a, R> {
    type Item = io::Result<ArchiveEntry<'a, R>>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.inner.next()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e)),
        };
        Some(ArchiveEntry::from_tar(entry))
    }
}

/// Kind of an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file with content.
    File,
    /// Directory.
    Directory,
    /// Anything else (links, devices); not produced by [`ArchiveWriter`].
    Other,
}

/// One entry of an archive, readable for its content.
pub struct ArchiveEntry<'a, R: 'a + Read> {
    inner: tar::Entry<'a, Decoder<R>>,
    relative_path: PathBuf,
    kind: EntryKind,
    mode: u32,
    size: u64,
    mtime: u64,
    atime: u64,
}

impl<'a, R: 'a + Read> ArchiveEntry<'a, R> {
    fn from_tar(inner: tar::Entry<'a, Decoder<R>>) -> io::Result<Self> {
        let header = inner.header();
        let kind = match header.entry_type() {
            tar::EntryType::Regular | tar::EntryType::Continuous => EntryKind::File,
            tar::EntryType::Directory => EntryKind::Directory,
            _ => EntryKind::Other,
        };
        let mode = header.mode()?;
        let size = header.size()?;
        let mtime = header.mtime()?;
        let atime = header
            .as_gnu()
            .and_then(|gnu| gnu.atime().ok())
            .unwrap_or(mtime);
        let relative_path = inner.path()?.into_owned();

        Ok(Self {
            inner,
            relative_path,
            kind,
            mode,
            size,
            mtime,
            atime,
        })
    }

    /// Path relative to the archive root.
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Entry kind.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// POSIX permission bits.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Declared content size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Modification time.
    pub fn mtime(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.mtime)
    }

    /// Access time.
    pub fn atime(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.atime)
    }
}

impl<'a, R: 'a + Read> Read for ArchiveEntry<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

#[cfg(unix)]
fn mode_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
