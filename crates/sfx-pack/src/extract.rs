//! Extraction of composed binaries.
//!
//! Reading runs the packer's chain in reverse: the trailer at the very end
//! gives the footer length, the footer gives the archive offset, and the
//! archive is then streamed into a fresh temporary directory.
//!
//! Nothing is created on disk until the footer has been read and validated.
//! Once extraction starts, a failure leaves the partially populated
//! directory in place.

use std::env;
use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::archive::{ArchiveReader, EntryKind};
use crate::config::ExtractConfig;
use crate::format::{decode_trailer, Footer, TRAILER_SIZE};
use crate::launch::run_entry_point;
use crate::trace::{traced, Traced};
use crate::{IoResultExt, PackError, Result};

/// Where the footer and archive sit inside a composed binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FooterLocation {
    /// The decoded footer.
    pub footer: Footer,
    /// Offset of the first footer byte.
    pub footer_offset: u64,
    /// Encoded footer length, as stored in the trailer.
    pub footer_len: u64,
    /// Offset of the first archive byte.
    pub archive_start: u64,
    /// Length of the archive region.
    pub archive_len: u64,
}

/// Read the trailer and footer of a composed binary.
///
/// `path` is only used to annotate errors.
pub fn locate_footer<R: Read + Seek>(reader: &mut R, path: &Path) -> Result<FooterLocation> {
    let end = reader
        .seek(SeekFrom::End(0))
        .io_context("seek composed binary", path)?;
    if end < TRAILER_SIZE as u64 {
        return Err(PackError::TruncatedTrailer { len: end });
    }

    let trailer_offset = end - TRAILER_SIZE as u64;
    reader
        .seek(SeekFrom::Start(trailer_offset))
        .io_context("seek composed binary", path)?;
    let mut trailer = [0u8; TRAILER_SIZE];
    reader
        .read_exact(&mut trailer)
        .io_context("read trailer", path)?;
    let footer_len = u64::from(decode_trailer(&trailer)?);

    let footer_offset = trailer_offset.checked_sub(footer_len).ok_or_else(|| {
        PackError::corrupt_footer(
            trailer_offset,
            format!(
                "footer length {} exceeds the {} bytes before the trailer",
                footer_len, trailer_offset
            ),
        )
    })?;

    reader
        .seek(SeekFrom::Start(footer_offset))
        .io_context("seek composed binary", path)?;
    let mut bytes = vec![0u8; footer_len as usize];
    reader
        .read_exact(&mut bytes)
        .io_context("read footer", path)?;
    let footer = Footer::decode(&bytes).map_err(|e| e.at_offset(footer_offset))?;

    let archive_len = u64::try_from(footer.archive_offset)
        .ok()
        .filter(|len| *len <= footer_offset)
        .ok_or_else(|| {
            PackError::corrupt_footer(
                footer_offset,
                format!(
                    "archive offset {} points outside the {} bytes before the footer",
                    footer.archive_offset, footer_offset
                ),
            )
        })?;

    Ok(FooterLocation {
        archive_start: footer_offset - archive_len,
        archive_len,
        footer_offset,
        footer_len,
        footer,
    })
}

/// Read the trailer and footer of the composed binary at `path`.
pub fn read_footer(path: impl AsRef<Path>) -> Result<FooterLocation> {
    let path = path.as_ref();
    let mut file = File::open(path).io_context("open composed binary", path)?;
    locate_footer(&mut file, path)
}

/// An opened composed binary whose footer has been validated.
pub struct Extractor {
    path: PathBuf,
    file: Traced<File>,
    location: FooterLocation,
    config: ExtractConfig,
}

impl Extractor {
    /// Open the running executable.
    pub fn current(config: ExtractConfig) -> Result<Self> {
        let exe = env::current_exe().io_context("resolve current executable", "<self>")?;
        Self::open(exe, config)
    }

    /// Open the composed binary at `path` and read its footer.
    pub fn open(path: impl AsRef<Path>, config: ExtractConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).io_context("open composed binary", &path)?;
        let mut file = traced(file, "composed binary");

        let location = locate_footer(&mut file, &path)?;
        debug!(
            path = %path.display(),
            archive_start = location.archive_start,
            archive_len = location.archive_len,
            footer_offset = location.footer_offset,
            footer_len = location.footer_len,
            "footer located"
        );

        Ok(Self {
            path,
            file,
            location,
            config,
        })
    }

    /// Path of the composed binary.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Footer and archive location.
    pub fn location(&self) -> &FooterLocation {
        &self.location
    }

    /// Unpack the archive into a new, uniquely named temporary directory.
    ///
    /// The directory is not removed afterwards, and not on failure either:
    /// [`PackError::ExtractionFailed`] names it.
    pub fn extract(mut self) -> Result<Extraction> {
        let dir = create_extraction_dir(&self.config)?;
        info!(dir = %dir.display(), "extracting archive");

        let files = self
            .unpack(&dir)
            .map_err(|source| PackError::ExtractionFailed {
                dir: dir.clone(),
                source: Box::new(source),
            })?;

        Ok(Extraction {
            dir,
            entry_point: self.location.footer.entry_point,
            files,
        })
    }

    fn unpack(&mut self, dir: &Path) -> Result<u64> {
        if self.location.archive_len == 0 {
            debug!("archive region is empty");
            return Ok(0);
        }

        self.file
            .seek(SeekFrom::Start(self.location.archive_start))
            .io_context("seek to archive", &self.path)?;
        let region = (&mut self.file).take(self.location.archive_len);
        let mut reader = ArchiveReader::new(region).io_context("open archive", &self.path)?;

        let mut files = 0;
        for entry in reader.entries().io_context("read archive", &self.path)? {
            let mut entry = entry.io_context("read archive entry", &self.path)?;
            let relative = checked_relative_path(entry.relative_path())?;
            let target = dir.join(&relative);

            match entry.kind() {
                EntryKind::File => {}
                EntryKind::Directory => {
                    fs::create_dir_all(&target).io_context("create directory", &target)?;
                    continue;
                }
                EntryKind::Other => {
                    warn!(path = %relative.display(), "skipping unsupported archive entry");
                    continue;
                }
            }

            info!(path = %relative.display(), "extracting");
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).io_context("create directory", parent)?;
            }

            let mut file = File::create(&target).io_context("create file", &target)?;
            io::copy(&mut entry, &mut file).io_context("extract file", &target)?;
            drop(file);

            // Metadata goes on only once the content handle is closed.
            apply_metadata(&target, entry.mode(), entry.atime(), entry.mtime())?;
            files += 1;
        }

        Ok(files)
    }
}

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Directory holding the extracted files.
    pub dir: PathBuf,
    /// Command to run inside `dir`. Empty means none.
    pub entry_point: Vec<String>,
    /// Number of files written.
    pub files: u64,
}

impl Extraction {
    /// Run the entry point inside the extraction directory.
    pub fn launch(&self) -> Result<()> {
        run_entry_point(&self.entry_point, &self.dir)
    }
}

fn create_extraction_dir(config: &ExtractConfig) -> Result<PathBuf> {
    let root = config.root();
    fs::create_dir_all(&root).io_context("create temp root", &root)?;

    let dir = tempfile::Builder::new()
        .prefix(&config.dir_prefix)
        .tempdir_in(&root)
        .io_context("create extraction directory", &root)?;
    Ok(dir.keep())
}

/// Reject archive paths that would land outside the extraction directory.
fn checked_relative_path(path: &Path) -> Result<PathBuf> {
    let escapes = path.as_os_str().is_empty()
        || path
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(PackError::io(
            "validate entry path",
            path,
            io::Error::new(
                io::ErrorKind::InvalidData,
                "entry path is not relative to the extraction directory",
            ),
        ));
    }
    Ok(path.to_path_buf())
}

fn apply_metadata(path: &Path, mode: u32, atime: SystemTime, mtime: SystemTime) -> Result<()> {
    // Times before mode: reopening needs an access the mode may take away.
    let file = if cfg!(unix) {
        File::open(path)
    } else {
        OpenOptions::new().write(true).open(path)
    };
    file.and_then(|file| file.set_times(FileTimes::new().set_accessed(atime).set_modified(mtime)))
        .io_context("set file times", path)?;

    set_mode(path, mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
        .io_context("chmod file", path)
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    let mut permissions = fs::metadata(path).io_context("stat file", path)?.permissions();
    permissions.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, permissions).io_context("chmod file", path)
}
