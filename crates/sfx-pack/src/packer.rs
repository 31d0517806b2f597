//! Packer for assembling composed binaries.
//!
//! Packing is one forward pass over a single output file:
//!
//! 1. [`Packer::create`] copies the stub and remembers where it ends.
//! 2. [`Packer::add_files`] streams the compressed archive after it.
//! 3. [`Packer::finalize`] appends the footer, which records how far back
//!    the archive starts, and the trailer, which records the footer length.
//!
//! A failure at any step leaves a partially written, invalid output behind.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::archive::ArchiveWriter;
use crate::config::PackConfig;
use crate::format::{encode_trailer, Footer, TRAILER_SIZE};
use crate::trace::{traced, Traced};
use crate::{IoResultExt, PackError, Result};

/// Builder of one composed binary.
pub struct Packer {
    config: PackConfig,
    output: Traced<File>,
    archive_start: u64,
    packed: bool,
    entries: u64,
}

impl Packer {
    /// Create the output file and copy the stub into it.
    ///
    /// The output is created or truncated and receives the stub's permission
    /// bits plus owner write and execute, so that it can be packed over again
    /// even when the stub is read-only.
    pub fn create(config: PackConfig) -> Result<Self> {
        let mut stub = File::open(&config.stub).io_context("open stub", &config.stub)?;
        let stub_metadata = stub.metadata().io_context("stat stub", &config.stub)?;

        if let (Ok(stub_path), Ok(output_path)) = (
            fs::canonicalize(&config.stub),
            fs::canonicalize(&config.output),
        ) {
            if stub_path == output_path {
                return Err(PackError::io(
                    "create output",
                    &config.output,
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "output would overwrite the stub",
                    ),
                ));
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&config.output)
            .io_context("create output", &config.output)?;
        let mut output = traced(file, "output");

        io::copy(&mut stub, &mut output).io_context("copy stub", &config.output)?;
        let archive_start = output
            .seek(SeekFrom::End(0))
            .io_context("seek output", &config.output)?;

        set_executable(&config.output, &stub_metadata)?;

        debug!(
            stub = %config.stub.display(),
            output = %config.output.display(),
            stub_size = archive_start,
            "copied stub"
        );

        Ok(Self {
            config,
            output,
            archive_start,
            packed: false,
            entries: 0,
        })
    }

    /// Offset at which the archive starts (the stub size).
    pub fn archive_start(&self) -> u64 {
        self.archive_start
    }

    /// Stream the given files and directories into the archive.
    ///
    /// Directories are walked depth-first in name order. Entry paths are
    /// relative to each input's parent, so `assets/` yields `assets/...` and
    /// `run.sh` yields `run.sh`. Symlinks are followed; other special files
    /// are skipped. Two files that map to the same entry path fail with
    /// [`PackError::DuplicateEntry`].
    ///
    /// Returns the number of entries written. A packer holds exactly one
    /// archive, so a second call fails with [`PackError::AlreadyPacked`]
    /// without touching the output.
    pub fn add_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<u64> {
        if self.packed {
            return Err(PackError::AlreadyPacked);
        }
        self.packed = true;

        let output_path = self.config.output.clone();
        self.output
            .seek(SeekFrom::End(0))
            .io_context("seek output", &output_path)?;

        // The output may live inside one of the input directories.
        let skip = fs::canonicalize(&output_path).ok();

        let mut writer = ArchiveWriter::new(&mut self.output, self.config.compression_level)
            .io_context("start compression stream", &output_path)?;

        let mut seen = HashSet::new();
        for path in paths {
            let path = path.as_ref();
            let relative = path.file_name().map(PathBuf::from).unwrap_or_default();
            append_tree(&mut writer, path, &relative, skip.as_deref(), &mut seen)?;
        }

        let entries = writer.entries();
        let output = writer
            .finish()
            .io_context("finish archive", &output_path)?;
        output.flush().io_context("flush output", &output_path)?;

        self.entries = entries;
        info!(entries, output = %output_path.display(), "archive written");
        Ok(entries)
    }

    /// Append the footer and trailer and close the output.
    ///
    /// Without a prior [`Packer::add_files`] the footer describes an empty
    /// archive region.
    pub fn finalize(mut self) -> Result<PackedInfo> {
        let output_path = &self.config.output;

        if !self.packed {
            warn!(
                output = %output_path.display(),
                "finalizing without files; archive region is empty"
            );
        }

        let archive_end = self
            .output
            .seek(SeekFrom::End(0))
            .io_context("seek output", output_path)?;
        let archive_size = archive_end - self.archive_start;
        let archive_offset = i64::try_from(archive_size).map_err(|_| {
            PackError::io(
                "compute archive offset",
                output_path,
                io::Error::new(io::ErrorKind::InvalidData, "archive exceeds i64::MAX bytes"),
            )
        })?;

        let footer = Footer::new(archive_offset, self.config.entry_point.clone());
        let encoded = footer.encode()?;
        let trailer = encode_trailer(encoded.len())?;

        self.output
            .write_all(&encoded)
            .io_context("write footer", output_path)?;
        self.output
            .write_all(&trailer)
            .io_context("write trailer", output_path)?;
        self.output.flush().io_context("flush output", output_path)?;

        let info = PackedInfo {
            stub_size: self.archive_start,
            archive_size,
            footer_size: encoded.len() as u64,
            total_size: archive_end + encoded.len() as u64 + TRAILER_SIZE as u64,
            entries: self.entries,
        };

        info!(
            output = %output_path.display(),
            total_size = info.total_size,
            entry_point = ?footer.entry_point,
            "packed binary"
        );
        Ok(info)
    }
}

/// Build a composed binary in one call: create, add files, finalize.
pub fn pack<P: AsRef<Path>>(config: PackConfig, paths: &[P]) -> Result<PackedInfo> {
    let mut packer = Packer::create(config)?;
    packer.add_files(paths)?;
    packer.finalize()
}

/// Information about a packed binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedInfo {
    /// Size of the stub, which is also the archive start offset.
    pub stub_size: u64,
    /// Size of the compressed archive.
    pub archive_size: u64,
    /// Size of the encoded footer.
    pub footer_size: u64,
    /// Total size of the composed binary.
    pub total_size: u64,
    /// Number of archived files.
    pub entries: u64,
}

fn append_tree<W: Write>(
    writer: &mut ArchiveWriter<W>,
    source: &Path,
    relative: &Path,
    skip: Option<&Path>,
    seen: &mut HashSet<PathBuf>,
) -> Result<()> {
    let metadata = fs::metadata(source).io_context("stat input", source)?;

    if metadata.is_dir() {
        let mut children = fs::read_dir(source)
            .and_then(|entries| entries.collect::<io::Result<Vec<_>>>())
            .io_context("list directory", source)?;
        children.sort_by_key(|entry| entry.file_name());

        for child in children {
            append_tree(
                writer,
                &child.path(),
                &relative.join(child.file_name()),
                skip,
                seen,
            )?;
        }
    } else if metadata.is_file() {
        if skip.is_some() && fs::canonicalize(source).ok().as_deref() == skip {
            warn!(path = %source.display(), "skipping the output file itself");
            return Ok(());
        }
        if !seen.insert(relative.to_path_buf()) {
            return Err(PackError::DuplicateEntry {
                path: source.to_path_buf(),
                relative_path: relative.to_path_buf(),
            });
        }
        writer.append_file(relative, source)?;
    } else {
        warn!(
            path = %source.display(),
            "skipping input that is neither a file nor a directory"
        );
    }

    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path, stub_metadata: &fs::Metadata) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = (stub_metadata.permissions().mode() & 0o7777) | 0o300;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).io_context("chmod output", path)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _stub_metadata: &fs::Metadata) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::read_footer;

    const STUB: &[u8] = b"#!/bin/sh\necho stub\n";

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let temp_dir = tempfile::tempdir().unwrap();
        let stub_path = temp_dir.path().join("stub");
        fs::write(&stub_path, STUB).unwrap();
        (temp_dir, stub_path)
    }

    #[test]
    fn test_pack_layout() {
        let (temp_dir, stub_path) = setup();
        let input = temp_dir.path().join("a.txt");
        fs::write(&input, b"hi").unwrap();
        let output = temp_dir.path().join("packed");

        let config = PackConfig::new(&stub_path, &output).with_command_line("echo done");
        let info = pack(config, &[&input]).unwrap();

        let bytes = fs::read(&output).unwrap();
        assert_eq!(&bytes[..STUB.len()], STUB);
        assert_eq!(info.stub_size, STUB.len() as u64);
        assert_eq!(info.total_size, bytes.len() as u64);
        assert_eq!(info.entries, 1);

        let trailer_len = u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);
        assert_eq!(trailer_len as u64, info.footer_size);

        let footer_start = bytes.len() - 2 - trailer_len as usize;
        let footer = Footer::decode(&bytes[footer_start..bytes.len() - 2]).unwrap();
        assert_eq!(footer.entry_point, vec!["echo", "done"]);
        assert_eq!(footer.archive_offset as u64, info.archive_size);
        assert_eq!(footer_start as u64 - footer.archive_offset as u64, info.stub_size);
    }

    #[test]
    fn test_add_files_twice() {
        let (temp_dir, stub_path) = setup();
        let input = temp_dir.path().join("a.txt");
        fs::write(&input, b"hi").unwrap();
        let output = temp_dir.path().join("packed");

        let mut packer = Packer::create(PackConfig::new(&stub_path, &output)).unwrap();
        packer.add_files(&[&input]).unwrap();
        let size_after_first = fs::metadata(&output).unwrap().len();

        let result = packer.add_files(&[&input]);
        assert!(matches!(result, Err(PackError::AlreadyPacked)));
        assert_eq!(fs::metadata(&output).unwrap().len(), size_after_first);

        packer.finalize().unwrap();
        assert_eq!(read_footer(&output).unwrap().archive_start, STUB.len() as u64);
    }

    #[test]
    fn test_finalize_without_files() {
        let (temp_dir, stub_path) = setup();
        let output = temp_dir.path().join("packed");

        let packer = Packer::create(PackConfig::new(&stub_path, &output)).unwrap();
        let info = packer.finalize().unwrap();

        assert_eq!(info.archive_size, 0);
        assert_eq!(info.entries, 0);

        let location = read_footer(&output).unwrap();
        assert_eq!(location.footer.archive_offset, 0);
        assert_eq!(location.archive_start, STUB.len() as u64);
        assert_eq!(location.archive_len, 0);
    }

    #[test]
    fn test_empty_input_list() {
        let (temp_dir, stub_path) = setup();
        let output = temp_dir.path().join("packed");

        let info = pack(PackConfig::new(&stub_path, &output), &[] as &[&Path]).unwrap();

        assert_eq!(info.entries, 0);
        assert!(info.archive_size > 0);
    }

    #[test]
    fn test_empty_stub() {
        let temp_dir = tempfile::tempdir().unwrap();
        let stub_path = temp_dir.path().join("stub");
        fs::write(&stub_path, b"").unwrap();
        let input = temp_dir.path().join("a.txt");
        fs::write(&input, b"hi").unwrap();
        let output = temp_dir.path().join("packed");

        let info = pack(PackConfig::new(&stub_path, &output), &[&input]).unwrap();

        assert_eq!(info.stub_size, 0);
        assert_eq!(read_footer(&output).unwrap().archive_start, 0);
    }

    #[test]
    fn test_output_truncated_on_repack() {
        let (temp_dir, stub_path) = setup();
        let output = temp_dir.path().join("packed");
        fs::write(&output, vec![0xFFu8; 64 * 1024]).unwrap();

        let info = Packer::create(PackConfig::new(&stub_path, &output))
            .unwrap()
            .finalize()
            .unwrap();

        assert_eq!(fs::metadata(&output).unwrap().len(), info.total_size);
    }

    #[test]
    fn test_missing_stub() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = PackConfig::new(temp_dir.path().join("nope"), temp_dir.path().join("out"));

        let result = Packer::create(config);
        assert!(matches!(result, Err(PackError::Io { operation: "open stub", .. })));
        assert!(!temp_dir.path().join("out").exists());
    }

    #[test]
    fn test_output_is_stub() {
        let (_temp_dir, stub_path) = setup();

        let result = Packer::create(PackConfig::new(&stub_path, &stub_path));
        assert!(matches!(result, Err(PackError::Io { operation: "create output", .. })));
        assert_eq!(fs::read(&stub_path).unwrap(), STUB);
    }

    #[test]
    fn test_missing_input() {
        let (temp_dir, stub_path) = setup();
        let output = temp_dir.path().join("packed");

        let mut packer = Packer::create(PackConfig::new(&stub_path, &output)).unwrap();
        let result = packer.add_files(&[temp_dir.path().join("missing")]);
        assert!(matches!(result, Err(PackError::Io { operation: "stat input", .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_mode_from_stub() {
        use std::os::unix::fs::PermissionsExt;

        let (temp_dir, stub_path) = setup();
        fs::set_permissions(&stub_path, fs::Permissions::from_mode(0o750)).unwrap();
        let output = temp_dir.path().join("packed");

        Packer::create(PackConfig::new(&stub_path, &output))
            .unwrap()
            .finalize()
            .unwrap();

        let mode = fs::metadata(&output).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o750);
    }

    #[cfg(unix)]
    #[test]
    fn test_repack_from_read_only_stub() {
        use std::os::unix::fs::PermissionsExt;

        let (temp_dir, stub_path) = setup();
        fs::set_permissions(&stub_path, fs::Permissions::from_mode(0o555)).unwrap();
        let input = temp_dir.path().join("a.txt");
        fs::write(&input, b"hi").unwrap();
        let output = temp_dir.path().join("app");

        pack(PackConfig::new(&stub_path, &output), &[&input]).unwrap();
        let mode = fs::metadata(&output).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o755);

        // Overwriting must not depend on running as root.
        let info = pack(
            PackConfig::new(&stub_path, &output).with_command_line("cat a.txt"),
            &[&input],
        )
        .unwrap();
        assert_eq!(fs::metadata(&output).unwrap().len(), info.total_size);
        assert_eq!(
            read_footer(&output).unwrap().footer.entry_point,
            vec!["cat", "a.txt"]
        );
    }

    #[test]
    fn test_duplicate_entry_path() {
        let (temp_dir, stub_path) = setup();
        let first = temp_dir.path().join("x/a.txt");
        let second = temp_dir.path().join("y/a.txt");
        fs::create_dir_all(first.parent().unwrap()).unwrap();
        fs::create_dir_all(second.parent().unwrap()).unwrap();
        fs::write(&first, b"one").unwrap();
        fs::write(&second, b"two").unwrap();
        let output = temp_dir.path().join("packed");

        let result = pack(PackConfig::new(&stub_path, &output), &[&first, &second]);
        match result {
            Err(PackError::DuplicateEntry { path, relative_path }) => {
                assert_eq!(path, second);
                assert_eq!(relative_path, PathBuf::from("a.txt"));
            }
            other => panic!("expected DuplicateEntry, got {:?}", other),
        }
    }

    #[test]
    fn test_same_directory_name_merges() {
        let (temp_dir, stub_path) = setup();
        let first = temp_dir.path().join("x/d");
        let second = temp_dir.path().join("y/d");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("a.txt"), b"one").unwrap();
        fs::write(second.join("b.txt"), b"two").unwrap();
        let output = temp_dir.path().join("packed");

        let info = pack(PackConfig::new(&stub_path, &output), &[&first, &second]).unwrap();
        assert_eq!(info.entries, 2);
    }

    #[test]
    fn test_output_inside_input_dir_is_skipped() {
        let (temp_dir, stub_path) = setup();
        let payload = temp_dir.path().join("payload");
        fs::create_dir_all(&payload).unwrap();
        fs::write(payload.join("a.txt"), b"hi").unwrap();
        let output = payload.join("packed");

        let info = pack(PackConfig::new(&stub_path, &output), &[&payload]).unwrap();
        assert_eq!(info.entries, 1);
    }
}
