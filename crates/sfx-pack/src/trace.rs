//! Diagnostic I/O tracing.
//!
//! With the `trace-io` feature, the packer and extractor wrap the composed
//! binary in [`TraceIo`], which logs every read, write and seek at trace
//! level. Without it, [`traced`] is the identity and no wrapper exists.

#[cfg(feature = "trace-io")]
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Handle type used for the composed binary.
#[cfg(feature = "trace-io")]
pub type Traced<T> = TraceIo<T>;

/// Handle type used for the composed binary.
#[cfg(not(feature = "trace-io"))]
pub type Traced<T> = T;

/// Wrap `inner` for tracing when the `trace-io` feature is enabled.
#[cfg(feature = "trace-io")]
pub fn traced<T>(inner: T, label: &'static str) -> Traced<T> {
    TraceIo::new(inner, label)
}

/// Wrap `inner` for tracing when the `trace-io` feature is enabled.
#[cfg(not(feature = "trace-io"))]
pub fn traced<T>(inner: T, _label: &'static str) -> Traced<T> {
    inner
}

/// Pass-through reader/writer that logs each operation.
#[cfg(feature = "trace-io")]
#[derive(Debug)]
pub struct TraceIo<T> {
    inner: T,
    label: &'static str,
    position: u64,
}

#[cfg(feature = "trace-io")]
impl<T> TraceIo<T> {
    /// Wrap `inner`. `label` names the stream in log lines.
    pub fn new(inner: T, label: &'static str) -> Self {
        Self {
            inner,
            label,
            position: 0,
        }
    }

    /// Unwrap the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(feature = "trace-io")]
impl<T: Read> Read for TraceIo<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        tracing::trace!(stream = self.label, offset = self.position, len = n, "read");
        self.position += n as u64;
        Ok(n)
    }
}

#[cfg(feature = "trace-io")]
impl<T: Write> Write for TraceIo<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        tracing::trace!(stream = self.label, offset = self.position, len = n, "write");
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        tracing::trace!(stream = self.label, "flush");
        self.inner.flush()
    }
}

#[cfg(feature = "trace-io")]
impl<T: Seek> Seek for TraceIo<T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        tracing::trace!(stream = self.label, ?pos, offset = self.position, "seek");
        Ok(self.position)
    }
}
