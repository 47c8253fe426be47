//! Byte stream contracts consumed by the serialization protocol.
//!
//! Concrete streams (files, sockets, string buffers) live outside the core;
//! all the protocol needs is `Read`/`Write` plus, when available, the current
//! position for diagnostics.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Write};

/// Readable byte stream
pub trait InputStream: Read {
    /// Bytes consumed so far, if the stream knows
    fn position(&self) -> Option<u64> {
        None
    }
}

/// Writable byte stream
pub trait OutputStream: Write {}

impl<W: Write> OutputStream for W {}

impl<T: AsRef<[u8]>> InputStream for Cursor<T> {
    fn position(&self) -> Option<u64> {
        Some(Cursor::position(self))
    }
}

impl InputStream for &[u8] {}

impl InputStream for File {}

impl<R: Read> InputStream for BufReader<R> {}

impl<S: InputStream + ?Sized> InputStream for Box<S> {
    fn position(&self) -> Option<u64> {
        (**self).position()
    }
}

/// Counts the bytes read from any reader, giving it a position.
pub struct Tracked<R> {
    inner: R,
    consumed: u64,
}

impl<R: Read> Tracked<R> {
    /// Wrap a reader
    pub fn new(inner: R) -> Self {
        Self { inner, consumed: 0 }
    }

    /// Unwrap the reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

impl<R: Read> InputStream for Tracked<R> {
    fn position(&self) -> Option<u64> {
        Some(self.consumed)
    }
}

/// Counts the bytes written through a writer.
pub struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
