//! Virtual pipes.
//!
//! These types mimic much of the behavior of Unix pipes and are how the
//! standard streams are wired into the descriptor table: any `Read` can back
//! stdin and any `Write` can back stdout or stderr. Convenience `From` impls
//! cover common backing types like `Vec<u8>` and `String`.
//!
//! Pipes are not seekable; offset-taking operations on them fail with
//! `Spipe`.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

/// A virtual pipe read end.
///
/// ```
/// let builder = wasi_hostfs::WasiFs::builder(std::env::temp_dir())
///     .stdin(wasi_hostfs::pipe::ReadPipe::from("hello from stdin!"));
/// ```
#[derive(Clone)]
pub struct ReadPipe {
    reader: Arc<Mutex<dyn Read + Send>>,
}

impl ReadPipe {
    /// Create a new pipe from a `Read` type.
    ///
    /// All read operations on the descriptor delegate to this reader.
    pub fn new(r: impl Read + Send + 'static) -> Self {
        Self::from_shared(Arc::new(Mutex::new(r)))
    }

    /// Create a new pipe from a shareable `Read` type.
    pub fn from_shared(reader: Arc<Mutex<dyn Read + Send>>) -> Self {
        Self { reader }
    }

    pub(crate) fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.lock().unwrap().read(buf)
    }
}

impl From<Vec<u8>> for ReadPipe {
    fn from(r: Vec<u8>) -> Self {
        Self::new(io::Cursor::new(r))
    }
}

impl From<&[u8]> for ReadPipe {
    fn from(r: &[u8]) -> Self {
        Self::from(r.to_vec())
    }
}

impl From<String> for ReadPipe {
    fn from(r: String) -> Self {
        Self::new(io::Cursor::new(r.into_bytes()))
    }
}

impl From<&str> for ReadPipe {
    fn from(r: &str) -> Self {
        Self::from(r.to_string())
    }
}

/// A virtual pipe write end.
///
/// The backing writer is shared, so output written by the guest can be
/// inspected by the embedder afterwards:
///
/// ```
/// use std::sync::{Arc, Mutex};
/// let stdout: Arc<Mutex<Vec<u8>>> = Default::default();
/// let pipe = wasi_hostfs::pipe::WritePipe::from_shared(stdout.clone());
/// // ... run the guest ...
/// let captured = stdout.lock().unwrap();
/// ```
#[derive(Clone)]
pub struct WritePipe {
    writer: Arc<Mutex<dyn Write + Send>>,
}

impl WritePipe {
    /// Create a new pipe from a `Write` type.
    ///
    /// All write operations on the descriptor delegate to this writer.
    pub fn new(w: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(w)),
        }
    }

    /// Create a new pipe sharing a `Vec<u8>` buffer with the embedder.
    pub fn from_shared(buffer: Arc<Mutex<Vec<u8>>>) -> Self {
        Self::new(SharedVecWriter(buffer))
    }

    pub(crate) fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.writer.lock().unwrap().write(buf)
    }

    pub(crate) fn flush(&self) -> io::Result<()> {
        self.writer.lock().unwrap().flush()
    }
}

struct SharedVecWriter(Arc<Mutex<Vec<u8>>>);

impl Write for SharedVecWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
