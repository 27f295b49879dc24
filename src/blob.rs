//! Byte storage behind request targets.
//!
//! Coders never touch the filesystem directly; they go through the
//! dispatcher's [`BlobStore`]. [`FileBlobs`] is the default.
//! [`MemoryBlobs`] keeps everything in memory, which is what the tests use.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// Destination stream for one encode.
///
/// Writers must call [`close`](BlobSink::close) exactly once when done;
/// sinks that buffer only publish their contents on close.
pub trait BlobSink: Write + Send {
    /// Flush and publish the written bytes.
    fn close(&mut self) -> io::Result<()>;
}

/// Named byte storage used to resolve request targets.
pub trait BlobStore: Send + Sync {
    /// Entire contents of `path`.
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// A fresh sink for `path`, replacing any previous contents on close.
    fn create(&self, path: &str) -> io::Result<Box<dyn BlobSink>>;

    /// Entire contents behind an already-open file descriptor.
    fn read_descriptor(&self, fd: i32) -> io::Result<Vec<u8>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("descriptor {fd} is not readable from this blob store"),
        ))
    }
}

/// Blobs on the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileBlobs;

impl BlobStore for FileBlobs {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn create(&self, path: &str) -> io::Result<Box<dyn BlobSink>> {
        let file = File::create(path)?;
        Ok(Box::new(FileSink(BufWriter::new(file))))
    }

    #[cfg(unix)]
    fn read_descriptor(&self, fd: i32) -> io::Result<Vec<u8>> {
        // Reopening through /dev/fd leaves the caller's descriptor untouched.
        std::fs::read(format!("/dev/fd/{fd}"))
    }
}

struct FileSink(BufWriter<File>);

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl BlobSink for FileSink {
    fn close(&mut self) -> io::Result<()> {
        self.0.flush()?;
        self.0.get_ref().sync_all()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    blobs: BTreeMap<String, Vec<u8>>,
    descriptors: BTreeMap<i32, Vec<u8>>,
}

/// In-memory blob store. Clones share the same contents.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobs {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBlobs {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave the maps half-updated.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `bytes` under `path`, replacing any previous contents.
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.state().blobs.insert(path.into(), bytes.into());
    }

    /// Make `bytes` readable through descriptor `fd`.
    pub fn insert_descriptor(&self, fd: i32, bytes: impl Into<Vec<u8>>) {
        self.state().descriptors.insert(fd, bytes.into());
    }

    /// Stored names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.state().blobs.keys().cloned().collect()
    }

    /// Contents of a published blob.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.state().blobs.get(path).cloned()
    }

    /// Number of published blobs.
    pub fn len(&self) -> usize {
        self.state().blobs.len()
    }

    /// Whether nothing has been published.
    pub fn is_empty(&self) -> bool {
        self.state().blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobs {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no blob named `{path}`"))
        })
    }

    fn create(&self, path: &str) -> io::Result<Box<dyn BlobSink>> {
        Ok(Box::new(MemorySink {
            store: self.clone(),
            path: path.to_string(),
            buf: Vec::new(),
            closed: false,
        }))
    }

    fn read_descriptor(&self, fd: i32) -> io::Result<Vec<u8>> {
        let bytes = self.state().descriptors.get(&fd).cloned();
        bytes.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("descriptor {fd} is not open"),
            )
        })
    }
}

/// Buffers writes and publishes them to the store on close.
struct MemorySink {
    store: MemoryBlobs,
    path: String,
    buf: Vec<u8>,
    closed: bool,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "sink already closed",
            ));
        }
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobSink for MemorySink {
    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "sink already closed",
            ));
        }
        self.closed = true;
        let bytes = std::mem::take(&mut self.buf);
        self.store.insert(self.path.clone(), bytes);
        Ok(())
    }
}
