// Named byte streams backing the filter cache

use std::io::{self, Read, Seek, Write};
use std::path::PathBuf;

/// Access requested when opening a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    ReadWrite,
}

impl OpenMode {
    pub fn is_writable(&self) -> bool {
        *self == OpenMode::ReadWrite
    }
}

/// Backing storage of a stream. Streams with equal ids share one lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamId {
    File(PathBuf),
    Memory(usize),
}

/// Seekable byte stream with an exclusive advisory lock
pub trait CacheStream: Read + Write + Seek + Send {
    fn id(&self) -> StreamId;

    /// Current length in bytes
    fn size(&mut self) -> io::Result<u64>;

    /// Set the length to `len` bytes. The stream position is not moved.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Block until the exclusive lock is held
    fn lock(&mut self) -> io::Result<()>;

    fn unlock(&mut self) -> io::Result<()>;
}

/// Opens named streams, e.g. files in a directory
pub trait StreamStore {
    fn open(&self, name: &str, mode: OpenMode) -> io::Result<Box<dyn CacheStream>>;
}

pub(crate) fn read_only_error() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "stream opened read-only")
}
