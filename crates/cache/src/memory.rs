// In-process stream store

use crate::storage::{read_only_error, CacheStream, OpenMode, StreamId, StreamStore};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

#[derive(Default)]
struct MemFile {
    data: Mutex<Vec<u8>>,
    locked: Mutex<bool>,
    condvar: Condvar,
}

/// Streams held in memory. Clones share the same streams, so a cache can be
/// reopened through a clone to observe what an earlier instance stored.
#[derive(Clone, Default)]
pub struct MemoryStore {
    files: Arc<Mutex<HashMap<String, Arc<MemFile>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stream's bytes
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(name).map(|f| f.data.lock().clone())
    }

    /// Replace a stream's bytes, creating it if needed
    pub fn set_contents(&self, name: &str, bytes: &[u8]) {
        let file = self.files.lock().entry(name.to_string()).or_default().clone();
        *file.data.lock() = bytes.to_vec();
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let files = self.files.lock();
        f.debug_struct("MemoryStore")
            .field("streams", &files.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StreamStore for MemoryStore {
    fn open(&self, name: &str, mode: OpenMode) -> io::Result<Box<dyn CacheStream>> {
        let mut files = self.files.lock();
        let file = match mode {
            OpenMode::Read => files
                .get(name)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?,
            OpenMode::ReadWrite => files.entry(name.to_string()).or_default().clone(),
        };
        Ok(Box::new(MemoryStream {
            file,
            pos: 0,
            writable: mode.is_writable(),
            holds_lock: false,
        }))
    }
}

struct MemoryStream {
    file: Arc<MemFile>,
    pos: u64,
    writable: bool,
    holds_lock: bool,
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.file.data.lock();
        let start = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(read_only_error());
        }
        let mut data = self.file.data.lock();
        let start = self.pos as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.file.data.lock().len() as i64;
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(off) => len + off,
            SeekFrom::Current(off) => self.pos as i64 + off,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl CacheStream for MemoryStream {
    fn id(&self) -> StreamId {
        StreamId::Memory(Arc::as_ptr(&self.file) as usize)
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file.data.lock().len() as u64)
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        if !self.writable {
            return Err(read_only_error());
        }
        self.file.data.lock().resize(len as usize, 0);
        Ok(())
    }

    fn lock(&mut self) -> io::Result<()> {
        if self.holds_lock {
            return Ok(());
        }
        let mut locked = self.file.locked.lock();
        while *locked {
            self.file.condvar.wait(&mut locked);
        }
        *locked = true;
        self.holds_lock = true;
        Ok(())
    }

    fn unlock(&mut self) -> io::Result<()> {
        if self.holds_lock {
            *self.file.locked.lock() = false;
            self.holds_lock = false;
            self.file.condvar.notify_one();
        }
        Ok(())
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        let _ = self.unlock();
    }
}
