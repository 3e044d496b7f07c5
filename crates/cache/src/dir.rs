// Directory-backed stream store using OS file locks

use crate::storage::{CacheStream, OpenMode, StreamId, StreamStore};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Streams stored as files in one directory
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl StreamStore for DirStore {
    fn open(&self, name: &str, mode: OpenMode) -> io::Result<Box<dyn CacheStream>> {
        let path = self.dir.join(name);
        let file = match mode {
            OpenMode::Read => OpenOptions::new().read(true).open(&path)?,
            OpenMode::ReadWrite => {
                fs::create_dir_all(&self.dir)?;
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&path)?
            }
        };
        log::debug!("Opened cache file {} ({:?})", path.display(), mode);
        let path = fs::canonicalize(&path).unwrap_or(path);
        Ok(Box::new(FileStream { file, path }))
    }
}

struct FileStream {
    file: File,
    path: PathBuf,
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for FileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl CacheStream for FileStream {
    fn id(&self) -> StreamId {
        StreamId::File(self.path.clone())
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn lock(&mut self) -> io::Result<()> {
        self.file.lock()
    }

    fn unlock(&mut self) -> io::Result<()> {
        self.file.unlock()
    }
}
