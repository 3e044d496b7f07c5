// Persistent cache of synthesised lowpass filter coefficients

pub mod dir;
pub mod index;
pub mod memory;
pub mod storage;

pub use dir::DirStore;
pub use index::{CacheIndex, IndexDefect, IndexRecord};
pub use memory::MemoryStore;
pub use polysrc_core::{ResampleError, Result};
pub use storage::{CacheStream, OpenMode, StreamId, StreamStore};

use polysrc_core::{FilterCoefs, FilterSpec};
use std::io::SeekFrom;
use std::ops::{Deref, DerefMut};
use std::path::Path;

pub const INDEX_STREAM: &str = "lpf.idx";
pub const DATA_STREAM: &str = "lpf.dat";

const TAP_SIZE: u64 = std::mem::size_of::<f64>() as u64;

/// Holds the index stream's exclusive lock until dropped
struct IndexLock<'a> {
    stream: &'a mut Box<dyn CacheStream>,
}

impl<'a> IndexLock<'a> {
    fn acquire(stream: &'a mut Box<dyn CacheStream>) -> Result<Self> {
        stream.lock()?;
        Ok(Self { stream })
    }
}

impl Deref for IndexLock<'_> {
    type Target = dyn CacheStream;

    fn deref(&self) -> &Self::Target {
        self.stream.as_ref()
    }
}

impl DerefMut for IndexLock<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.stream.as_mut()
    }
}

impl Drop for IndexLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.stream.unlock() {
            log::warn!("Failed to release cache index lock: {}", e);
        }
    }
}

/// Filter coefficient cache over an index stream and a data stream.
///
/// The index is a sorted table of filter specs pointing into the data
/// stream, which holds raw little-endian `f64` taps. Every operation holds
/// the index lock for its full duration, so several processes can share a
/// cache directory.
pub struct FilterCache {
    index: Box<dyn CacheStream>,
    data: Box<dyn CacheStream>,
    mode: OpenMode,
}

impl std::fmt::Debug for FilterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterCache").field("mode", &self.mode).finish()
    }
}

impl FilterCache {
    pub fn open(store: &dyn StreamStore, mode: OpenMode) -> Result<Self> {
        let index = store.open(INDEX_STREAM, mode)?;
        let data = store.open(DATA_STREAM, mode)?;
        Ok(Self { index, data, mode })
    }

    /// Open a cache kept as `lpf.idx` / `lpf.dat` in `dir`
    pub fn open_dir(dir: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let dir = dir.as_ref();
        log::info!("Opening filter cache in {} ({:?})", dir.display(), mode);
        Self::open(&DirStore::new(dir), mode)
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(ResampleError::invalid("filter cache is read-only"))
        }
    }

    /// Fetch the taps stored for each spec. Misses, and every spec when the
    /// index is missing or corrupt, come back as `None`.
    pub fn lookup(&mut self, specs: &[FilterSpec]) -> Result<Vec<Option<FilterCoefs>>> {
        let mut found = vec![None; specs.len()];
        let mut lock = IndexLock::acquire(&mut self.index)?;

        let table = match read_index(&mut *lock) {
            Some(table) => table,
            None => return Ok(found),
        };

        for (spec, slot) in specs.iter().zip(found.iter_mut()) {
            if let Some(record) = table.find(spec) {
                match read_taps(self.data.as_mut(), record) {
                    Ok(taps) => *slot = Some(FilterCoefs::new(taps)),
                    Err(e) => log::warn!("Cached filter unreadable, ignoring: {}", e),
                }
            }
        }

        log::debug!(
            "Filter cache lookup: {}/{} hits",
            found.iter().filter(|c| c.is_some()).count(),
            specs.len()
        );
        Ok(found)
    }

    /// Specs currently stored, in index order
    pub fn entries(&mut self) -> Result<Vec<FilterSpec>> {
        let mut lock = IndexLock::acquire(&mut self.index)?;
        Ok(read_index(&mut *lock)
            .map(|table| table.records.iter().map(|r| r.spec).collect())
            .unwrap_or_default())
    }

    /// Add filters. Specs already present keep their stored taps; duplicate
    /// specs within the batch keep the first.
    pub fn store(&mut self, specs: &[FilterSpec], coefs: &[FilterCoefs]) -> Result<()> {
        self.ensure_writable()?;
        if specs.len() != coefs.len() {
            return Err(ResampleError::invalid(format!(
                "{} specs but {} coefficient sets",
                specs.len(),
                coefs.len()
            )));
        }
        if specs.is_empty() {
            return Ok(());
        }

        // offset holds the batch position until the taps are written
        let mut batch: Vec<IndexRecord> = specs
            .iter()
            .zip(coefs)
            .enumerate()
            .map(|(i, (spec, c))| IndexRecord {
                spec: *spec,
                offset: i as i64,
                count: c.len() as i64,
            })
            .collect();
        batch.sort_by(|a, b| a.spec.cmp(&b.spec));
        batch.dedup_by(|a, b| a.spec == b.spec);

        let mut lock = IndexLock::acquire(&mut self.index)?;
        let existing = read_index(&mut *lock).unwrap_or_default();
        let rebuild = existing.records.is_empty();
        let merged = index::merge(&existing.records, &batch);
        if merged.fresh.is_empty() {
            log::debug!("Filter cache already holds all {} filters", specs.len());
            return Ok(());
        }

        let data = self.data.as_mut();
        let mut offset = if rebuild {
            data.truncate(0)?;
            0
        } else {
            data.seek(SeekFrom::End(0))?
        };
        data.seek(SeekFrom::Start(offset))?;

        let mut records = merged.records;
        for &pos in &merged.fresh {
            let record = &mut records[pos];
            let taps = &coefs[record.offset as usize].taps;
            write_taps(data, taps)?;
            record.offset = offset as i64;
            offset += taps.len() as u64 * TAP_SIZE;
        }
        data.flush()?;

        write_index(&mut *lock, &CacheIndex { records })?;
        log::info!("Stored {} new filters in cache", merged.fresh.len());
        Ok(())
    }

    /// Copy every filter from `src` that this cache lacks. Importing a
    /// cache into another handle on the same storage does nothing.
    pub fn import(&mut self, src: &mut FilterCache) -> Result<()> {
        self.ensure_writable()?;
        if self.index.id() == src.index.id() {
            log::debug!("Import source shares storage with the destination, skipping");
            return Ok(());
        }

        let mut dst_index = IndexLock::acquire(&mut self.index)?;
        let mut src_index = IndexLock::acquire(&mut src.index)?;

        let incoming = match read_index(&mut *src_index) {
            Some(table) => table,
            None => return Ok(()),
        };
        let existing = read_index(&mut *dst_index).unwrap_or_default();
        let rebuild = existing.records.is_empty();
        let merged = index::merge(&existing.records, &incoming.records);
        if merged.fresh.is_empty() {
            return Ok(());
        }

        let data = self.data.as_mut();
        let mut offset = if rebuild {
            data.truncate(0)?;
            0
        } else {
            data.seek(SeekFrom::End(0))?
        };

        let mut records = merged.records;
        for &pos in &merged.fresh {
            let record = &mut records[pos];
            let taps = read_taps(src.data.as_mut(), record)?;
            data.seek(SeekFrom::Start(offset))?;
            write_taps(data, &taps)?;
            record.offset = offset as i64;
            offset += taps.len() as u64 * TAP_SIZE;
        }
        data.flush()?;
        drop(src_index);

        write_index(&mut *dst_index, &CacheIndex { records })?;
        log::info!("Imported {} filters into cache", merged.fresh.len());
        Ok(())
    }

    /// Remove every stored filter
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_writable()?;
        let mut lock = IndexLock::acquire(&mut self.index)?;
        lock.truncate(0)?;
        self.data.truncate(0)?;
        log::info!("Filter cache cleared");
        Ok(())
    }
}

/// Read and decode the index; any defect reads as an empty cache
fn read_index(stream: &mut dyn CacheStream) -> Option<CacheIndex> {
    let bytes = match read_all(stream) {
        Ok(bytes) if bytes.is_empty() => return None,
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Filter cache index unreadable, treating as empty: {}", e);
            return None;
        }
    };

    match CacheIndex::decode(&bytes) {
        Ok(table) => Some(table),
        Err(defect) => {
            log::warn!("Filter cache index corrupt ({:?}), treating as empty", defect);
            None
        }
    }
}

fn read_all(stream: &mut dyn CacheStream) -> Result<Vec<u8>> {
    let len = stream.size()?;
    let mut bytes = Vec::new();
    bytes.try_reserve_exact(len as usize)?;
    bytes.resize(len as usize, 0);
    stream.seek(SeekFrom::Start(0))?;
    stream.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn write_index(stream: &mut dyn CacheStream, table: &CacheIndex) -> Result<()> {
    let bytes = table.encode()?;
    stream.truncate(0)?;
    stream.seek(SeekFrom::Start(0))?;
    stream.write_all(&bytes)?;
    stream.flush()?;
    Ok(())
}

fn read_taps(data: &mut dyn CacheStream, record: &IndexRecord) -> Result<Vec<f64>> {
    if record.offset < 0 || record.count <= 0 {
        return Err(ResampleError::External(format!(
            "bad cache record: offset {}, count {}",
            record.offset, record.count
        )));
    }
    let len = (record.count as u64)
        .checked_mul(TAP_SIZE)
        .ok_or(ResampleError::OutOfMemory)?;
    let mut bytes = Vec::new();
    bytes.try_reserve_exact(len as usize)?;
    bytes.resize(len as usize, 0);

    data.seek(SeekFrom::Start(record.offset as u64))?;
    data.read_exact(&mut bytes)?;

    Ok(bytes
        .chunks_exact(TAP_SIZE as usize)
        .map(|b| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(b);
            f64::from_le_bytes(raw)
        })
        .collect())
}

fn write_taps(data: &mut dyn CacheStream, taps: &[f64]) -> Result<()> {
    let mut bytes = Vec::with_capacity(taps.len() * TAP_SIZE as usize);
    for t in taps {
        bytes.extend_from_slice(&t.to_le_bytes());
    }
    data.write_all(&bytes)?;
    Ok(())
}
