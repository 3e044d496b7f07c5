// Cache index encoding and merging

use polysrc_core::{FilterSpec, ResampleError, Result};
use serde::{Deserialize, Serialize};

pub const INDEX_TAG: u32 = 0x6673_7263;
pub const INDEX_REVISION: u32 = 0;

/// Encoded header size in bytes
pub const HEADER_SIZE: u64 = 8;
/// Encoded record size in bytes
pub const RECORD_SIZE: u64 = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct IndexHeader {
    tag: u32,
    revision: u32,
}

/// One cached filter: where its taps live in the data stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub spec: FilterSpec,
    pub offset: i64,
    pub count: i64,
}

/// Records sorted ascending by spec
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheIndex {
    pub records: Vec<IndexRecord>,
}

/// Why an index could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexDefect {
    Empty,
    BadSize(u64),
    BadHeader,
}

impl CacheIndex {
    /// Records expected in an index of `len` bytes
    pub fn record_count(len: u64) -> std::result::Result<usize, IndexDefect> {
        if len == 0 {
            return Err(IndexDefect::Empty);
        }
        if len < HEADER_SIZE {
            return Err(IndexDefect::BadSize(len));
        }
        let body = len - HEADER_SIZE;
        if body % RECORD_SIZE != 0 || body == 0 {
            return Err(IndexDefect::BadSize(len));
        }
        Ok((body / RECORD_SIZE) as usize)
    }

    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, IndexDefect> {
        let count = Self::record_count(bytes.len() as u64)?;

        let header: IndexHeader =
            bincode::deserialize(&bytes[..HEADER_SIZE as usize]).map_err(|_| IndexDefect::BadHeader)?;
        if header.tag != INDEX_TAG || header.revision != INDEX_REVISION {
            return Err(IndexDefect::BadHeader);
        }

        let records = bytes[HEADER_SIZE as usize..]
            .chunks_exact(RECORD_SIZE as usize)
            .map(bincode::deserialize::<IndexRecord>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| IndexDefect::BadSize(bytes.len() as u64))?;
        debug_assert_eq!(records.len(), count);

        Ok(Self { records })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.try_reserve_exact(HEADER_SIZE as usize + self.records.len() * RECORD_SIZE as usize)?;

        let header = IndexHeader {
            tag: INDEX_TAG,
            revision: INDEX_REVISION,
        };
        bincode::serialize_into(&mut out, &header).map_err(encode_error)?;
        for record in &self.records {
            bincode::serialize_into(&mut out, record).map_err(encode_error)?;
        }
        Ok(out)
    }

    pub fn find(&self, spec: &FilterSpec) -> Option<&IndexRecord> {
        self.records
            .binary_search_by(|r| r.spec.cmp(spec))
            .ok()
            .map(|i| &self.records[i])
    }
}

fn encode_error(err: bincode::Error) -> ResampleError {
    ResampleError::External(format!("index encoding failed: {}", err))
}

/// Result of merging new records into an existing index
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub records: Vec<IndexRecord>,
    /// Positions in `records` that came from the new side
    pub fresh: Vec<usize>,
}

/// Stable merge of two sorted record lists. On equal specs the existing
/// record wins and the new one is dropped.
pub fn merge(existing: &[IndexRecord], new: &[IndexRecord]) -> Merged {
    let mut records = Vec::with_capacity(existing.len() + new.len());
    let mut fresh = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < existing.len() && j < new.len() {
        match existing[i].spec.cmp(&new[j].spec) {
            std::cmp::Ordering::Less => {
                records.push(existing[i]);
                i += 1;
            }
            std::cmp::Ordering::Equal => {
                records.push(existing[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Greater => {
                fresh.push(records.len());
                records.push(new[j]);
                j += 1;
            }
        }
    }
    records.extend_from_slice(&existing[i..]);
    for record in &new[j..] {
        fresh.push(records.len());
        records.push(*record);
    }

    Merged { records, fresh }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(edge: f64, offset: i64) -> IndexRecord {
        IndexRecord {
            spec: FilterSpec {
                passband_edge: edge,
                stopband_edge: edge + 0.1,
                passband_ripple: 1e-3,
                stopband_ripple: 1e-6,
                flags: 0,
            },
            offset,
            count: 16,
        }
    }

    #[test]
    fn encoded_sizes_are_fixed() {
        let header = IndexHeader {
            tag: INDEX_TAG,
            revision: INDEX_REVISION,
        };
        assert_eq!(bincode::serialized_size(&header).unwrap(), HEADER_SIZE);
        assert_eq!(bincode::serialized_size(&record(0.1, 0)).unwrap(), RECORD_SIZE);
    }

    #[test]
    fn encode_decode_and_find() {
        let index = CacheIndex {
            records: vec![record(0.1, 0), record(0.2, 128)],
        };
        let bytes = index.encode().unwrap();
        assert_eq!(&bytes[..4], &INDEX_TAG.to_le_bytes());

        let decoded = CacheIndex::decode(&bytes).unwrap();
        assert_eq!(decoded, index);
        assert_eq!(decoded.find(&record(0.2, 0).spec).unwrap().offset, 128);
        assert!(decoded.find(&record(0.3, 0).spec).is_none());
    }

    #[test]
    fn defects_detected() {
        assert_eq!(CacheIndex::decode(&[]), Err(IndexDefect::Empty));
        assert_eq!(CacheIndex::decode(&[0; 8]), Err(IndexDefect::BadSize(8)));
        assert_eq!(CacheIndex::decode(&[0; 60]), Err(IndexDefect::BadHeader));
        assert_eq!(CacheIndex::decode(&[0; 61]), Err(IndexDefect::BadSize(61)));
    }

    #[test]
    fn merge_keeps_existing_on_ties() {
        let existing = [record(0.1, 0), record(0.3, 100)];
        let new = [record(0.2, 0), record(0.3, 1), record(0.4, 2)];
        let merged = merge(&existing, &new);

        let edges: Vec<f64> = merged.records.iter().map(|r| r.spec.passband_edge).collect();
        assert_eq!(edges, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(merged.records[2].offset, 100);
        assert_eq!(merged.fresh, vec![1, 3]);
    }

    #[test]
    fn merge_into_empty() {
        let new = [record(0.1, 0), record(0.2, 1)];
        let merged = merge(&[], &new);
        assert_eq!(merged.records.len(), 2);
        assert_eq!(merged.fresh, vec![0, 1]);
    }
}
