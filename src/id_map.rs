//! Grid-local id to series-file id table.
//!
//! Encoded as `count:u64` followed by `count` pairs of `(index_id:u64, series_file_id:u64)`
//! sorted by index id, so a reader can binary search the bytes without decoding them.

use crate::encoding::{write_u64, SliceReader};
use crate::error::IndexError;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::Write;

const PAIR_SIZE: usize = 16;
const COUNT_SIZE: usize = 8;

/// Mutable, in-memory id map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap {
    ids: BTreeMap<u64, u64>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index_id: u64, series_file_id: u64) -> Option<u64> {
        self.ids.insert(index_id, series_file_id)
    }

    pub fn get(&self, index_id: u64) -> Option<u64> {
        self.ids.get(&index_id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn encoded_size(&self) -> usize {
        COUNT_SIZE + self.ids.len() * PAIR_SIZE
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), IndexError> {
        write_u64(w, self.ids.len() as u64)?;
        for (&k, &v) in &self.ids {
            write_u64(w, k)?;
            write_u64(w, v)?;
        }
        Ok(())
    }
}

impl FromIterator<(u64, u64)> for IdMap {
    fn from_iter<I: IntoIterator<Item = (u64, u64)>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Read-only view over an encoded id map.
#[derive(Debug, Clone, Default)]
pub struct IdMapView {
    data: Bytes,
    len: usize,
}

impl IdMapView {
    /// Validates the header and size; pairs are read lazily.
    pub fn parse(data: Bytes) -> Result<Self, IndexError> {
        let count = SliceReader::new(&data).read_u64()?;
        let len = usize::try_from(count)
            .ok()
            .filter(|n| {
                n.checked_mul(PAIR_SIZE)
                    .and_then(|s| s.checked_add(COUNT_SIZE))
                    == Some(data.len())
            })
            .ok_or_else(|| {
                IndexError::corruption(format!(
                    "Id map of {} bytes cannot hold {} pairs",
                    data.len(),
                    count
                ))
            })?;
        Ok(Self { data, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn pair(&self, i: usize) -> (u64, u64) {
        let at = COUNT_SIZE + i * PAIR_SIZE;
        let mut k = [0u8; 8];
        let mut v = [0u8; 8];
        k.copy_from_slice(&self.data[at..at + 8]);
        v.copy_from_slice(&self.data[at + 8..at + 16]);
        (u64::from_be_bytes(k), u64::from_be_bytes(v))
    }

    pub fn get(&self, index_id: u64) -> Option<u64> {
        let (mut lo, mut hi) = (0usize, self.len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (k, v) = self.pair(mid);
            match k.cmp(&index_id) {
                std::cmp::Ordering::Equal => return Some(v),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        (0..self.len).map(|i| self.pair(i))
    }
}
