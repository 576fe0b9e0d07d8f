//! Roaring-backed set of 64-bit series ids.

use crate::error::IndexError;
use roaring::RoaringTreemap;
use std::io::Write;

/// Self-serializing set of series ids.
#[derive(Debug, Clone, Default)]
pub struct SeriesIdSet {
    bitmap: RoaringTreemap,
}

impl SeriesIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id`; returns true if it was not present.
    pub fn add(&mut self, id: u64) -> bool {
        self.bitmap.insert(id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.bitmap.contains(id)
    }

    pub fn cardinality(&self) -> u64 {
        self.bitmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    pub fn max(&self) -> Option<u64> {
        self.bitmap.max()
    }

    /// Union in place.
    pub fn merge_in_place(&mut self, other: &SeriesIdSet) {
        self.bitmap |= &other.bitmap;
    }

    /// Intersection.
    pub fn and(&self, other: &SeriesIdSet) -> SeriesIdSet {
        SeriesIdSet {
            bitmap: &self.bitmap & &other.bitmap,
        }
    }

    /// Iterates ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.bitmap.iter()
    }

    pub fn for_each(&self, mut f: impl FnMut(u64)) {
        for id in self.bitmap.iter() {
            f(id);
        }
    }

    /// Returns a copy with every id shifted by `delta`.
    pub fn shifted(&self, delta: u64) -> SeriesIdSet {
        self.iter().map(|id| id + delta).collect()
    }

    pub fn serialized_size(&self) -> usize {
        self.bitmap.serialized_size()
    }

    /// Writes the portable roaring serialization; returns the number of bytes written.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<u64, IndexError> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.bitmap.serialize_into(&mut buf)?;
        w.write_all(&buf)?;
        Ok(buf.len() as u64)
    }

    /// Parses bytes produced by [`Self::write_to`].
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self, IndexError> {
        let bitmap = RoaringTreemap::deserialize_from(data)
            .map_err(|e| IndexError::corruption(format!("Invalid series id bitmap: {}", e)))?;
        Ok(Self { bitmap })
    }
}

impl FromIterator<u64> for SeriesIdSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self {
            bitmap: iter.into_iter().collect(),
        }
    }
}

impl Extend<u64> for SeriesIdSet {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        self.bitmap.extend(iter);
    }
}
