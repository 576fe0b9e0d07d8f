//! Measurement block: per-measurement metadata plus a hashed name index.
//!
//! Layout: `[pad:u8][elem]*[hash index][trailer]`. Element and hash-slot offsets are
//! relative to the start of the block; the pad byte keeps 0 free to mean "empty slot".
//!
//! Elem: `grid_block:(u64,u64), grid_count:u64, {offset:u64, size:u64}*, name:uvarint+bytes,
//! measurement_id:uvarint, series_n:uvarint, series:uvarint+bytes, id_map:uvarint+bytes`.

use crate::encoding::{
    utf8, write_u16, write_u64, write_u8, write_var_prefixed, write_var_u64, BlockRange,
    CountingWriter, SliceReader,
};
use crate::error::IndexError;
use crate::grid_index::MAX_LOCAL_ID;
use crate::id_map::{IdMap, IdMapView};
use crate::measurement::series_id_with_measurement_id;
use crate::rhh::{dist, hash_key, HashIndexBuilder};
use crate::series_set::SeriesIdSet;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::Write;

/// Target fill percentage of the hash index.
pub const LOAD_FACTOR: u64 = 80;

pub const MEASUREMENT_BLOCK_VERSION: u16 = 1;

/// data offset/size, hash index offset/size, version.
pub const MEASUREMENT_TRAILER_SIZE: usize = 8 + 8 + 8 + 8 + 2;

const HASH_CAPACITY_SIZE: u64 = 8;
const HASH_SLOT_SIZE: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeasurementBlockTrailer {
    pub data: BlockRange,
    pub hash_index: BlockRange,
    pub version: u16,
}

impl MeasurementBlockTrailer {
    /// Reads the trailer from the tail of a measurement block.
    pub fn read(block: &[u8]) -> Result<Self, IndexError> {
        let start = block.len().checked_sub(MEASUREMENT_TRAILER_SIZE).ok_or_else(|| {
            IndexError::corruption(format!(
                "Measurement block of {} bytes is shorter than its trailer",
                block.len()
            ))
        })?;
        let mut r = SliceReader::new(&block[start..]);
        let data = BlockRange::read_from(&mut r)?;
        let hash_index = BlockRange::read_from(&mut r)?;
        let version = r.read_u16()?;
        if version != MEASUREMENT_BLOCK_VERSION {
            return Err(IndexError::UnsupportedVersion {
                what: "measurement block",
                version,
            });
        }
        Ok(Self {
            data,
            hash_index,
            version,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), IndexError> {
        self.data.write_to(w)?;
        self.hash_index.write_to(w)?;
        write_u16(w, self.version)?;
        Ok(())
    }
}

/// One decoded measurement entry.
#[derive(Debug, Clone)]
pub struct MeasurementBlockElem {
    name: String,
    measurement_id: u64,
    grid_block: BlockRange,
    grids: Vec<BlockRange>,
    series_n: u64,
    series_data: Bytes,
    id_map: IdMapView,
    size: usize,
}

impl MeasurementBlockElem {
    /// Parses the element starting at `block[offset]`, never reading past `end`.
    fn parse(block: &Bytes, offset: usize, end: usize) -> Result<Self, IndexError> {
        if offset >= end || end > block.len() {
            return Err(IndexError::corruption(format!(
                "Measurement element offset {} outside data section ending at {}",
                offset, end
            )));
        }
        let region = block.slice(offset..end);
        let mut r = SliceReader::new(&region);

        let grid_block = BlockRange::read_from(&mut r)?;
        let grid_count = r.read_u64()?;
        let mut grids = Vec::new();
        for _ in 0..grid_count {
            grids.push(BlockRange::read_from(&mut r)?);
        }
        let name = utf8(r.read_var_prefixed()?)?;
        let measurement_id = r.read_var_u64()?;
        if measurement_id > MAX_LOCAL_ID {
            return Err(IndexError::corruption(format!(
                "Measurement id {} does not fit in 32 bits",
                measurement_id
            ))
            .in_measurement(&name));
        }
        let series_n = r.read_var_u64()?;

        let series_len = r.read_var_u64()?;
        let series_start = r.position();
        r.read_bytes(series_len)?;
        let series_data = region.slice(series_start..r.position());

        let map_len = r.read_var_u64()?;
        let map_start = r.position();
        r.read_bytes(map_len)?;
        let id_map = IdMapView::parse(region.slice(map_start..r.position()))
            .map_err(|e| e.in_measurement(&name))?;

        Ok(Self {
            name,
            measurement_id,
            grid_block,
            grids,
            series_n,
            series_data,
            id_map,
            size: r.position(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn measurement_id(&self) -> u64 {
        self.measurement_id
    }

    /// Byte range of all this measurement's grids.
    pub fn grid_block(&self) -> BlockRange {
        self.grid_block
    }

    /// Byte range of each grid, in grid creation order.
    pub fn grids(&self) -> &[BlockRange] {
        &self.grids
    }

    /// Number of series recorded at compaction time.
    pub fn series_n(&self) -> u64 {
        self.series_n
    }

    pub fn series_data(&self) -> &[u8] {
        &self.series_data
    }

    /// Encoded size of this element.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Global index ids of every series of this measurement.
    pub fn series_id_set(&self) -> Result<SeriesIdSet, IndexError> {
        SeriesIdSet::unmarshal_binary(&self.series_data).map_err(|e| e.in_measurement(&self.name))
    }

    pub fn id_map(&self) -> &IdMapView {
        &self.id_map
    }

    /// Series-file id recorded for a grid-local id.
    pub fn series_file_id(&self, local_id: u64) -> Option<u64> {
        self.id_map.get(local_id)
    }

    /// Externally visible id of a grid-local id.
    ///
    /// Without an id map this is the namespaced index id; with one it is the series-file id,
    /// and ids missing from the map are not reported.
    pub fn format_id(&self, local_id: u64) -> Option<u64> {
        if self.id_map.is_empty() {
            Some(series_id_with_measurement_id(
                self.measurement_id,
                local_id,
            ))
        } else {
            self.id_map.get(local_id)
        }
    }
}

/// Read-only view over an encoded measurement block.
#[derive(Debug, Clone)]
pub struct MeasurementBlock {
    block: Bytes,
    trailer: MeasurementBlockTrailer,
    hash_capacity: u64,
}

impl MeasurementBlock {
    pub fn unmarshal_binary(block: Bytes) -> Result<Self, IndexError> {
        let trailer = MeasurementBlockTrailer::read(&block)?;
        let body_len = block.len() - MEASUREMENT_TRAILER_SIZE;
        trailer.data.bounds(body_len)?;
        let hash = trailer.hash_index.slice(&block[..body_len])?;

        let hash_capacity = SliceReader::new(hash).read_u64()?;
        let expected = hash_capacity
            .checked_mul(HASH_SLOT_SIZE)
            .and_then(|s| s.checked_add(HASH_CAPACITY_SIZE));
        if !hash_capacity.is_power_of_two() || expected != Some(trailer.hash_index.size) {
            return Err(IndexError::corruption(format!(
                "Hash index of {} bytes does not match capacity {}",
                trailer.hash_index.size, hash_capacity
            )));
        }

        Ok(Self {
            block,
            trailer,
            hash_capacity,
        })
    }

    pub fn trailer(&self) -> &MeasurementBlockTrailer {
        &self.trailer
    }

    fn data_end(&self) -> usize {
        (self.trailer.data.offset + self.trailer.data.size) as usize
    }

    fn slot(&self, pos: u64) -> u64 {
        let at = (self.trailer.hash_index.offset + HASH_CAPACITY_SIZE + pos * HASH_SLOT_SIZE)
            as usize;
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.block[at..at + 8]);
        u64::from_be_bytes(b)
    }

    /// Looks up a measurement by name through the hash index.
    pub fn elem(&self, name: &str) -> Result<Option<MeasurementBlockElem>, IndexError> {
        let n = self.hash_capacity;
        let mask = n - 1;
        let hash = hash_key(name.as_bytes());
        let mut pos = hash & mask;
        let mut d = 0u64;
        loop {
            let offset = self.slot(pos);
            if offset == 0 {
                return Ok(None);
            }
            let e = MeasurementBlockElem::parse(&self.block, offset as usize, self.data_end())?;
            if e.name == name {
                return Ok(Some(e));
            }
            if d > dist(hash_key(e.name.as_bytes()), pos, n) {
                return Ok(None);
            }
            pos = (pos + 1) & mask;
            d += 1;
            if d > n {
                return Ok(None);
            }
        }
    }

    /// Walks every element in name order.
    pub fn elems(&self) -> MeasurementBlockElems<'_> {
        MeasurementBlockElems {
            blk: self,
            // skip the pad byte
            pos: self.trailer.data.offset as usize + 1,
        }
    }
}

#[derive(Debug)]
pub struct MeasurementBlockElems<'a> {
    blk: &'a MeasurementBlock,
    pos: usize,
}

impl Iterator for MeasurementBlockElems<'_> {
    type Item = Result<MeasurementBlockElem, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        let end = self.blk.data_end();
        if self.pos >= end {
            return None;
        }
        match MeasurementBlockElem::parse(&self.blk.block, self.pos, end) {
            Ok(e) => {
                self.pos += e.size;
                Some(Ok(e))
            }
            Err(err) => {
                self.pos = end;
                Some(Err(err))
            }
        }
    }
}

/// Everything the writer needs to know about one measurement.
#[derive(Debug, Clone, Default)]
pub struct CompactedMeasurement {
    pub measurement_id: u64,
    pub grid_block: BlockRange,
    pub grids: Vec<BlockRange>,
    /// Global index ids.
    pub series_id_set: SeriesIdSet,
    /// Grid-local id to series-file id. Empty when no series file was attached.
    pub id_map: IdMap,
}

#[derive(Debug, Default)]
pub struct MeasurementBlockWriter {
    mms: BTreeMap<String, CompactedMeasurement>,
}

impl MeasurementBlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, mm: CompactedMeasurement) {
        self.mms.insert(name.into(), mm);
    }

    pub fn len(&self) -> usize {
        self.mms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mms.is_empty()
    }

    /// Writes the block and returns its size in bytes.
    pub fn write_to<W: Write>(&self, w: W) -> Result<u64, IndexError> {
        let mut w = CountingWriter::new(w);
        let mut t = MeasurementBlockTrailer {
            version: MEASUREMENT_BLOCK_VERSION,
            ..Default::default()
        };

        t.data.offset = w.position();
        write_u8(&mut w, 0)?;
        let mut offsets = Vec::with_capacity(self.mms.len());
        for (name, mm) in &self.mms {
            offsets.push((name.as_str(), w.position()));
            Self::write_elem(&mut w, name, mm)?;
        }
        t.data.size = w.position() - t.data.offset;

        let mut index = HashIndexBuilder::new(offsets.len(), LOAD_FACTOR);
        for (name, offset) in &offsets {
            index.insert(name.as_bytes(), *offset);
        }
        t.hash_index.offset = w.position();
        write_u64(&mut w, index.capacity())?;
        for slot in index.finish() {
            write_u64(&mut w, slot)?;
        }
        t.hash_index.size = w.position() - t.hash_index.offset;

        t.write_to(&mut w)?;
        Ok(w.position())
    }

    fn write_elem<W: Write>(w: &mut W, name: &str, mm: &CompactedMeasurement) -> Result<(), IndexError> {
        mm.grid_block.write_to(w)?;
        write_u64(w, mm.grids.len() as u64)?;
        for g in &mm.grids {
            g.write_to(w)?;
        }
        write_var_prefixed(w, name.as_bytes())?;
        write_var_u64(w, mm.measurement_id)?;
        write_var_u64(w, mm.series_id_set.cardinality())?;

        let mut buf = Vec::with_capacity(mm.series_id_set.serialized_size());
        mm.series_id_set.write_to(&mut buf)?;
        write_var_prefixed(w, &buf)?;

        buf.clear();
        mm.id_map.write_to(&mut buf)?;
        write_var_prefixed(w, &buf)?;
        Ok(())
    }
}
