//! Index file: the immutable, on-disk form of a set of measurements.
//!
//! Layout: `[pad:u8][grid blocks][measurement block][trailer]` with trailer
//! `measurement_block_offset:u64, measurement_block_size:u64, version:u16`. Grid ranges
//! stored in the measurement block are absolute file offsets.
//!
//! Restored grids are read-only: an [`IndexFile`] answers queries by decoding the grids of
//! one measurement on demand and never accepts inserts.

use crate::encoding::{write_u16, BlockRange, SliceReader};
use crate::error::IndexError;
use crate::grid::Grid;
use crate::grid_block::{decode_grids, GridBlockEncoder};
use crate::id_map::IdMap;
use crate::iterator::{TagKeyIterator, TagValueIterator};
use crate::measurement::{series_id_with_measurement_id, split_series_id};
use crate::measurement_block::{
    CompactedMeasurement, MeasurementBlock, MeasurementBlockElem, MeasurementBlockWriter,
};
use crate::series_set::SeriesIdSet;
use crate::telemetry::index_metrics;
use crate::types::Tags;
use bytes::Bytes;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const INDEX_FILE_VERSION: u16 = 1;

/// measurement block offset/size, version.
pub const INDEX_FILE_TRAILER_SIZE: usize = 8 + 8 + 2;

pub const INDEX_FILE_EXT: &str = "gidx";

/// File name for index file `id` at compaction `level`, e.g. `L1-00000007.gidx`.
pub fn format_index_file_name(id: u64, level: u32) -> String {
    format!("L{}-{:08}.{}", level, id, INDEX_FILE_EXT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexFileTrailer {
    pub measurement_block: BlockRange,
    pub version: u16,
}

impl IndexFileTrailer {
    /// Reads the trailer from the last [`INDEX_FILE_TRAILER_SIZE`] bytes of `file`.
    pub fn read(file: &[u8]) -> Result<Self, IndexError> {
        let start = file.len().checked_sub(INDEX_FILE_TRAILER_SIZE).ok_or_else(|| {
            IndexError::corruption(format!(
                "Index file of {} bytes is shorter than its trailer",
                file.len()
            ))
        })?;
        let mut r = SliceReader::new(&file[start..]);
        let measurement_block = BlockRange::read_from(&mut r)?;
        let version = r.read_u16()?;
        if version != INDEX_FILE_VERSION {
            return Err(IndexError::UnsupportedVersion {
                what: "index file",
                version,
            });
        }
        Ok(Self {
            measurement_block,
            version,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), IndexError> {
        self.measurement_block.write_to(w)?;
        write_u16(w, self.version)?;
        Ok(())
    }
}

/// Grids and id map of one measurement, captured for compaction.
#[derive(Debug, Clone)]
pub struct MeasurementSnapshot {
    pub name: String,
    pub measurement_id: u64,
    pub grids: Vec<Grid>,
    pub id_map: IdMap,
}

/// Streams measurements into an index file.
#[derive(Debug)]
pub struct IndexFileWriter<W> {
    enc: GridBlockEncoder<W>,
    mblk: MeasurementBlockWriter,
}

impl<W: Write> IndexFileWriter<W> {
    pub fn new(w: W) -> Self {
        Self {
            enc: GridBlockEncoder::new(w),
            mblk: MeasurementBlockWriter::new(),
        }
    }

    /// Writes the grids of `mm` and records where they went.
    pub fn add_measurement(&mut self, mm: &MeasurementSnapshot) -> Result<(), IndexError> {
        self.enc.ensure_header_written()?;
        let start = self.enc.n();
        let mut grids = Vec::with_capacity(mm.grids.len());
        let mut series = SeriesIdSet::new();
        for grid in &mm.grids {
            grids.push(self.enc.encode_grid(grid)?);
            series.extend(
                grid.series_id_set()
                    .iter()
                    .map(|c| series_id_with_measurement_id(mm.measurement_id, grid.offset() + c)),
            );
        }
        self.mblk.add(
            mm.name.clone(),
            CompactedMeasurement {
                measurement_id: mm.measurement_id,
                grid_block: BlockRange::new(start, self.enc.n() - start),
                grids,
                series_id_set: series,
                id_map: mm.id_map.clone(),
            },
        );
        Ok(())
    }

    /// Writes the measurement block and trailer. Returns the writer and the file size.
    pub fn finish(mut self) -> Result<(W, u64), IndexError> {
        self.enc.ensure_header_written()?;
        let (mut w, offset) = self.enc.into_parts();
        let size = self.mblk.write_to(&mut w)?;
        let trailer = IndexFileTrailer {
            measurement_block: BlockRange::new(offset, size),
            version: INDEX_FILE_VERSION,
        };
        trailer.write_to(&mut w)?;
        w.flush()?;
        Ok((w, offset + size + INDEX_FILE_TRAILER_SIZE as u64))
    }
}

/// A restored, read-only index file.
#[derive(Debug, Clone)]
pub struct IndexFile {
    path: Option<PathBuf>,
    data: Bytes,
    grid_block_end: usize,
    mblk: MeasurementBlock,
}

impl IndexFile {
    /// Reads and restores the index file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let start = Instant::now();
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let mut file = Self::from_bytes(Bytes::from(data))?;
        file.path = Some(path.to_path_buf());
        index_metrics::record_restore(start.elapsed());
        Ok(file)
    }

    pub fn from_bytes(data: Bytes) -> Result<Self, IndexError> {
        let trailer = IndexFileTrailer::read(&data)?;
        let body_len = data.len() - INDEX_FILE_TRAILER_SIZE;
        let (start, end) = trailer.measurement_block.bounds(body_len)?;
        let mblk = MeasurementBlock::unmarshal_binary(data.slice(start..end))?;
        Ok(Self {
            path: None,
            data,
            grid_block_end: start,
            mblk,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// File size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn measurement_block(&self) -> &MeasurementBlock {
        &self.mblk
    }

    pub fn measurement(&self, name: &str) -> Result<Option<MeasurementBlockElem>, IndexError> {
        self.mblk.elem(name)
    }

    /// Names of every measurement, sorted.
    pub fn measurement_names(&self) -> Result<Vec<String>, IndexError> {
        self.mblk
            .elems()
            .map(|e| e.map(|e| e.name().to_string()))
            .collect()
    }

    /// Decodes the grids of one measurement.
    pub fn grids(&self, elem: &MeasurementBlockElem) -> Result<Vec<Grid>, IndexError> {
        decode_grids(&self.data[..self.grid_block_end], elem.grids())
            .map_err(|e| e.in_measurement(elem.name()))
    }

    /// Decodes the grids of `name` and collects the translated ids `select` picks per grid.
    fn collect_ids(
        &self,
        name: &str,
        select: impl Fn(&Grid) -> Option<SeriesIdSet>,
    ) -> Result<SeriesIdSet, IndexError> {
        let Some(elem) = self.measurement(name)? else {
            return Ok(SeriesIdSet::new());
        };
        let mut out = SeriesIdSet::new();
        for grid in self.grids(&elem)? {
            if let Some(ids) = select(&grid) {
                ids.for_each(|id| {
                    if let Some(id) = elem.format_id(id) {
                        out.add(id);
                    }
                });
            }
        }
        Ok(out)
    }

    /// Every series of `name`.
    pub fn series_id_set(&self, name: &str) -> Result<SeriesIdSet, IndexError> {
        let Some(elem) = self.measurement(name)? else {
            return Ok(SeriesIdSet::new());
        };
        Ok(elem
            .series_id_set()?
            .iter()
            .filter_map(|id| elem.format_id(split_series_id(id).1))
            .collect())
    }

    pub fn series_id_set_for_tag_key(
        &self,
        name: &str,
        key: &str,
    ) -> Result<SeriesIdSet, IndexError> {
        self.collect_ids(name, |g| {
            g.has_tag_key(key)
                .then(|| g.series_id_set().shifted(g.offset()))
        })
    }

    pub fn series_id_set_for_tag_value(
        &self,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<SeriesIdSet, IndexError> {
        let mut tags = Tags::new();
        tags.set(key, value);
        self.collect_ids(name, |g| {
            g.has_tag_value(key, value).then(|| g.matching_ids(&tags))
        })
    }

    /// Series of `name` whose tags include all of `tags`.
    pub fn matching_series_ids(&self, name: &str, tags: &Tags) -> Result<SeriesIdSet, IndexError> {
        self.collect_ids(name, |g| Some(g.matching_ids(tags)))
    }

    pub fn tag_keys(&self, name: &str) -> Result<TagKeyIterator, IndexError> {
        let mut keys = BTreeSet::new();
        if let Some(elem) = self.measurement(name)? {
            for grid in self.grids(&elem)? {
                keys.extend(grid.tag_keys().iter().cloned());
            }
        }
        Ok(TagKeyIterator::new(keys.into_iter().collect()))
    }

    pub fn tag_values(&self, name: &str, key: &str) -> Result<TagValueIterator, IndexError> {
        let mut values = BTreeSet::new();
        if let Some(elem) = self.measurement(name)? {
            for grid in self.grids(&elem)? {
                if let Some(tv) = grid.dimension(key) {
                    values.extend(tv.values().iter().cloned());
                }
            }
        }
        Ok(TagValueIterator::new(values.into_iter().collect()))
    }
}
