//! Grid block codec.
//!
//! Layout of one encoded grid (all integers big-endian u64):
//! `offset, key_count, {key_len, key}*, dim_count, {capacity, value_count, {value_len, value}*}*,
//! bitmap_len, bitmap`. The bitmap holds coordinates relative to `offset`.

use crate::encoding::{write_u64, write_u64_prefixed, write_u8, BlockRange, SliceReader};
use crate::error::IndexError;
use crate::grid::Grid;
use crate::grid_index::MAX_LOCAL_ID;
use crate::series_set::SeriesIdSet;
use crate::tag_values::TagValues;
use std::collections::HashSet;
use std::io::Write;

/// Streams grids into a block, tracking where each one lands.
///
/// The first grid written is preceded by a single zero byte so that no grid starts at
/// position 0 of the stream.
#[derive(Debug)]
pub struct GridBlockEncoder<W> {
    w: W,
    n: u64,
}

impl<W: Write> GridBlockEncoder<W> {
    pub fn new(w: W) -> Self {
        Self { w, n: 0 }
    }

    /// Bytes written so far, header included.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Writes the one-byte header if nothing has been written yet.
    pub fn ensure_header_written(&mut self) -> Result<(), IndexError> {
        if self.n == 0 {
            write_u8(&mut self.w, 0)?;
            self.n = 1;
        }
        Ok(())
    }

    /// Appends `grid` and returns its range within the stream.
    pub fn encode_grid(&mut self, grid: &Grid) -> Result<BlockRange, IndexError> {
        self.ensure_header_written()?;
        let buf = encode_grid(grid)?;
        self.w.write_all(&buf)?;
        let range = BlockRange::new(self.n, buf.len() as u64);
        self.n += buf.len() as u64;
        Ok(range)
    }

    /// Returns the writer and the number of bytes written to it.
    pub fn into_parts(self) -> (W, u64) {
        (self.w, self.n)
    }
}

/// Encodes a single grid.
pub fn encode_grid(grid: &Grid) -> Result<Vec<u8>, IndexError> {
    let mut buf = Vec::new();
    write_u64(&mut buf, grid.offset())?;

    write_u64(&mut buf, grid.tag_keys().len() as u64)?;
    for key in grid.tag_keys() {
        write_u64_prefixed(&mut buf, key.as_bytes())?;
    }

    write_u64(&mut buf, grid.tag_values().len() as u64)?;
    for tv in grid.tag_values() {
        write_u64(&mut buf, tv.capacity())?;
        write_u64(&mut buf, tv.len() as u64)?;
        for value in tv.values() {
            write_u64_prefixed(&mut buf, value.as_bytes())?;
        }
    }

    let set = grid.series_id_set();
    write_u64(&mut buf, set.serialized_size() as u64)?;
    set.write_to(&mut buf)?;
    Ok(buf)
}

/// Decodes a grid produced by [`encode_grid`]. The whole buffer must be consumed.
pub fn decode_grid(buf: &[u8]) -> Result<Grid, IndexError> {
    let mut r = SliceReader::new(buf);
    let offset = r.read_u64()?;

    let key_count = r.read_u64()?;
    let mut keys = Vec::new();
    let mut seen = HashSet::new();
    for _ in 0..key_count {
        let key = r.read_string_u64_prefixed()?;
        if !seen.insert(key.clone()) {
            return Err(IndexError::corruption(format!(
                "Duplicate tag key {:?} in grid at offset {}",
                key, offset
            )));
        }
        keys.push(key);
    }

    let dim_count = r.read_u64()?;
    if dim_count != key_count {
        return Err(IndexError::corruption(format!(
            "Grid at offset {} has {} keys but {} dimensions",
            offset, key_count, dim_count
        )));
    }
    let mut dims = Vec::with_capacity(keys.len());
    for key in &keys {
        let capacity = r.read_u64()?;
        let value_count = r.read_u64()?;
        if value_count > capacity {
            return Err(IndexError::corruption(format!(
                "Dimension {:?} holds {} values but capacity is {}",
                key, value_count, capacity
            )));
        }
        let mut tv = TagValues::new(capacity);
        for _ in 0..value_count {
            let value = r.read_string_u64_prefixed()?;
            let before = tv.len();
            tv.set_value(&value);
            if tv.len() == before {
                return Err(IndexError::corruption(format!(
                    "Duplicate value {:?} in dimension {:?}",
                    value, key
                )));
            }
        }
        dims.push(tv);
    }

    let bitmap = r.read_u64_prefixed()?;
    let set = SeriesIdSet::unmarshal_binary(bitmap)?;
    if !r.is_empty() {
        return Err(IndexError::corruption(format!(
            "{} trailing bytes after grid at offset {}",
            r.remaining(),
            offset
        )));
    }

    let id_space = dims
        .iter()
        .try_fold(1u64, |acc, tv| acc.checked_mul(tv.capacity()))
        .and_then(|space| offset.checked_add(space));
    if !id_space.is_some_and(|end| end <= MAX_LOCAL_ID + 1) {
        return Err(IndexError::corruption(format!(
            "Id space of grid at offset {} runs past local id {}",
            offset, MAX_LOCAL_ID
        )));
    }

    let grid = Grid::with_series_id_set(offset, keys, dims, set);
    if let Some(max) = grid.series_id_set().max() {
        if max >= grid.id_space_size() {
            return Err(IndexError::corruption(format!(
                "Coordinate {} outside id space {} of grid at offset {}",
                max,
                grid.id_space_size(),
                offset
            )));
        }
    }
    Ok(grid)
}

/// Decodes each range of `buf` as a grid, in order.
pub fn decode_grids(buf: &[u8], ranges: &[BlockRange]) -> Result<Vec<Grid>, IndexError> {
    ranges
        .iter()
        .map(|range| decode_grid(range.slice(buf)?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tags;

    fn sample() -> Grid {
        let mut g = Grid::new(
            11,
            vec!["host".to_string(), "region".to_string()],
            vec![TagValues::new(3), TagValues::new(2)],
        );
        g.set_tags(&Tags::from_pairs(&[("host", "a"), ("region", "eu")]));
        g.set_tags(&Tags::from_pairs(&[("host", "b"), ("region", "us")]));
        g
    }

    #[test]
    fn layout_starts_with_offset_and_keys() {
        let buf = encode_grid(&sample()).unwrap();
        assert_eq!(&buf[0..8], &11u64.to_be_bytes());
        assert_eq!(&buf[8..16], &2u64.to_be_bytes());
        assert_eq!(&buf[16..24], &4u64.to_be_bytes());
        assert_eq!(&buf[24..28], b"host");
    }

    #[test]
    fn decoded_grid_answers_like_the_original() {
        let g = sample();
        let back = decode_grid(&encode_grid(&g).unwrap()).unwrap();
        assert_eq!(back.offset(), 11);
        assert_eq!(back.tag_keys(), g.tag_keys());
        assert_eq!(back.tag_key_index("region"), Some(1));
        assert_eq!(back.tag_values()[0].values(), g.tag_values()[0].values());
        assert_eq!(back.tag_values()[1].capacity(), 2);
        assert_eq!(back.series_id_set().cardinality(), 2);
        let t = Tags::from_pairs(&[("host", "b"), ("region", "us")]);
        assert_eq!(back.strictly_matching_id(&t), g.strictly_matching_id(&t));
    }

    #[test]
    fn encoder_tracks_ranges_after_header() {
        let mut enc = GridBlockEncoder::new(Vec::new());
        let a = enc.encode_grid(&sample()).unwrap();
        let b = enc.encode_grid(&sample()).unwrap();
        assert_eq!(a.offset, 1);
        assert_eq!(b.offset, a.offset + a.size);
        let (buf, n) = enc.into_parts();
        assert_eq!(n as usize, buf.len());
        assert_eq!(buf[0], 0);
        let grids = decode_grids(&buf, &[a, b]).unwrap();
        assert_eq!(grids.len(), 2);
    }

    #[test]
    fn truncation_is_detected() {
        let buf = encode_grid(&sample()).unwrap();
        for cut in [0, 7, 20, buf.len() - 1] {
            assert!(matches!(
                decode_grid(&buf[..cut]),
                Err(IndexError::Corruption { .. })
            ));
        }
    }

    #[test]
    fn over_capacity_dimension_is_rejected() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 1).unwrap();
        write_u64(&mut buf, 1).unwrap();
        write_u64_prefixed(&mut buf, b"k").unwrap();
        write_u64(&mut buf, 1).unwrap();
        write_u64(&mut buf, 1).unwrap(); // capacity
        write_u64(&mut buf, 2).unwrap(); // value count
        assert!(matches!(
            decode_grid(&buf),
            Err(IndexError::Corruption { .. })
        ));
    }

    #[test]
    fn grid_past_the_local_id_limit_is_rejected() {
        let mut buf = Vec::new();
        write_u64(&mut buf, MAX_LOCAL_ID).unwrap(); // offset
        write_u64(&mut buf, 1).unwrap();
        write_u64_prefixed(&mut buf, b"k").unwrap();
        write_u64(&mut buf, 1).unwrap();
        write_u64(&mut buf, 2).unwrap(); // capacity
        write_u64(&mut buf, 0).unwrap();
        let empty = SeriesIdSet::new();
        write_u64(&mut buf, empty.serialized_size() as u64).unwrap();
        empty.write_to(&mut buf).unwrap();
        assert!(matches!(
            decode_grid(&buf),
            Err(IndexError::Corruption { .. })
        ));
    }
}
