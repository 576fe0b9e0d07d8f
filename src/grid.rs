//! A grid: a fixed-shape coordinate space over a set of tag keys.
//!
//! Each tag key is one dimension ([`TagValues`]). A fully specified tag set is a point in the
//! grid and its series id is `offset + coordinate`, where the coordinate is the mixed-radix
//! number formed by the value indices (see [`crate::utils`]). Dimensions keep the order in
//! which the keys were declared at creation; inserts and lookups both follow that order.

use crate::series_set::SeriesIdSet;
use crate::tag_values::TagValues;
use crate::types::Tags;
use crate::utils::{compose, decompose, enumeration_size, variable_base_convert, Dimension};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Grid {
    offset: u64,
    tag_keys: Vec<String>,
    tag_key_to_index: HashMap<String, usize>,
    tag_values: Vec<TagValues>,
    /// Live coordinates, relative to `offset`.
    series_id_set: SeriesIdSet,
}

impl Grid {
    /// Creates an empty grid. `tag_keys` and `tag_values` are parallel.
    pub fn new(offset: u64, tag_keys: Vec<String>, tag_values: Vec<TagValues>) -> Self {
        Self::with_series_id_set(offset, tag_keys, tag_values, SeriesIdSet::new())
    }

    /// Rebuilds a grid from its parts (used when decoding).
    pub fn with_series_id_set(
        offset: u64,
        tag_keys: Vec<String>,
        tag_values: Vec<TagValues>,
        series_id_set: SeriesIdSet,
    ) -> Self {
        debug_assert_eq!(tag_keys.len(), tag_values.len());
        let tag_key_to_index = tag_keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();
        Self {
            offset,
            tag_keys,
            tag_key_to_index,
            tag_values,
            series_id_set,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn tag_keys(&self) -> &[String] {
        &self.tag_keys
    }

    pub fn tag_key_index(&self, key: &str) -> Option<usize> {
        self.tag_key_to_index.get(key).copied()
    }

    /// The dimensions, parallel to [`Self::tag_keys`].
    pub fn tag_values(&self) -> &[TagValues] {
        &self.tag_values
    }

    pub fn dimension(&self, key: &str) -> Option<&TagValues> {
        self.tag_key_index(key).map(|i| &self.tag_values[i])
    }

    /// Live coordinates relative to [`Self::offset`].
    pub fn series_id_set(&self) -> &SeriesIdSet {
        &self.series_id_set
    }

    pub fn num_dimensions(&self) -> usize {
        self.tag_keys.len()
    }

    /// Size of the addressable id range, `Π capacity_i`. Saturates instead of overflowing.
    pub fn id_space_size(&self) -> u64 {
        self.checked_id_space_size().unwrap_or(u64::MAX)
    }

    /// `Π capacity_i`, or `None` if it does not fit in 64 bits.
    pub fn checked_id_space_size(&self) -> Option<u64> {
        self.tag_values
            .iter()
            .try_fold(1u64, |acc, tv| acc.checked_mul(tv.capacity()))
    }

    /// First id past this grid's range, or `None` if the range does not fit in 64 bits.
    pub fn id_range_end(&self) -> Option<u64> {
        self.checked_id_space_size()
            .and_then(|space| self.offset.checked_add(space))
    }

    pub fn has_tag_key(&self, key: &str) -> bool {
        self.tag_key_to_index.contains_key(key)
    }

    pub fn has_tag_value(&self, key: &str, value: &str) -> bool {
        self.dimension(key).is_some_and(|tv| tv.contains(value))
    }

    /// True if `key` is a dimension of this grid and that dimension has no free slot.
    pub fn is_tag_key_full(&self, key: &str) -> bool {
        self.dimension(key).is_some_and(|tv| tv.is_full())
    }

    /// Whether [`Self::set_tags`] would succeed.
    ///
    /// Every key must be a dimension, and every value not yet present needs a free slot in
    /// its dimension. Values that are already present never need room. A grid whose id
    /// range does not fit in 64 bits accepts nothing.
    pub fn can_accept(&self, tags: &Tags) -> bool {
        if tags.len() != self.num_dimensions() || self.id_range_end().is_none() {
            return false;
        }
        tags.iter().all(|tag| match self.dimension(&tag.key) {
            Some(tv) => tv.contains(&tag.value) || !tv.is_full(),
            None => false,
        })
    }

    /// Inserts a fully specified tag set and returns its series id, or `None` if the grid
    /// cannot hold it. Inserting the same tag set again returns the same id.
    pub fn set_tags(&mut self, tags: &Tags) -> Option<u64> {
        if !self.can_accept(tags) {
            return None;
        }
        for tag in tags {
            let dim = self.tag_key_to_index[tag.key.as_str()];
            self.tag_values[dim].set_value(&tag.value);
        }
        // coordinate < Π capacity, and offset + Π capacity fits
        let coordinate = self.coordinate(tags)?;
        self.series_id_set.add(coordinate);
        Some(self.offset + coordinate)
    }

    /// Id of a fully specified tag set if it is live in this grid.
    pub fn strictly_matching_id(&self, tags: &Tags) -> Option<u64> {
        self.coordinate(tags)
            .filter(|c| self.series_id_set.contains(*c))
            .and_then(|c| self.offset.checked_add(c))
    }

    /// Ids of every live series whose tags include all of `tags`.
    ///
    /// Keys missing from `tags` are wildcards; an empty `tags` selects every live id. A key
    /// or value unknown to this grid yields an empty set.
    pub fn matching_ids(&self, tags: &Tags) -> SeriesIdSet {
        if tags.len() > self.num_dimensions() {
            return SeriesIdSet::new();
        }
        let mut dimensions: Vec<Dimension> = self
            .tag_values
            .iter()
            .map(|tv| Dimension::wildcard(tv.capacity()))
            .collect();
        for tag in tags {
            let Some(dim) = self.tag_key_index(&tag.key) else {
                return SeriesIdSet::new();
            };
            let Some(index) = self.tag_values[dim].value_index(&tag.value) else {
                return SeriesIdSet::new();
            };
            dimensions[dim].index = Some(index as u64);
        }

        let live = &self.series_id_set;
        let coordinates = if enumeration_size(&dimensions) <= live.cardinality() {
            let candidates: SeriesIdSet = variable_base_convert(&dimensions).into_iter().collect();
            candidates.and(live)
        } else {
            self.scan_live(&dimensions)
        };
        coordinates.shifted(self.offset)
    }

    /// Walks the live bitmap and keeps coordinates whose digits match the fixed dimensions.
    fn scan_live(&self, dimensions: &[Dimension]) -> SeriesIdSet {
        if dimensions.iter().all(|d| d.index.is_none()) {
            return self.series_id_set.clone();
        }
        let capacities: Vec<u64> = dimensions.iter().map(|d| d.capacity).collect();
        let mut digits = vec![0u64; dimensions.len()];
        self.series_id_set
            .iter()
            .filter(|&c| {
                decompose(c, &capacities, &mut digits);
                dimensions
                    .iter()
                    .zip(&digits)
                    .all(|(d, digit)| d.index.map_or(true, |i| i == *digit))
            })
            .collect()
    }

    /// Coordinate of a fully specified tag set whose values all exist already.
    fn coordinate(&self, tags: &Tags) -> Option<u64> {
        if tags.len() != self.num_dimensions() {
            return None;
        }
        let mut indices = vec![0u64; self.num_dimensions()];
        for tag in tags {
            let dim = self.tag_key_index(&tag.key)?;
            indices[dim] = self.tag_values[dim].value_index(&tag.value)? as u64;
        }
        compose(
            indices
                .into_iter()
                .zip(self.tag_values.iter().map(|tv| tv.capacity())),
        )
    }
}
