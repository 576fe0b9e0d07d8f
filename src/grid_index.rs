//! Per-measurement collection of grids.
//!
//! Inserts follow "first existing, else first fit, else grow": a shared-lock probe for an
//! existing id, then an exclusive-lock re-probe, then the first grid that can accept the
//! tag set, and finally a new grid shaped by the [`Optimizer`]. Grids are append-only and
//! are scanned in creation order.

use crate::grid::Grid;
use crate::iterator::{TagKeyIterator, TagValueIterator};
use crate::optimizer::{next_grid_offset, Optimizer};
use crate::series_set::SeriesIdSet;
use crate::telemetry::index_metrics;
use crate::types::Tags;
use crate::utils::union_series_id_sets;
use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Largest grid-local id. Local ids share a series id with a 32-bit measurement id.
pub const MAX_LOCAL_ID: u64 = u32::MAX as u64;

#[derive(Debug)]
pub struct GridIndex {
    grids: RwLock<Vec<Grid>>,
    optimizer: Box<dyn Optimizer>,
}

impl GridIndex {
    pub fn new(optimizer: impl Optimizer) -> Self {
        Self::with_optimizer(Box::new(optimizer))
    }

    pub fn with_optimizer(optimizer: Box<dyn Optimizer>) -> Self {
        Self {
            grids: RwLock::new(Vec::new()),
            optimizer,
        }
    }

    // Grids are only mutated through `set_tags`, which leaves them consistent before any
    // point that could panic, so a poisoned lock still guards valid data.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Grid>> {
        self.grids.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Grid>> {
        self.grids.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the grid-local id for a fully specified tag set, creating it if needed.
    ///
    /// The flag is true when this call created the id and false when it already existed.
    /// `None` means the tag set needs a new grid and that grid would not fit below
    /// [`MAX_LOCAL_ID`]; nothing is changed in that case.
    pub fn set_tags(&self, tags: &Tags) -> Option<(u64, bool)> {
        if let Some(id) = Self::find_existing(&self.read(), tags) {
            return Some((id, false));
        }

        let mut grids = self.write();
        if let Some(id) = Self::find_existing(&grids, tags) {
            return Some((id, false));
        }

        for grid in grids.iter_mut() {
            if let Some(id) = grid.set_tags(tags) {
                index_metrics::record_series_created();
                return Some((id, true));
            }
        }

        let mut grid = self.optimizer.new_optimized_grid(&grids, tags);
        if !Self::fits_after(&grids, &grid) {
            return None;
        }
        // an optimizer may still hand back a grid that rejects its own seed tags
        let id = grid.set_tags(tags)?;
        grids.push(grid);
        index_metrics::record_grid_created();
        index_metrics::record_series_created();
        Some((id, true))
    }

    /// Whether `grid` starts after every existing range and ends at or below [`MAX_LOCAL_ID`].
    fn fits_after(grids: &[Grid], grid: &Grid) -> bool {
        grid.offset() >= next_grid_offset(grids)
            && grid
                .id_range_end()
                .is_some_and(|end| end <= MAX_LOCAL_ID + 1)
    }

    /// First id past the last grid's range.
    pub fn next_offset(&self) -> u64 {
        next_grid_offset(&self.read())
    }

    fn find_existing(grids: &[Grid], tags: &Tags) -> Option<u64> {
        grids.iter().find_map(|g| g.strictly_matching_id(tags))
    }

    /// Id of a fully specified, live tag set.
    pub fn strictly_matching_id(&self, tags: &Tags) -> Option<u64> {
        Self::find_existing(&self.read(), tags)
    }

    /// Union of [`Grid::matching_ids`] across all grids.
    pub fn matching_ids_for(&self, tags: &Tags) -> SeriesIdSet {
        let per_grid: Vec<SeriesIdSet> = self.read().iter().map(|g| g.matching_ids(tags)).collect();
        union_series_id_sets(&per_grid)
    }

    pub fn has_tag_key(&self, key: &str) -> bool {
        self.read().iter().any(|g| g.has_tag_key(key))
    }

    pub fn has_tag_value(&self, key: &str, value: &str) -> bool {
        self.read().iter().any(|g| g.has_tag_value(key, value))
    }

    /// Distinct tag keys across all grids, sorted.
    pub fn tag_keys(&self) -> TagKeyIterator {
        let grids = self.read();
        let keys: BTreeSet<String> = grids
            .iter()
            .flat_map(|g| g.tag_keys().iter().cloned())
            .collect();
        TagKeyIterator::new(keys.into_iter().collect())
    }

    /// Distinct values of `key` across all grids, sorted.
    pub fn tag_values(&self, key: &str) -> TagValueIterator {
        let grids = self.read();
        let values: BTreeSet<String> = grids
            .iter()
            .filter_map(|g| g.dimension(key))
            .flat_map(|tv| tv.values().iter().cloned())
            .collect();
        TagValueIterator::new(values.into_iter().collect())
    }

    /// Every live id.
    pub fn series_id_set(&self) -> SeriesIdSet {
        self.matching_ids_for(&Tags::new())
    }

    /// Live ids in grids that have `key` as a dimension.
    pub fn series_id_set_for_tag_key(&self, key: &str) -> SeriesIdSet {
        let grids = self.read();
        let mut out = SeriesIdSet::new();
        for g in grids.iter().filter(|g| g.has_tag_key(key)) {
            out.merge_in_place(&g.series_id_set().shifted(g.offset()));
        }
        out
    }

    pub fn series_id_set_for_tag_value(&self, key: &str, value: &str) -> SeriesIdSet {
        let mut tags = Tags::new();
        tags.set(key, value);
        self.matching_ids_for(&tags)
    }

    /// Number of grids whose `key` dimension is saturated.
    pub fn num_filled_up_grids(&self, key: &str) -> usize {
        crate::optimizer::filled_up_count(&self.read(), key)
    }

    pub fn grid_count(&self) -> usize {
        self.read().len()
    }

    /// Number of live ids across all grids.
    pub fn series_count(&self) -> u64 {
        self.read()
            .iter()
            .map(|g| g.series_id_set().cardinality())
            .sum()
    }

    /// Point-in-time copy of every grid, for encoding outside the lock.
    pub fn snapshot(&self) -> Vec<Grid> {
        self.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::MultiplierOptimizer;

    fn index(basic_num: u64, multiplier: u64) -> GridIndex {
        GridIndex::new(MultiplierOptimizer::new(basic_num, multiplier).unwrap())
    }

    #[test]
    fn second_insert_reports_existing() {
        let gi = index(10, 1);
        let t = Tags::from_pairs(&[("a", "0"), ("b", "1"), ("c", "2"), ("d", "3")]);
        assert_eq!(gi.set_tags(&t), Some((1, true)));
        assert_eq!(gi.set_tags(&t), Some((1, false)));
        assert_eq!(gi.grid_count(), 1);
        assert_eq!(gi.series_count(), 1);
    }

    #[test]
    fn grows_when_no_grid_accepts() {
        let gi = index(1, 1);
        assert_eq!(gi.set_tags(&Tags::from_pairs(&[("a", "0")])), Some((1, true)));
        assert_eq!(gi.set_tags(&Tags::from_pairs(&[("a", "1")])), Some((2, true)));
        assert_eq!(gi.set_tags(&Tags::from_pairs(&[("a", "1")])), Some((2, false)));
        assert_eq!(gi.grid_count(), 2);
        assert_eq!(gi.num_filled_up_grids("a"), 2);
    }

    #[test]
    fn metadata_queries_span_grids() {
        let gi = index(1, 1);
        gi.set_tags(&Tags::from_pairs(&[("host", "a")]));
        gi.set_tags(&Tags::from_pairs(&[("host", "b"), ("region", "eu")]));

        assert_eq!(gi.tag_keys().collect::<Vec<_>>(), vec!["host", "region"]);
        assert_eq!(gi.tag_values("host").collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(gi.has_tag_value("region", "eu"));
        assert!(!gi.has_tag_key("zone"));
        assert_eq!(
            gi.series_id_set_for_tag_key("region").iter().collect::<Vec<_>>(),
            vec![2]
        );
        assert_eq!(
            gi.series_id_set_for_tag_value("host", "a")
                .iter()
                .collect::<Vec<_>>(),
            vec![1]
        );
        assert_eq!(gi.series_id_set().cardinality(), 2);
    }

    #[test]
    fn grid_past_the_local_id_limit_is_refused() {
        let gi = index(2000, 1);
        let ab = Tags::from_pairs(&[("a", "0"), ("b", "0")]);
        assert_eq!(gi.set_tags(&ab), Some((1, true)));
        // 2000^3 ids starting at 4_000_001 run past the limit
        let abc = Tags::from_pairs(&[("a", "0"), ("b", "0"), ("c", "0")]);
        assert_eq!(gi.set_tags(&abc), None);
        assert_eq!(gi.grid_count(), 1);
        assert_eq!(gi.series_count(), 1);
        assert_eq!(gi.strictly_matching_id(&abc), None);
        assert!(!gi.has_tag_key("c"));
        assert_eq!(gi.next_offset(), 4_000_001);

        // smaller grids still fit
        assert_eq!(
            gi.set_tags(&Tags::from_pairs(&[("x", "0")])),
            Some((4_000_001, true))
        );
        assert_eq!(gi.set_tags(&ab), Some((1, false)));
    }

    #[test]
    fn grid_wider_than_64_bits_is_refused() {
        let gi = index(5, 2);
        let wide: Tags = (0..29)
            .map(|i| (format!("k{:02}", i), "v".to_string()))
            .collect();
        assert_eq!(gi.set_tags(&wide), None);
        assert_eq!(gi.grid_count(), 0);
        assert_eq!(gi.series_count(), 0);
    }
}
