//! Measurement namespacing.
//!
//! Every measurement owns one [`GridIndex`]. Global series ids carry the measurement id in
//! their upper 32 bits and the grid-local id in the lower 32 bits.

use crate::error::IndexError;
use crate::grid_index::{GridIndex, MAX_LOCAL_ID};
use crate::iterator::{MeasurementIterator, TagKeyIterator, TagValueIterator};
use crate::optimizer::MultiplierOptimizer;
use crate::series_set::SeriesIdSet;
use crate::types::{SeriesId, Tags};
use std::collections::HashMap;

const LOCAL_ID_BITS: u32 = 32;
const LOCAL_ID_MASK: u64 = MAX_LOCAL_ID;

/// Folds a measurement id and a grid-local id into a global series id.
///
/// Both ids must fit in 32 bits.
#[inline]
pub fn series_id_with_measurement_id(measurement_id: u64, local_id: u64) -> SeriesId {
    debug_assert!(local_id <= LOCAL_ID_MASK, "local id {} out of range", local_id);
    debug_assert!(
        measurement_id <= LOCAL_ID_MASK,
        "measurement id {} out of range",
        measurement_id
    );
    (measurement_id << LOCAL_ID_BITS) | local_id
}

/// Splits a global series id into `(measurement_id, local_id)`.
#[inline]
pub fn split_series_id(id: SeriesId) -> (u64, u64) {
    (id >> LOCAL_ID_BITS, id & LOCAL_ID_MASK)
}

#[derive(Debug)]
pub struct Measurement {
    name: String,
    id: u64,
    grid_index: GridIndex,
}

impl Measurement {
    pub fn new(name: impl Into<String>, id: u64, grid_index: GridIndex) -> Self {
        Self {
            name: name.into(),
            id,
            grid_index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn grid_index(&self) -> &GridIndex {
        &self.grid_index
    }

    /// Inserts `tags` and returns the global series id plus whether it was newly created.
    ///
    /// Fails with `IdSpaceExhausted` when the tag set would need a grid reaching past the
    /// 32-bit local id range. The measurement is left untouched in that case.
    pub fn set_tags(&self, tags: &Tags) -> Result<(SeriesId, bool), IndexError> {
        let (local, created) = self.grid_index.set_tags(tags).ok_or_else(|| {
            IndexError::IdSpaceExhausted {
                measurement: self.name.clone(),
                id: self.grid_index.next_offset(),
            }
        })?;
        Ok((series_id_with_measurement_id(self.id, local), created))
    }

    fn globalize(&self, local: SeriesIdSet) -> SeriesIdSet {
        local
            .iter()
            .map(|id| series_id_with_measurement_id(self.id, id))
            .collect()
    }

    /// Every live series, as global ids.
    pub fn series_id_set(&self) -> SeriesIdSet {
        self.globalize(self.grid_index.series_id_set())
    }

    pub fn series_id_set_for_tag_key(&self, key: &str) -> SeriesIdSet {
        self.globalize(self.grid_index.series_id_set_for_tag_key(key))
    }

    pub fn series_id_set_for_tag_value(&self, key: &str, value: &str) -> SeriesIdSet {
        self.globalize(self.grid_index.series_id_set_for_tag_value(key, value))
    }

    /// Global ids of every series whose tags include all of `tags`.
    pub fn matching_series_ids(&self, tags: &Tags) -> SeriesIdSet {
        self.globalize(self.grid_index.matching_ids_for(tags))
    }
}

/// Name to measurement registry with stable, never reused ids.
#[derive(Debug, Default)]
pub struct Measurements {
    measurement_id: HashMap<String, u64>,
    /// Indexed by measurement id; dropped measurements leave `None`.
    measurements: Vec<Option<Measurement>>,
    optimizer: MultiplierOptimizer,
}

impl Measurements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose new measurements shape their grids with `optimizer`.
    pub fn with_optimizer(optimizer: MultiplierOptimizer) -> Self {
        Self {
            optimizer,
            ..Self::default()
        }
    }

    /// Registers `name` and returns its id. Registering an existing name returns its id.
    pub fn append_measurement(&mut self, name: &str) -> Result<u64, IndexError> {
        if let Some(&id) = self.measurement_id.get(name) {
            return Ok(id);
        }
        let id = self.measurements.len() as u64;
        if id > LOCAL_ID_MASK {
            return Err(IndexError::IdSpaceExhausted {
                measurement: name.to_string(),
                id,
            });
        }
        let grid_index = GridIndex::new(self.optimizer);
        self.measurement_id.insert(name.to_string(), id);
        self.measurements
            .push(Some(Measurement::new(name, id, grid_index)));
        Ok(id)
    }

    pub fn measurement_by_name(&self, name: &str) -> Option<&Measurement> {
        let id = *self.measurement_id.get(name)?;
        self.measurements.get(id as usize)?.as_ref()
    }

    /// Removes `name`. Its id is never handed out again. Returns whether it existed.
    pub fn drop_measurement(&mut self, name: &str) -> bool {
        match self.measurement_id.remove(name) {
            Some(id) => {
                if let Some(slot) = self.measurements.get_mut(id as usize) {
                    *slot = None;
                }
                true
            }
            None => false,
        }
    }

    /// Inserts `tags` under an existing measurement.
    pub fn set_tags(&self, name: &str, tags: &Tags) -> Result<(SeriesId, bool), IndexError> {
        self.measurement_by_name(name)
            .ok_or_else(|| IndexError::MeasurementNotFound(name.to_string()))?
            .set_tags(tags)
    }

    pub fn has_tag_key(&self, name: &str, key: &str) -> bool {
        self.measurement_by_name(name)
            .is_some_and(|m| m.grid_index.has_tag_key(key))
    }

    pub fn has_tag_value(&self, name: &str, key: &str, value: &str) -> bool {
        self.measurement_by_name(name)
            .is_some_and(|m| m.grid_index.has_tag_value(key, value))
    }

    pub fn tag_keys(&self, name: &str) -> Option<TagKeyIterator> {
        self.measurement_by_name(name)
            .map(|m| m.grid_index.tag_keys())
    }

    pub fn tag_values(&self, name: &str, key: &str) -> Option<TagValueIterator> {
        self.measurement_by_name(name)
            .map(|m| m.grid_index.tag_values(key))
    }

    pub fn iter(&self) -> MeasurementIterator<'_> {
        MeasurementIterator::new(&self.measurements)
    }

    /// Number of live measurements.
    pub fn len(&self) -> usize {
        self.measurement_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurement_id.is_empty()
    }
}
