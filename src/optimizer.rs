//! Grid shape selection.

use crate::error::IndexError;
use crate::grid::Grid;
use crate::tag_values::TagValues;
use crate::types::Tags;
use crate::utils::pow_u64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Id of the first grid's first coordinate. Id 0 stays reserved as "unset".
pub const FIRST_GRID_OFFSET: u64 = 1;

/// Decides the shape of a new grid from the grids that already exist.
///
/// Only called under the owning grid index's exclusive lock, with every grid created so far.
pub trait Optimizer: fmt::Debug + Send + Sync + 'static {
    /// Builds the grid that will receive `tags`. Each dimension must be seeded with the value
    /// from `tags` and the grid's offset must start right after the last grid's id range.
    fn new_optimized_grid(&self, grids: &[Grid], tags: &Tags) -> Grid;
}

/// First offset after every id range in `grids`.
pub fn next_grid_offset(grids: &[Grid]) -> u64 {
    grids
        .last()
        .map(|g| g.offset().saturating_add(g.id_space_size()))
        .unwrap_or(FIRST_GRID_OFFSET)
}

/// Number of grids in which `key` is a saturated dimension.
pub fn filled_up_count(grids: &[Grid], key: &str) -> usize {
    grids.iter().filter(|g| g.is_tag_key_full(key)).count()
}

/// Sizes a dimension for key `K` as `basic_num * multiplier^n`, where `n` is how many
/// earlier grids have already filled up their `K` dimension.
///
/// `multiplier = 1` keeps dimensions fixed-size; `multiplier = 2` doubles the allocation
/// for a key every time it saturates a grid.
///
/// Deserializing goes through [`MultiplierOptimizer::new`], so a config file cannot carry
/// a zero parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMultiplierOptimizer")]
pub struct MultiplierOptimizer {
    basic_num: u64,
    multiplier: u64,
}

#[derive(Deserialize)]
struct RawMultiplierOptimizer {
    basic_num: u64,
    multiplier: u64,
}

impl TryFrom<RawMultiplierOptimizer> for MultiplierOptimizer {
    type Error = IndexError;

    fn try_from(raw: RawMultiplierOptimizer) -> Result<Self, Self::Error> {
        Self::new(raw.basic_num, raw.multiplier)
    }
}

impl Default for MultiplierOptimizer {
    fn default() -> Self {
        Self {
            basic_num: 5,
            multiplier: 2,
        }
    }
}

impl MultiplierOptimizer {
    pub fn new(basic_num: u64, multiplier: u64) -> Result<Self, IndexError> {
        let o = Self {
            basic_num,
            multiplier,
        };
        o.validate()?;
        Ok(o)
    }

    /// Rejects shapes that could never hold a value.
    fn validate(&self) -> Result<(), IndexError> {
        if self.basic_num == 0 {
            return Err(IndexError::ConfigError(
                "optimizer basic_num must be at least 1".to_string(),
            ));
        }
        if self.multiplier == 0 {
            return Err(IndexError::ConfigError(
                "optimizer multiplier must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn basic_num(&self) -> u64 {
        self.basic_num
    }

    pub fn multiplier(&self) -> u64 {
        self.multiplier
    }

    /// Capacity of a new dimension for `key` given the existing grids.
    pub fn capacity_for(&self, grids: &[Grid], key: &str) -> u64 {
        let n = filled_up_count(grids, key);
        let n = u32::try_from(n).unwrap_or(u32::MAX);
        pow_u64(self.multiplier, n).saturating_mul(self.basic_num)
    }
}

impl Optimizer for MultiplierOptimizer {
    fn new_optimized_grid(&self, grids: &[Grid], tags: &Tags) -> Grid {
        let offset = next_grid_offset(grids);
        let mut keys = Vec::with_capacity(tags.len());
        let mut values = Vec::with_capacity(tags.len());
        for tag in tags {
            let mut tv = TagValues::new(self.capacity_for(grids, &tag.key));
            tv.set_value(&tag.value);
            keys.push(tag.key.clone());
            values.push(tv);
        }
        Grid::new(offset, keys, values)
    }
}
