//! Mixed-radix coordinate arithmetic and small set helpers shared by grids and the grid index.
//!
//! A grid coordinate is a positional number whose digits are the value indices of each
//! dimension, most significant first, each digit in base `capacity` of its dimension:
//! `id = Σ idx_i * Π_{j>i} capacity_j`.

use crate::series_set::SeriesIdSet;

/// One digit of a mixed-radix number: a fixed value index, or a wildcard over `0..capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    pub index: Option<u64>,
    pub capacity: u64,
}

impl Dimension {
    pub fn fixed(index: u64, capacity: u64) -> Self {
        Self {
            index: Some(index),
            capacity,
        }
    }

    pub fn wildcard(capacity: u64) -> Self {
        Self {
            index: None,
            capacity,
        }
    }
}

/// `base^exp`, saturating at `u64::MAX`.
pub fn pow_u64(base: u64, exp: u32) -> u64 {
    base.checked_pow(exp).unwrap_or(u64::MAX)
}

/// Folds concrete digits into a single coordinate. `None` if it does not fit in 64 bits.
pub fn compose(digits: impl IntoIterator<Item = (u64, u64)>) -> Option<u64> {
    digits
        .into_iter()
        .try_fold(0u64, |id, (index, capacity)| {
            id.checked_mul(capacity)?.checked_add(index)
        })
}

/// Splits `coordinate` back into its digits (same order as `capacities`).
pub fn decompose(mut coordinate: u64, capacities: &[u64], out: &mut [u64]) {
    debug_assert_eq!(capacities.len(), out.len());
    for i in (0..capacities.len()).rev() {
        let cap = capacities[i].max(1);
        out[i] = coordinate % cap;
        coordinate /= cap;
    }
}

/// Number of coordinates [`variable_base_convert`] would produce.
pub fn enumeration_size(dimensions: &[Dimension]) -> u64 {
    dimensions
        .iter()
        .filter(|d| d.index.is_none())
        .fold(1u64, |acc, d| acc.saturating_mul(d.capacity))
}

/// Enumerates every coordinate matching `dimensions`.
///
/// Wildcards expand the running candidate list before the multiply-and-add of the next
/// digit, so the result covers the full cross product of the unspecified dimensions.
/// The product of all capacities must fit in a u64.
pub fn variable_base_convert(dimensions: &[Dimension]) -> Vec<u64> {
    let mut prev: Vec<u64> = vec![0];
    for d in dimensions {
        match d.index {
            Some(index) => {
                for p in prev.iter_mut() {
                    *p = *p * d.capacity + index;
                }
            }
            None => {
                let mut curr = Vec::with_capacity(prev.len().saturating_mul(d.capacity as usize));
                for i in 0..d.capacity {
                    for p in &prev {
                        curr.push(p * d.capacity + i);
                    }
                }
                prev = curr;
            }
        }
    }
    prev
}

/// Union of any number of id sets.
pub fn union_series_id_sets<'a>(sets: impl IntoIterator<Item = &'a SeriesIdSet>) -> SeriesIdSet {
    let mut out = SeriesIdSet::new();
    for s in sets {
        out.merge_in_place(s);
    }
    out
}
