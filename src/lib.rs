#![doc = include_str!("../README.md")]
// Declare modules
pub mod encoding;
pub mod error;
pub mod generator;
pub mod grid;
pub mod grid_block;
pub mod grid_index;
pub mod id_map;
pub mod index;
pub mod index_file;
pub mod iterator;
pub mod measurement;
pub mod measurement_block;
pub mod optimizer;
pub mod rhh;
pub mod series_set;
pub mod tag_values;
pub mod telemetry;
pub mod types;
pub mod utils;

/// Error type for index operations.
pub use crate::error::IndexError;
/// A fixed-shape coordinate space over a set of tag keys.
pub use crate::grid::Grid;
/// Per-measurement collection of grids with double-checked-locking inserts.
pub use crate::grid_index::GridIndex;
/// Concurrent index façade and its configuration.
pub use crate::index::{Index, IndexConfig, SeriesFile};
/// Restored, read-only index file and its writer.
pub use crate::index_file::{IndexFile, IndexFileWriter};
/// Measurement registry and series-id namespacing.
pub use crate::measurement::{Measurement, Measurements};
/// Grid shape selection.
pub use crate::optimizer::{MultiplierOptimizer, Optimizer};
/// Roaring-backed set of series ids.
pub use crate::series_set::SeriesIdSet;
/// One dimension of a grid.
pub use crate::tag_values::TagValues;
/// Structured event hook for observability.
pub use crate::telemetry::{IndexEvent, IndexEventListener};
/// Tag collection and series id types.
pub use crate::types::{SeriesId, Tag, Tags};
