//! Concurrent index façade over [`Measurements`].
//!
//! Owns the measurement registry, reconciles newly created series with an optional
//! [`SeriesFile`] and compacts the live state into index files.

use crate::error::IndexError;
use crate::id_map::IdMap;
use crate::index_file::{format_index_file_name, IndexFileWriter, MeasurementSnapshot};
use crate::iterator::{TagKeyIterator, TagValueIterator};
use crate::measurement::{split_series_id, Measurement, Measurements};
use crate::optimizer::MultiplierOptimizer;
use crate::series_set::SeriesIdSet;
use crate::telemetry::{index_metrics, noop_event_listener, IndexEvent, IndexEventListener};
use crate::types::{SeriesId, Tags};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Authority that assigns the external id of a series.
///
/// Must be idempotent: asking twice for the same name and tags returns the same id.
pub trait SeriesFile: std::fmt::Debug + Send + Sync + 'static {
    fn create_series_id(&self, name: &str, tags: &Tags) -> Result<u64, IndexError>;
}

/// Configuration for an [`Index`].
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Directory index files are written to.
    pub dir: PathBuf,
    /// Grid shaping for every new measurement.
    pub optimizer: MultiplierOptimizer,
    /// Level encoded in index file names.
    pub compaction_level: u32,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn IndexEventListener>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            dir: PathBuf::from("./data/index"),
            optimizer: MultiplierOptimizer::default(),
            compaction_level: 1,
            event_listener: noop_event_listener(),
        }
    }
}

#[derive(Debug)]
pub struct Index {
    config: IndexConfig,
    measurements: RwLock<Measurements>,
    /// Measurement id to (grid-local id to series-file id).
    id_maps: RwLock<HashMap<u64, IdMap>>,
    series_file: Option<Arc<dyn SeriesFile>>,
}

impl Index {
    /// Creates the configured directory and an empty index.
    pub fn open(config: IndexConfig) -> Result<Self, IndexError> {
        fs::create_dir_all(&config.dir)?;
        Ok(Self {
            measurements: RwLock::new(Measurements::with_optimizer(config.optimizer)),
            id_maps: RwLock::new(HashMap::new()),
            series_file: None,
            config,
        })
    }

    /// Attaches the series-file authority. Series created from now on are reconciled with it.
    pub fn with_series_file(mut self, series_file: Arc<dyn SeriesFile>) -> Self {
        self.series_file = Some(series_file);
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn emit(&self, event: IndexEvent) {
        self.config.event_listener.on_event(event);
    }

    /// Registers `name` if needed and returns its measurement id.
    fn ensure_measurement(&self, name: &str) -> Result<u64, IndexError> {
        if let Some(m) = self.measurements.read()?.measurement_by_name(name) {
            return Ok(m.id());
        }
        let mut ms = self.measurements.write()?;
        if let Some(m) = ms.measurement_by_name(name) {
            return Ok(m.id());
        }
        let id = ms.append_measurement(name)?;
        drop(ms);
        self.emit(IndexEvent::MeasurementCreated {
            name: name.to_string(),
            measurement_id: id,
        });
        Ok(id)
    }

    /// Returns the index id of the series, creating the measurement and series as needed.
    pub fn create_series_if_not_exists(
        &self,
        name: &str,
        tags: &Tags,
    ) -> Result<SeriesId, IndexError> {
        loop {
            let found = {
                let ms = self.measurements.read()?;
                ms.measurement_by_name(name).map(|m| m.set_tags(tags))
            };
            match found {
                Some(result) => {
                    let (id, _) = result?;
                    self.reconcile(name, tags, id)?;
                    return Ok(id);
                }
                // dropped between registration and insert: register again
                None => {
                    self.ensure_measurement(name)?;
                }
            }
        }
    }

    /// Records the series-file id of `id` unless it is already known.
    fn reconcile(&self, name: &str, tags: &Tags, id: SeriesId) -> Result<(), IndexError> {
        let Some(series_file) = &self.series_file else {
            return Ok(());
        };
        let (mid, local) = split_series_id(id);
        let known = self
            .id_maps
            .read()?
            .get(&mid)
            .is_some_and(|m| m.get(local).is_some());
        if known {
            return Ok(());
        }
        let sf_id = series_file
            .create_series_id(name, tags)
            .map_err(|e| match e {
                IndexError::SeriesFile(_) => e,
                other => IndexError::SeriesFile(other.to_string()),
            })?;
        let ms = self.measurements.read()?;
        // dropped, or dropped and registered again, while the series file answered
        if !ms.measurement_by_name(name).is_some_and(|m| m.id() == mid) {
            return Ok(());
        }
        self.id_maps
            .write()?
            .entry(mid)
            .or_default()
            .insert(local, sf_id);
        Ok(())
    }

    /// Batch form of [`Self::create_series_if_not_exists`]; ids come back in input order.
    pub fn create_series_list_if_not_exists(
        &self,
        series: &[(String, Tags)],
    ) -> Result<Vec<SeriesId>, IndexError> {
        for (name, _) in series {
            self.ensure_measurement(name)?;
        }
        series
            .par_iter()
            .map(|(name, tags)| self.create_series_if_not_exists(name, tags))
            .collect()
    }

    /// Drops `name` and everything indexed under it. Returns whether it existed.
    pub fn drop_measurement(&self, name: &str) -> Result<bool, IndexError> {
        let mut ms = self.measurements.write()?;
        let Some(id) = ms.measurement_by_name(name).map(|m| m.id()) else {
            return Ok(false);
        };
        ms.drop_measurement(name);
        self.id_maps.write()?.remove(&id);
        drop(ms);
        self.emit(IndexEvent::MeasurementDropped {
            name: name.to_string(),
            measurement_id: id,
        });
        Ok(true)
    }

    pub fn measurement_exists(&self, name: &str) -> Result<bool, IndexError> {
        Ok(self.measurements.read()?.measurement_by_name(name).is_some())
    }

    /// Names of all live measurements, sorted.
    pub fn measurement_names(&self) -> Result<Vec<String>, IndexError> {
        let ms = self.measurements.read()?;
        let mut names: Vec<String> = ms.iter().map(|m| m.name().to_string()).collect();
        names.sort();
        Ok(names)
    }

    pub fn has_tag_key(&self, name: &str, key: &str) -> Result<bool, IndexError> {
        Ok(self.measurements.read()?.has_tag_key(name, key))
    }

    pub fn has_tag_value(&self, name: &str, key: &str, value: &str) -> Result<bool, IndexError> {
        Ok(self.measurements.read()?.has_tag_value(name, key, value))
    }

    pub fn tag_keys(&self, name: &str) -> Result<TagKeyIterator, IndexError> {
        Ok(self
            .measurements
            .read()?
            .tag_keys(name)
            .unwrap_or_else(|| TagKeyIterator::new(Vec::new())))
    }

    pub fn tag_values(&self, name: &str, key: &str) -> Result<TagValueIterator, IndexError> {
        Ok(self
            .measurements
            .read()?
            .tag_values(name, key)
            .unwrap_or_else(|| TagValueIterator::new(Vec::new())))
    }

    fn with_measurement(
        &self,
        name: &str,
        f: impl FnOnce(&Measurement) -> SeriesIdSet,
    ) -> Result<SeriesIdSet, IndexError> {
        Ok(self
            .measurements
            .read()?
            .measurement_by_name(name)
            .map(f)
            .unwrap_or_default())
    }

    pub fn series_id_set(&self, name: &str) -> Result<SeriesIdSet, IndexError> {
        self.with_measurement(name, |m| m.series_id_set())
    }

    pub fn series_id_set_for_tag_key(
        &self,
        name: &str,
        key: &str,
    ) -> Result<SeriesIdSet, IndexError> {
        self.with_measurement(name, |m| m.series_id_set_for_tag_key(key))
    }

    pub fn series_id_set_for_tag_value(
        &self,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<SeriesIdSet, IndexError> {
        self.with_measurement(name, |m| m.series_id_set_for_tag_value(key, value))
    }

    pub fn matching_series_ids(&self, name: &str, tags: &Tags) -> Result<SeriesIdSet, IndexError> {
        self.with_measurement(name, |m| m.matching_series_ids(tags))
    }

    /// Series-file id recorded for an index id, if a series file was attached when it was
    /// created.
    pub fn series_file_id(&self, id: SeriesId) -> Result<Option<u64>, IndexError> {
        let (mid, local) = split_series_id(id);
        Ok(self.id_maps.read()?.get(&mid).and_then(|m| m.get(local)))
    }

    /// Copies every measurement's grids and id map. Each measurement is captured under its
    /// own grid index lock; there is no cross-measurement atomicity.
    fn snapshot(&self) -> Result<Vec<MeasurementSnapshot>, IndexError> {
        let ms = self.measurements.read()?;
        let id_maps = self.id_maps.read()?;
        Ok(ms
            .iter()
            .map(|m| MeasurementSnapshot {
                name: m.name().to_string(),
                measurement_id: m.id(),
                grids: m.grid_index().snapshot(),
                id_map: id_maps.get(&m.id()).cloned().unwrap_or_default(),
            })
            .collect())
    }

    /// Writes the current state as an index file to `w`. Returns the writer and byte count.
    pub fn compact_to<W: Write>(&self, w: W) -> Result<(W, u64), IndexError> {
        let snapshots = self.snapshot()?;
        let mut writer = IndexFileWriter::new(w);
        for mm in &snapshots {
            writer.add_measurement(mm)?;
        }
        writer.finish()
    }

    /// Writes the current state to `<dir>/L<level>-<file_id>.gidx` and returns its path.
    pub fn compact(&self, file_id: u64) -> Result<PathBuf, IndexError> {
        let start = Instant::now();
        let name = format_index_file_name(file_id, self.config.compaction_level);
        let final_path = self.config.dir.join(&name);
        let tmp_path = self.config.dir.join(format!(".tmp_{}", name));

        match self.write_index_file(&tmp_path, &final_path) {
            Ok((bytes, measurements)) => {
                index_metrics::record_compaction(start.elapsed(), bytes);
                self.emit(IndexEvent::IndexFileWritten {
                    path: final_path.clone(),
                    bytes,
                    measurements,
                });
                Ok(final_path)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                self.emit(IndexEvent::IndexFileWriteFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    // Atomic install: write to temp, fsync, rename, fsync dir.
    fn write_index_file(&self, tmp_path: &Path, final_path: &Path) -> Result<(u64, usize), IndexError> {
        let measurements = self.measurements.read()?.len();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)?;
        let (w, bytes) = self.compact_to(BufWriter::new(file))?;
        let file = w.into_inner().map_err(|e| IndexError::Io(e.into_error()))?;
        file.sync_data()?;
        drop(file);

        fs::rename(tmp_path, final_path)?;
        sync_dir(&self.config.dir)?;
        Ok((bytes, measurements))
    }
}

fn sync_dir(dir: &Path) -> Result<(), IndexError> {
    let d = File::open(dir)?;
    d.sync_data()?;
    Ok(())
}
