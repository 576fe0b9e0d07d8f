use std::path::PathBuf;
use std::sync::Arc;

/// Structured, in-process event hook for observability.
///
/// The index is a library and never prints. Callers provide an implementation that forwards
/// these events to `tracing`, `log`, metrics, or custom sinks.
pub trait IndexEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: IndexEvent);
}

/// Structured events emitted by [`crate::Index`].
#[derive(Debug, Clone)]
pub enum IndexEvent {
    MeasurementCreated { name: String, measurement_id: u64 },
    MeasurementDropped { name: String, measurement_id: u64 },

    IndexFileWritten {
        path: PathBuf,
        bytes: u64,
        measurements: usize,
    },
    IndexFileWriteFailed { error: String },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl IndexEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: IndexEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn IndexEventListener> {
    Arc::new(NoopEventListener)
}

/// Metrics instrumentation through the `metrics` facade.
///
/// Recording is effectively a no-op until the host process installs a recorder.
pub mod index_metrics {
    use ::metrics::{describe_counter, describe_histogram, Unit};
    use std::time::Duration;

    // Counters are exposed as `<name>_total` by the Prometheus exporter.
    pub const SERIES_CREATED: &str = "tsgrid_series_created";
    pub const GRIDS_CREATED: &str = "tsgrid_grids_created";
    pub const INDEX_FILE_BYTES_WRITTEN: &str = "tsgrid_index_file_bytes_written";

    pub const COMPACTION_DURATION_SECONDS: &str = "tsgrid_compaction_duration_seconds";
    pub const RESTORE_DURATION_SECONDS: &str = "tsgrid_index_file_restore_duration_seconds";

    #[inline]
    pub fn record_series_created() {
        ::metrics::counter!(SERIES_CREATED).increment(1);
    }

    #[inline]
    pub fn record_grid_created() {
        ::metrics::counter!(GRIDS_CREATED).increment(1);
    }

    #[inline]
    pub fn record_compaction(duration: Duration, bytes: u64) {
        ::metrics::histogram!(COMPACTION_DURATION_SECONDS).record(duration.as_secs_f64());
        if bytes > 0 {
            ::metrics::counter!(INDEX_FILE_BYTES_WRITTEN).increment(bytes);
        }
    }

    #[inline]
    pub fn record_restore(duration: Duration) {
        ::metrics::histogram!(RESTORE_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Registers descriptions and units with the installed recorder.
    pub fn describe() {
        describe_counter!(
            SERIES_CREATED,
            Unit::Count,
            "Series newly assigned an id by a grid index."
        );
        describe_counter!(
            GRIDS_CREATED,
            Unit::Count,
            "Grids created because no existing grid could accept a tag set."
        );
        describe_counter!(
            INDEX_FILE_BYTES_WRITTEN,
            Unit::Bytes,
            "Bytes written to index files by compaction."
        );
        describe_histogram!(
            COMPACTION_DURATION_SECONDS,
            Unit::Seconds,
            "Time to snapshot, encode and durably install an index file."
        );
        describe_histogram!(
            RESTORE_DURATION_SECONDS,
            Unit::Seconds,
            "Time to read an index file and parse its measurement block."
        );
    }
}
