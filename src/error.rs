use thiserror::Error;

/// Error type for grid index operations.
///
/// Capacity exhaustion inside a grid and malformed queries are not errors: they show up as
/// `None`, `false` or an empty id set. Only structural problems reach the caller.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Measurement not found: {0}")]
    MeasurementNotFound(String),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corruption detected: {details}")]
    Corruption {
        details: String,
        measurement: Option<String>,
    },

    #[error("Unsupported {what} version: {version}")]
    UnsupportedVersion { what: &'static str, version: u16 },

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    /// A grid-local id or a measurement id no longer fits in its 32-bit half of the series id.
    #[error("Series id space exhausted for measurement {measurement}: id={id}")]
    IdSpaceExhausted { measurement: String, id: u64 },

    #[error("Series file error: {0}")]
    SeriesFile(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IndexError {
    pub(crate) fn corruption(details: impl Into<String>) -> Self {
        IndexError::Corruption {
            details: details.into(),
            measurement: None,
        }
    }

    /// Attaches the measurement name to a corruption error; other variants pass through.
    pub(crate) fn in_measurement(self, name: &str) -> Self {
        match self {
            IndexError::Corruption {
                details,
                measurement: None,
            } => IndexError::Corruption {
                details,
                measurement: Some(name.to_string()),
            },
            other => other,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for IndexError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        IndexError::LockError(format!("RwLock poisoned: {}", err))
    }
}
