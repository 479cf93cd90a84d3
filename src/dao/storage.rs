use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or failed the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What the backend was doing.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A compare-and-swap update found a different version than expected.
    #[error("{entity} `{id}` was modified concurrently")]
    VersionConflict {
        /// Kind of aggregate.
        entity: &'static str,
        /// Aggregate key.
        id: String,
    },
    /// An insert collided with a unique key.
    #[error("{entity} `{id}` already exists")]
    Duplicate {
        /// Kind of record.
        entity: &'static str,
        /// Colliding key.
        id: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// A lost compare-and-swap on `entity` `id`.
    pub fn version_conflict(entity: &'static str, id: impl ToString) -> Self {
        StorageError::VersionConflict {
            entity,
            id: id.to_string(),
        }
    }

    /// A unique key collision on `entity` `id`.
    pub fn duplicate(entity: &'static str, id: impl ToString) -> Self {
        StorageError::Duplicate {
            entity,
            id: id.to_string(),
        }
    }
}
