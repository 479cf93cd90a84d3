use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

/// Result alias of the MongoDB backend.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Failures of the MongoDB backend before they are folded into storage errors.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Connection string was rejected by the driver.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Offending connection string.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Client could not be built from the parsed options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Server did not answer the ping of a new connection.
    #[error("MongoDB server did not answer the connection ping")]
    Unreachable {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Periodic health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed at startup.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection involved.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Query failed.
    #[error("failed to read from collection `{collection}`")]
    Read {
        /// Collection involved.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Insert or replace failed.
    #[error("failed to write `{id}` to collection `{collection}`")]
    Write {
        /// Collection involved.
        collection: &'static str,
        /// Document key.
        id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Stored document cannot be mapped to an entity.
    #[error("document `{id}` in collection `{collection}` is malformed")]
    CorruptDocument {
        /// Collection involved.
        collection: &'static str,
        /// Document key.
        id: String,
    },
    /// Versioned replace matched no document.
    #[error("{entity} `{id}` was modified concurrently")]
    VersionConflict {
        /// Kind of record.
        entity: &'static str,
        /// Document key.
        id: String,
    },
    /// Unique index rejected the write.
    #[error("{entity} `{id}` already exists")]
    Duplicate {
        /// Kind of record.
        entity: &'static str,
        /// Document key.
        id: String,
    },
}

/// Whether a write failed on a unique index.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}
