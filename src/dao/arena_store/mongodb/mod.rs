mod config;
mod error;
mod models;
/// Store implementation over the MongoDB collections.
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoArenaStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::VersionConflict { entity, id } => {
                StorageError::version_conflict(entity, id)
            }
            MongoDaoError::Duplicate { entity, id } => StorageError::duplicate(entity, id),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
