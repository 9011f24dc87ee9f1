use thiserror::Error;

use crate::models::ValidationError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),

    #[error("invalid collection name '{0}'")]
    InvalidCollectionName(String),

    #[error("item in collection '{collection}' is invalid: {reason}")]
    InvalidItem { collection: String, reason: String },

    #[error("resource {0} not found")]
    NotFound(String),

    #[error("resource {0} already exists")]
    Conflict(String),

    #[error("resource {0} changed since it was read")]
    PreconditionFailed(String),

    #[error("resource {0} has been deleted")]
    Deleted(String),

    #[error("resource {id}: '{field}' cannot change after creation")]
    ImmutableField { id: String, field: &'static str },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("state store backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Why a bootstrap run stopped. Collections created before the failure stay.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("could not obtain a handle to the state store database")]
    StoreUnavailable(#[source] StoreError),

    #[error("could not create collection '{collection}'")]
    BootstrapFailed {
        collection: String,
        #[source]
        source: StoreError,
    },
}
