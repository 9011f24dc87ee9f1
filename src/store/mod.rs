//! Durable state store access.
//!
//! The store is reached through two capability traits so callers (and tests)
//! never depend on a concrete backend:
//!
//! * [`StateStore`] hands out a [`DatabaseProxy`] for the logical database.
//! * [`DatabaseProxy`] exposes the idempotent create-if-not-exists primitive
//!   plus the item operations the repository needs.
//!
//! Every write stamps a fresh `_etag` on the item. `create_item` and
//! `replace_item` check existence and the etag atomically inside the backend,
//! so concurrent writers cannot silently overwrite each other.
//!
//! Two backends ship with the crate: [`MemoryStateStore`] and, behind the
//! `database` feature, `SqliteStateStore`.

use async_trait::async_trait;
use std::sync::Arc;

pub mod bootstrap;
pub mod collection;
pub mod error;
pub mod memory;
pub mod repository;
#[cfg(feature = "database")]
pub mod sqlite;

pub use bootstrap::{bootstrap_database, create_collection_if_not_exists, try_bootstrap};
pub use collection::{
    partition_key_value, required_collections, CollectionSpec, PartitionKeyDefinition,
    PartitionKind, DEFAULT_PARTITION_KEY_PATH, OPERATIONS_COLLECTION,
    RESOURCES_COLLECTION, RESOURCE_TEMPLATES_COLLECTION, SHARED_SERVICE_TEMPLATES_COLLECTION,
    USER_RESOURCE_TEMPLATES_COLLECTION,
};
pub use error::{BootstrapError, StoreError};
pub use memory::MemoryStateStore;
pub use repository::ResourceRepository;
#[cfg(feature = "database")]
pub use sqlite::SqliteStateStore;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::config::{StateStoreConfig, StoreBackend};

/// Entry point to a store: yields a proxy for the logical database,
/// creating the database first if the backend supports that.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn database_proxy(&self) -> Result<Arc<dyn DatabaseProxy>, StoreError>;
}

/// Operations against one logical database.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait DatabaseProxy: Send + Sync {
    /// Creates the collection unless it already exists. Must be safe to call
    /// any number of times with the same arguments and must never truncate or
    /// recreate an existing collection.
    async fn create_collection_if_not_exists(&self, spec: &CollectionSpec) -> Result<(), StoreError>;

    /// Inserts or replaces an item. The item must carry a string `id` and a
    /// value at the collection's partition-key path.
    async fn upsert_item(&self, collection: &str, item: serde_json::Value) -> Result<(), StoreError>;

    /// Inserts an item that must not exist yet; `Conflict` otherwise.
    /// Returns the stored item with its etag.
    async fn create_item(
        &self,
        collection: &str,
        item: serde_json::Value,
    ) -> Result<serde_json::Value, StoreError>;

    /// Replaces an existing item only while its stored etag equals `if_match`
    /// (an item without an etag matches the empty string). `NotFound` when
    /// the item is gone, `PreconditionFailed` when it changed.
    async fn replace_item(
        &self,
        collection: &str,
        item: serde_json::Value,
        if_match: &str,
    ) -> Result<serde_json::Value, StoreError>;

    async fn read_item(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    async fn list_items(&self, collection: &str) -> Result<Vec<serde_json::Value>, StoreError>;
}

/// Opens the configured backend. Nothing is connected until the first
/// [`StateStore::database_proxy`] call.
pub fn open_state_store(config: &StateStoreConfig) -> Result<Arc<dyn StateStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStateStore::new(config.database_name.clone()))),
        #[cfg(feature = "database")]
        StoreBackend::Sqlite => Ok(Arc::new(SqliteStateStore::new(
            config.url.clone(),
            config.max_connections,
        ))),
        #[cfg(not(feature = "database"))]
        StoreBackend::Sqlite => Err(StoreError::Unavailable(
            "sqlite backend requires the `database` feature".to_string(),
        )),
    }
}

pub const ETAG_FIELD: &str = "_etag";

/// The etag stored on an item, empty when it has none.
pub(crate) fn etag_of(item: &serde_json::Value) -> &str {
    item.get(ETAG_FIELD).and_then(|v| v.as_str()).unwrap_or_default()
}

pub(crate) fn stamp_etag(item: &mut serde_json::Value) {
    if let Some(fields) = item.as_object_mut() {
        fields.insert(
            ETAG_FIELD.to_string(),
            serde_json::Value::String(uuid::Uuid::new_v4().to_string()),
        );
    }
}

/// Checks the item shape shared by every backend and returns `(partition_key, id)`.
pub(crate) fn item_keys(
    collection: &str,
    partition_key_path: &str,
    item: &serde_json::Value,
) -> Result<(String, String), StoreError> {
    let invalid = |reason: String| StoreError::InvalidItem {
        collection: collection.to_string(),
        reason,
    };
    let id = item
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| invalid("missing string 'id'".to_string()))?
        .to_string();
    let partition_key = partition_key_value(item, partition_key_path)
        .ok_or_else(|| invalid(format!("no value at partition key path '{partition_key_path}'")))?;
    Ok((partition_key, id))
}
