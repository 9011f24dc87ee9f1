use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{etag_of, item_keys, stamp_etag, CollectionSpec, DatabaseProxy, StateStore, StoreError};

#[derive(Debug)]
struct MemoryCollection {
    spec: CollectionSpec,
    items: BTreeMap<(String, String), serde_json::Value>,
}

/// In-process database. Collection creation happens under the write lock, so
/// concurrent create-if-not-exists calls for one name yield one collection.
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryDatabase {
    fn new(name: String) -> Self {
        Self {
            name,
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn collection_spec(&self, name: &str) -> Option<CollectionSpec> {
        self.collections
            .read()
            .await
            .get(name)
            .map(|c| c.spec.clone())
    }

    pub async fn item_count(&self, name: &str) -> usize {
        self.collections
            .read()
            .await
            .get(name)
            .map(|c| c.items.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DatabaseProxy for MemoryDatabase {
    async fn create_collection_if_not_exists(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(spec.name()) {
            debug!(collection = spec.name(), "Collection already exists");
            return Ok(());
        }
        collections.insert(
            spec.name().to_string(),
            MemoryCollection {
                spec: spec.clone(),
                items: BTreeMap::new(),
            },
        );
        debug!(collection = spec.name(), "Created collection");
        Ok(())
    }

    async fn upsert_item(&self, collection: &str, mut item: serde_json::Value) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        let keys = item_keys(collection, target.spec.partition_key_path(), &item)?;
        stamp_etag(&mut item);
        target.items.insert(keys, item);
        Ok(())
    }

    async fn create_item(
        &self,
        collection: &str,
        mut item: serde_json::Value,
    ) -> Result<serde_json::Value, StoreError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        let keys = item_keys(collection, target.spec.partition_key_path(), &item)?;
        if target.items.contains_key(&keys) {
            return Err(StoreError::Conflict(keys.1));
        }
        stamp_etag(&mut item);
        target.items.insert(keys, item.clone());
        Ok(item)
    }

    async fn replace_item(
        &self,
        collection: &str,
        mut item: serde_json::Value,
        if_match: &str,
    ) -> Result<serde_json::Value, StoreError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        let keys = item_keys(collection, target.spec.partition_key_path(), &item)?;
        let current = target
            .items
            .get(&keys)
            .ok_or_else(|| StoreError::NotFound(keys.1.clone()))?;
        if etag_of(current) != if_match {
            return Err(StoreError::PreconditionFailed(keys.1));
        }
        stamp_etag(&mut item);
        target.items.insert(keys, item.clone());
        Ok(item)
    }

    async fn read_item(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(target
            .items
            .get(&(partition_key.to_string(), id.to_string()))
            .cloned())
    }

    async fn list_items(&self, collection: &str) -> Result<Vec<serde_json::Value>, StoreError> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(target.items.values().cloned().collect())
    }
}

/// Store backed by a single shared [`MemoryDatabase`].
#[derive(Debug, Clone)]
pub struct MemoryStateStore {
    database: Arc<MemoryDatabase>,
}

impl MemoryStateStore {
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database: Arc::new(MemoryDatabase::new(database_name.into())),
        }
    }

    /// Direct access for inspection; normal callers go through [`StateStore`].
    pub fn database(&self) -> Arc<MemoryDatabase> {
        Arc::clone(&self.database)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn database_proxy(&self) -> Result<Arc<dyn DatabaseProxy>, StoreError> {
        Ok(self.database.clone() as Arc<dyn DatabaseProxy>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_is_idempotent_and_keeps_items() {
        let store = MemoryStateStore::new("tre");
        let db = store.database();
        let spec = CollectionSpec::new("Resources", "/id");

        db.create_collection_if_not_exists(&spec).await.unwrap();
        db.upsert_item("Resources", json!({"id": "r-1", "resourceType": "workspace"}))
            .await
            .unwrap();

        db.create_collection_if_not_exists(&spec).await.unwrap();
        db.create_collection_if_not_exists(&spec).await.unwrap();

        assert_eq!(db.collection_names().await, vec!["Resources".to_string()]);
        assert_eq!(db.item_count("Resources").await, 1);
    }

    #[tokio::test]
    async fn test_recreate_with_other_path_keeps_first_definition() {
        let store = MemoryStateStore::new("tre");
        let db = store.database();

        db.create_collection_if_not_exists(&CollectionSpec::new("Operations", "/id"))
            .await
            .unwrap();
        db.create_collection_if_not_exists(&CollectionSpec::new("Operations", "/resourceId"))
            .await
            .unwrap();

        let spec = db.collection_spec("Operations").await.unwrap();
        assert_eq!(spec.partition_key_path(), "/id");
    }

    #[tokio::test]
    async fn test_upsert_into_missing_collection_fails() {
        let store = MemoryStateStore::new("tre");
        let err = store
            .database()
            .upsert_item("Nope", json!({"id": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CollectionNotFound(name) if name == "Nope"));
    }

    #[tokio::test]
    async fn test_items_without_partition_value_are_rejected() {
        let store = MemoryStateStore::new("tre");
        let db = store.database();
        db.create_collection_if_not_exists(&CollectionSpec::new("Operations", "/resourceId"))
            .await
            .unwrap();

        let err = db
            .upsert_item("Operations", json!({"id": "op-1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidItem { .. }));

        db.upsert_item("Operations", json!({"id": "op-1", "resourceId": "ws-1"}))
            .await
            .unwrap();
        let read = db.read_item("Operations", "ws-1", "op-1").await.unwrap();
        assert_eq!(read.unwrap()["resourceId"], "ws-1");
    }

    #[tokio::test]
    async fn test_create_item_refuses_existing_key() {
        let store = MemoryStateStore::new("tre");
        let db = store.database();
        db.create_collection_if_not_exists(&CollectionSpec::new("Resources", "/id"))
            .await
            .unwrap();

        let stored = db
            .create_item("Resources", json!({"id": "r-1", "resourceType": "workspace"}))
            .await
            .unwrap();
        assert!(!etag_of(&stored).is_empty());

        let err = db
            .create_item("Resources", json!({"id": "r-1", "resourceType": "shared-service"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(id) if id == "r-1"));
        let kept = db.read_item("Resources", "r-1", "r-1").await.unwrap().unwrap();
        assert_eq!(kept["resourceType"], "workspace");
    }

    #[tokio::test]
    async fn test_replace_item_requires_current_etag() {
        let store = MemoryStateStore::new("tre");
        let db = store.database();
        db.create_collection_if_not_exists(&CollectionSpec::new("Resources", "/id"))
            .await
            .unwrap();
        let first = db
            .create_item("Resources", json!({"id": "r-1", "v": 1}))
            .await
            .unwrap();
        let etag = etag_of(&first).to_string();

        let second = db
            .replace_item("Resources", json!({"id": "r-1", "v": 2}), &etag)
            .await
            .unwrap();
        assert_ne!(etag_of(&second), etag);

        let err = db
            .replace_item("Resources", json!({"id": "r-1", "v": 3}), &etag)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed(_)));

        let err = db
            .replace_item("Resources", json!({"id": "r-2"}), "")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_one_collection() {
        let store = MemoryStateStore::new("tre");
        let spec = CollectionSpec::new("Resources", "/id");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let spec = spec.clone();
                tokio::spawn(async move {
                    let proxy = store.database_proxy().await.unwrap();
                    proxy.create_collection_if_not_exists(&spec).await
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }
        assert_eq!(store.database().collection_names().await.len(), 1);
    }
}
