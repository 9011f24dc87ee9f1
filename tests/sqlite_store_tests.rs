//! SQLite backend tests. Run with `--features database`.
#![cfg(feature = "database")]

use serde_json::json;
use tempfile::TempDir;
use tre_controlplane::models::{Resource, ResourceType};
use tre_controlplane::store::{
    bootstrap_database, CollectionSpec, ResourceRepository, SqliteStateStore, StateStore,
    StoreError,
};

fn store_in(dir: &TempDir) -> SqliteStateStore {
    let url = format!("sqlite://{}", dir.path().join("state.db").display());
    SqliteStateStore::new(url, 2)
}

#[tokio::test]
async fn test_bootstrap_creates_database_file_and_tables() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    assert!(bootstrap_database(&store).await);
    assert!(dir.path().join("state.db").exists());

    // Second process start against the same file
    let again = store_in(&dir);
    assert!(bootstrap_database(&again).await);
}

#[tokio::test]
async fn test_data_survives_rebootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    assert!(bootstrap_database(&store).await);

    let repo = ResourceRepository::new(store.database_proxy().await.unwrap());
    repo.create(Resource::new("ws-1", ResourceType::Workspace))
        .await
        .unwrap();

    let reopened = store_in(&dir);
    assert!(bootstrap_database(&reopened).await);
    let repo = ResourceRepository::new(reopened.database_proxy().await.unwrap());
    assert_eq!(repo.get("ws-1").await.unwrap().id(), "ws-1");
}

#[tokio::test]
async fn test_create_keeps_first_partition_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let proxy = store.database_proxy().await.unwrap();

    proxy
        .create_collection_if_not_exists(&CollectionSpec::new("Things", "/tenant"))
        .await
        .unwrap();
    proxy
        .create_collection_if_not_exists(&CollectionSpec::new("Things", "/id"))
        .await
        .unwrap();

    // Still partitioned on /tenant: an item without it is rejected
    let err = proxy
        .upsert_item("Things", json!({"id": "a"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidItem { .. }));

    proxy
        .upsert_item("Things", json!({"id": "a", "tenant": "t1", "v": 1}))
        .await
        .unwrap();
    proxy
        .upsert_item("Things", json!({"id": "a", "tenant": "t1", "v": 2}))
        .await
        .unwrap();
    let item = proxy.read_item("Things", "t1", "a").await.unwrap().unwrap();
    assert_eq!(item["v"], 2);
    assert_eq!(proxy.list_items("Things").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_create_is_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    assert!(bootstrap_database(&store).await);
    let repo = ResourceRepository::new(store.database_proxy().await.unwrap());

    repo.create(Resource::new("ws-1", ResourceType::Workspace))
        .await
        .unwrap();
    assert!(matches!(
        repo.create(Resource::new("ws-1", ResourceType::SharedService)).await,
        Err(StoreError::Conflict(id)) if id == "ws-1"
    ));
    assert_eq!(
        repo.get("ws-1").await.unwrap().resource_type(),
        ResourceType::Workspace
    );
}

#[tokio::test]
async fn test_replace_checks_the_stored_version() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    assert!(bootstrap_database(&store).await);
    let repo = ResourceRepository::new(store.database_proxy().await.unwrap());
    repo.create(Resource::new("svc-1", ResourceType::WorkspaceService))
        .await
        .unwrap();

    let stale = repo.get("svc-1").await.unwrap();
    let fresh = repo.get("svc-1").await.unwrap();
    repo.update(fresh).await.unwrap();
    assert!(matches!(
        repo.update(stale.clone()).await,
        Err(StoreError::PreconditionFailed(_))
    ));

    repo.soft_delete("svc-1").await.unwrap();
    assert!(matches!(
        repo.update(stale).await,
        Err(StoreError::Deleted(_))
    ));
    assert!(!repo.get("svc-1").await.unwrap().is_active());

    let proxy = store.database_proxy().await.unwrap();
    assert!(matches!(
        proxy
            .replace_item("Resources", json!({"id": "missing"}), "")
            .await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_unsafe_collection_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = store_in(&dir).database_proxy().await.unwrap();

    let err = proxy
        .create_collection_if_not_exists(&CollectionSpec::new("x\"; DROP TABLE _collections; --", "/id"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidCollectionName(_)));
}

#[tokio::test]
async fn test_unreachable_location_fails_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}",
        dir.path().join("missing-dir").join("state.db").display()
    );
    assert!(!bootstrap_database(&SqliteStateStore::new(url, 1)).await);
}
