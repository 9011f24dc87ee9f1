use std::sync::Arc;
use tracing::{debug, error, info};

use super::{required_collections, BootstrapError, CollectionSpec, DatabaseProxy, StateStore, StoreError};

/// Makes sure every required collection exists before the store is used.
///
/// Returns `false` when the database handle cannot be obtained or any single
/// collection cannot be created; the failure is logged once and the remaining
/// collections are skipped. Nothing is rolled back, so a later run picks up
/// where this one stopped. Callers treat `false` as fatal for serving traffic.
pub async fn bootstrap_database(store: &dyn StateStore) -> bool {
    let collections = required_collections();
    match try_bootstrap(store, &collections).await {
        Ok(_) => {
            info!(collections = collections.len(), "State store bootstrap complete");
            true
        }
        Err(e) => {
            error!(error = %e, cause = %error_chain(&e), "Could not bootstrap database");
            false
        }
    }
}

/// Same as [`bootstrap_database`] but reports the typed failure and does not log it.
pub async fn try_bootstrap(
    store: &dyn StateStore,
    collections: &[CollectionSpec],
) -> Result<Arc<dyn DatabaseProxy>, BootstrapError> {
    let proxy = store
        .database_proxy()
        .await
        .map_err(BootstrapError::StoreUnavailable)?;

    for spec in collections {
        create_collection_if_not_exists(proxy.as_ref(), spec.name(), spec.partition_key_path())
            .await
            .map_err(|source| BootstrapError::BootstrapFailed {
                collection: spec.name().to_string(),
                source,
            })?;
    }

    Ok(proxy)
}

/// Issues one create-if-not-exists call with a hash-partitioned key.
pub async fn create_collection_if_not_exists(
    proxy: &dyn DatabaseProxy,
    name: &str,
    partition_key_path: &str,
) -> Result<(), StoreError> {
    let spec = CollectionSpec::new(name, partition_key_path);
    debug!(collection = name, partition_key = partition_key_path, "Ensuring collection exists");
    proxy.create_collection_if_not_exists(&spec).await
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MockDatabaseProxy, MockStateStore, PartitionKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for ErrorCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn store_returning(proxy: MockDatabaseProxy) -> MockStateStore {
        let proxy: Arc<dyn DatabaseProxy> = Arc::new(proxy);
        let mut store = MockStateStore::new();
        store
            .expect_database_proxy()
            .times(1)
            .returning(move || Ok(Arc::clone(&proxy)));
        store
    }

    #[tokio::test]
    async fn test_bootstrap_database_success() {
        let mut proxy = MockDatabaseProxy::new();
        proxy
            .expect_create_collection_if_not_exists()
            .times(5)
            .returning(|_| Ok(()));

        let store = store_returning(proxy);

        assert!(bootstrap_database(&store).await);
    }

    #[tokio::test]
    async fn test_bootstrap_database_failure_logs_once() {
        let counter = ErrorCounter::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut store = MockStateStore::new();
        store
            .expect_database_proxy()
            .times(1)
            .returning(|| Err(StoreError::Unavailable("Test exception".to_string())));

        assert!(!bootstrap_database(&store).await);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handle_failure_issues_no_creates() {
        let mut store = MockStateStore::new();
        store
            .expect_database_proxy()
            .times(1)
            .returning(|| Err(StoreError::Unavailable("connection refused".to_string())));

        let err = try_bootstrap(&store, &required_collections())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BootstrapError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_collection_failure_aborts_remaining_creates() {
        let mut proxy = MockDatabaseProxy::new();
        proxy
            .expect_create_collection_if_not_exists()
            .withf(|spec| spec.name() == "Resources" || spec.name() == "ResourceTemplates")
            .times(2)
            .returning(|_| Ok(()));
        proxy
            .expect_create_collection_if_not_exists()
            .withf(|spec| spec.name() == "Operations")
            .times(1)
            .returning(|_| Err(StoreError::Backend("throttled".to_string())));

        let store = store_returning(proxy);

        let err = try_bootstrap(&store, &required_collections())
            .await
            .err()
            .unwrap();
        match err {
            BootstrapError::BootstrapFailed { collection, .. } => assert_eq!(collection, "Operations"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_collection_if_not_exists_shape() {
        let mut proxy = MockDatabaseProxy::new();
        proxy
            .expect_create_collection_if_not_exists()
            .withf(|spec| {
                spec.id == "test_container"
                    && spec.partition_key.paths == vec!["/test".to_string()]
                    && spec.partition_key.kind == PartitionKind::Hash
            })
            .times(1)
            .returning(|_| Ok(()));

        create_collection_if_not_exists(&proxy, "test_container", "/test")
            .await
            .unwrap();
    }

    #[test]
    fn test_error_chain_includes_source() {
        let err = BootstrapError::BootstrapFailed {
            collection: "Operations".to_string(),
            source: StoreError::Backend("throttled".to_string()),
        };
        assert_eq!(
            error_chain(&err),
            "could not create collection 'Operations': state store backend error: throttled"
        );
    }
}
