use async_trait::async_trait;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, SqlitePool};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{item_keys, stamp_etag, CollectionSpec, DatabaseProxy, StateStore, StoreError, ETAG_FIELD};

const CATALOG_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS _collections (
    name TEXT PRIMARY KEY,
    partition_key_path TEXT NOT NULL,
    partition_kind TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// Collection names end up in DDL, so only plain identifiers are accepted.
fn checked_name(name: &str) -> Result<&str, StoreError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 128;
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidCollectionName(name.to_string()))
    }
}

/// A SQLite database; each collection is a table plus a row in `_collections`.
#[derive(Debug)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn partition_key_path(&self, collection: &str) -> Result<String, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT partition_key_path FROM _collections WHERE name = ?1",
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
    }

    pub async fn shutdown(&self) {
        info!("Shutting down state store connections...");
        self.pool.close().await;
    }
}

#[async_trait]
impl DatabaseProxy for SqliteDatabase {
    async fn create_collection_if_not_exists(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        let name = checked_name(spec.name())?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{name}" (
                partition_key TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (partition_key, id)
            )
            "#
        ))
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO _collections (name, partition_key_path, partition_kind) VALUES (?1, ?2, ?3)",
        )
        .bind(name)
        .bind(spec.partition_key_path())
        .bind(spec.partition_key.kind.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if inserted.rows_affected() > 0 {
            info!(collection = name, "Created collection");
        } else {
            debug!(collection = name, "Collection already exists");
        }
        Ok(())
    }

    async fn upsert_item(&self, collection: &str, mut item: serde_json::Value) -> Result<(), StoreError> {
        let name = checked_name(collection)?;
        let path = self.partition_key_path(name).await?;
        let (partition_key, id) = item_keys(name, &path, &item)?;
        stamp_etag(&mut item);
        let body = serde_json::to_string(&item)?;

        sqlx::query(&format!(
            r#"
            INSERT INTO "{name}" (partition_key, id, body) VALUES (?1, ?2, ?3)
            ON CONFLICT(partition_key, id) DO UPDATE SET body = excluded.body
            "#
        ))
        .bind(partition_key)
        .bind(id)
        .bind(body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_item(
        &self,
        collection: &str,
        mut item: serde_json::Value,
    ) -> Result<serde_json::Value, StoreError> {
        let name = checked_name(collection)?;
        let path = self.partition_key_path(name).await?;
        let (partition_key, id) = item_keys(name, &path, &item)?;
        stamp_etag(&mut item);
        let body = serde_json::to_string(&item)?;

        let inserted = sqlx::query(&format!(
            r#"INSERT INTO "{name}" (partition_key, id, body) VALUES (?1, ?2, ?3)"#
        ))
        .bind(partition_key)
        .bind(&id)
        .bind(body)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(item),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Conflict(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_item(
        &self,
        collection: &str,
        mut item: serde_json::Value,
        if_match: &str,
    ) -> Result<serde_json::Value, StoreError> {
        let name = checked_name(collection)?;
        let path = self.partition_key_path(name).await?;
        let (partition_key, id) = item_keys(name, &path, &item)?;
        stamp_etag(&mut item);
        let body = serde_json::to_string(&item)?;

        // Compare and write in one statement so a concurrent writer cannot
        // slip in between.
        let updated = sqlx::query(&format!(
            r#"
            UPDATE "{name}" SET body = ?3
            WHERE partition_key = ?1 AND id = ?2
              AND COALESCE(json_extract(body, '$.{ETAG_FIELD}'), '') = ?4
            "#
        ))
        .bind(&partition_key)
        .bind(&id)
        .bind(body)
        .bind(if_match)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(item);
        }
        if self.read_item(name, &partition_key, &id).await?.is_some() {
            Err(StoreError::PreconditionFailed(id))
        } else {
            Err(StoreError::NotFound(id))
        }
    }

    async fn read_item(
        &self,
        collection: &str,
        partition_key: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let name = checked_name(collection)?;
        self.partition_key_path(name).await?;

        let body = sqlx::query_scalar::<_, String>(&format!(
            r#"SELECT body FROM "{name}" WHERE partition_key = ?1 AND id = ?2"#
        ))
        .bind(partition_key)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
            .transpose()
    }

    async fn list_items(&self, collection: &str) -> Result<Vec<serde_json::Value>, StoreError> {
        let name = checked_name(collection)?;
        self.partition_key_path(name).await?;

        let bodies = sqlx::query_scalar::<_, String>(&format!(
            r#"SELECT body FROM "{name}" ORDER BY partition_key, id"#
        ))
        .fetch_all(&self.pool)
        .await?;

        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(StoreError::from))
            .collect()
    }
}

/// State store persisted in a SQLite file. The database is created on first
/// use if it does not exist yet.
#[derive(Debug)]
pub struct SqliteStateStore {
    database_url: String,
    max_connections: u32,
    database: OnceCell<Arc<SqliteDatabase>>,
}

impl SqliteStateStore {
    pub fn new(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: max_connections.max(1),
            database: OnceCell::new(),
        }
    }

    async fn connect(&self) -> Result<Arc<SqliteDatabase>, StoreError> {
        let unavailable = |e: sqlx::Error| StoreError::Unavailable(e.to_string());

        if !sqlx::Sqlite::database_exists(&self.database_url)
            .await
            .map_err(unavailable)?
        {
            info!("Creating state store database at {}", self.database_url);
            sqlx::Sqlite::create_database(&self.database_url)
                .await
                .map_err(unavailable)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
            .map_err(unavailable)?;

        sqlx::query(CATALOG_DDL)
            .execute(&pool)
            .await
            .map_err(unavailable)?;

        Ok(Arc::new(SqliteDatabase { pool }))
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn database_proxy(&self) -> Result<Arc<dyn DatabaseProxy>, StoreError> {
        let database = self
            .database
            .get_or_try_init(|| self.connect())
            .await?;
        Ok(Arc::clone(database) as Arc<dyn DatabaseProxy>)
    }
}
