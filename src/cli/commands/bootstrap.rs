use anyhow::Result;
use tracing::error;

use super::Command;
use crate::config::TreConfig;
use crate::store::{bootstrap_database, open_state_store};

pub struct BootstrapCommand;

impl Command for BootstrapCommand {
    async fn execute(&self, config: &TreConfig) -> Result<bool> {
        if !config.state_store.backend.is_durable() {
            error!(
                backend = ?config.state_store.backend,
                "Refusing to bootstrap a store that does not outlive this process"
            );
            println!(
                "❌ State store backend {:?} is process-local; configure `state_store.backend = \"sqlite\"` to bootstrap",
                config.state_store.backend
            );
            return Ok(false);
        }

        let store = open_state_store(&config.state_store)?;
        let ok = bootstrap_database(store.as_ref()).await;
        if ok {
            println!("✅ State store '{}' is ready", config.state_store.database_name);
        } else {
            println!("❌ State store bootstrap failed, see the log for the cause");
        }
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;

    #[tokio::test]
    async fn test_memory_backend_is_refused() {
        let mut config = TreConfig::default();
        config.state_store.backend = StoreBackend::Memory;
        assert!(!BootstrapCommand.execute(&config).await.unwrap());
    }

    #[cfg(not(feature = "database"))]
    #[tokio::test]
    async fn test_sqlite_without_feature_is_an_error() {
        let config = TreConfig::default();
        let err = BootstrapCommand.execute(&config).await.unwrap_err();
        assert!(err.to_string().contains("`database` feature"));
    }

    #[cfg(feature = "database")]
    #[tokio::test]
    async fn test_sqlite_backend_bootstraps_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TreConfig::default();
        config.state_store.url = format!("sqlite://{}", dir.path().join("state.db").display());

        assert!(BootstrapCommand.execute(&config).await.unwrap());
        assert!(dir.path().join("state.db").exists());
    }
}
