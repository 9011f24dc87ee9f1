use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::identity::CloudEnvironment;

/// Main configuration structure for the control plane
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TreConfig {
    /// Core API used to read workspaces
    pub api: ApiConfig,
    /// Identity provider and service credential
    pub identity: IdentityConfig,
    /// Timeouts applied to every outbound HTTP call
    pub http: HttpConfig,
    /// Durable state store
    pub state_store: StateStoreConfig,
    /// Role-grant reconciliation settings
    pub reconciliation: ReconciliationConfig,
    /// Workspace auth-config cache
    pub auth_config: AuthConfigCacheConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL of the core API, without trailing slash
    pub base_url: String,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
    /// Directory (tenant) id
    pub tenant_id: String,
    /// Application (client) id of this service's credential
    pub client_id: String,
    /// Client secret (can be set via env var)
    pub client_secret: Option<String>,
    /// Sovereign cloud the tenant lives in
    pub cloud: CloudEnvironment,
    /// Overrides the cloud's login host, e.g. for a private authority
    pub authority_host: Option<String>,
    /// Overrides the cloud's Graph base URL
    pub graph_base_url: Option<String>,
    /// Rate limiting for Graph calls
    pub rate_limit: RateLimitConfig,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("cloud", &self.cloud)
            .field("authority_host", &self.authority_host)
            .field("graph_base_url", &self.graph_base_url)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl IdentityConfig {
    pub fn authority_host(&self) -> String {
        self.authority_host
            .clone()
            .unwrap_or_else(|| self.cloud.authority_host().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn graph_base_url(&self) -> String {
        self.graph_base_url
            .clone()
            .unwrap_or_else(|| self.cloud.graph_endpoint().to_string())
            .trim_end_matches('/')
            .to_string()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Burst capacity
    pub burst_capacity: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Connect timeout
    pub connect_timeout_seconds: u64,
    /// Overall request timeout, covers reading the body
    pub read_timeout_seconds: u64,
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, gone on exit. Useful for tests and dry runs only.
    Memory,
    Sqlite,
}

impl StoreBackend {
    pub fn is_durable(&self) -> bool {
        !matches!(self, StoreBackend::Memory)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateStoreConfig {
    /// Which backend to use
    pub backend: StoreBackend,
    /// Logical database name
    pub database_name: String,
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconciliationConfig {
    /// Upper bound on any single workflow step
    pub step_timeout_seconds: u64,
}

impl ReconciliationConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfigCacheConfig {
    /// How long a resolved workspace auth config is reused
    pub ttl_seconds: u64,
    /// Maximum cached workspaces
    pub max_capacity: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TreConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:8000".to_string(),
            },
            identity: IdentityConfig {
                tenant_id: String::new(),
                client_id: String::new(),
                client_secret: None, // Will be read from env var
                cloud: CloudEnvironment::AzureCloud,
                authority_host: None,
                graph_base_url: None,
                rate_limit: RateLimitConfig {
                    requests_per_second: 10,
                    burst_capacity: 20,
                },
            },
            http: HttpConfig {
                connect_timeout_seconds: 10,
                read_timeout_seconds: 30,
            },
            state_store: StateStoreConfig {
                backend: StoreBackend::Sqlite,
                database_name: "AzureTRE".to_string(),
                url: "sqlite://tre-controlplane-state.db".to_string(),
                max_connections: 5,
            },
            reconciliation: ReconciliationConfig {
                step_timeout_seconds: 45,
            },
            auth_config: AuthConfigCacheConfig {
                ttl_seconds: 300, // 5 minutes
                max_capacity: 1000,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json: false,
            },
        }
    }
}

impl TreConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (tre-controlplane.toml, .tre-controlplane-rc)
    /// 3. Environment variables (prefixed with TRE__, nested with __)
    /// 4. Legacy variables for anything still unset
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new("tre-controlplane.toml").exists() {
            builder = builder.add_source(File::with_name("tre-controlplane"));
        }

        if Path::new(".tre-controlplane-rc").exists() {
            builder = builder.add_source(
                File::with_name(".tre-controlplane-rc").format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("TRE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut tre_config: TreConfig = builder.build()?.try_deserialize()?;
        tre_config.apply_legacy_env(|key| std::env::var(key).ok());
        Ok(tre_config)
    }

    /// Fills unset fields from the variable names the deployment scripts export.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if self.identity.tenant_id.is_empty() {
            if let Some(tenant) = lookup("AAD_TENANT_ID") {
                self.identity.tenant_id = tenant;
            }
        }
        if self.identity.client_id.is_empty() {
            if let Some(client_id) = lookup("TEST_ACCOUNT_CLIENT_ID") {
                self.identity.client_id = client_id;
            }
        }
        if self.identity.client_secret.is_none() {
            self.identity.client_secret = lookup("TEST_ACCOUNT_CLIENT_SECRET");
        }
        if let Some(api_url) = lookup("TRE_URL").or_else(|| lookup("API_URL")) {
            if self.api.base_url == TreConfig::default().api.base_url {
                self.api.base_url = api_url;
            }
        }
        self.api.base_url = self.api.base_url.trim_end_matches('/').to_string();
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<TreConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = TreConfig::load_env_file();
        TreConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static TreConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
