//! Resolves the OAuth2 settings a workspace's tokens are validated against.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{WorkspaceApiError, WorkspaceSource};
use crate::config::TreConfig;
use crate::models::{Workspace, WorkspaceAuthConfig};

#[derive(Debug, Error)]
pub enum AuthConfigError {
    #[error("workspace {workspace_id} has no auth_tenant_id and no tenant is configured")]
    MissingTenant { workspace_id: String },

    #[error(transparent)]
    Workspace(#[from] WorkspaceApiError),
}

/// Builds the auth config from a workspace's provisioning outputs.
///
/// The workspace's own `auth_tenant_id` wins over `default_tenant`. Missing
/// `client_id` or `scope_id` come through as empty strings.
pub fn derive_auth_config(
    workspace: &Workspace,
    authority_host: &str,
    default_tenant: Option<&str>,
) -> Result<WorkspaceAuthConfig, AuthConfigError> {
    let properties = workspace.properties();
    let tenant = properties
        .auth_tenant_id()
        .or(default_tenant.filter(|t| !t.is_empty()))
        .ok_or_else(|| AuthConfigError::MissingTenant {
            workspace_id: workspace.id().to_string(),
        })?;
    let authority = authority_host.trim_end_matches('/');

    Ok(WorkspaceAuthConfig::new(
        properties.client_id().unwrap_or_default(),
        properties.scope_id().unwrap_or_default(),
        format!("{authority}/{tenant}/v2.0"),
        format!("{authority}/{tenant}/discovery/v2.0/keys"),
    ))
}

/// Returns the first path segment of `uri` shaped like a hyphenated UUID,
/// e.g. the workspace id in `/guacamole/{workspace_id}/...`.
pub fn extract_workspace_id_from_uri(uri: &str) -> Option<&str> {
    let path = uri.split(['?', '#']).next().unwrap_or_default();
    path.split('/')
        .find(|segment| segment.len() == 36 && Uuid::try_parse(segment).is_ok())
}

/// Fetches and caches workspace auth configs.
pub struct WorkspaceAuthConfigService {
    workspaces: Arc<dyn WorkspaceSource>,
    authority_host: String,
    default_tenant: Option<String>,
    cache: Cache<String, WorkspaceAuthConfig>,
}

impl WorkspaceAuthConfigService {
    pub fn new(
        workspaces: Arc<dyn WorkspaceSource>,
        authority_host: impl Into<String>,
        default_tenant: Option<String>,
        ttl: Duration,
        max_capacity: u64,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            workspaces,
            authority_host: authority_host.into(),
            default_tenant,
            cache,
        }
    }

    pub fn from_config(workspaces: Arc<dyn WorkspaceSource>, config: &TreConfig) -> Self {
        let tenant = Some(config.identity.tenant_id.clone()).filter(|t| !t.is_empty());
        Self::new(
            workspaces,
            config.identity.authority_host(),
            tenant,
            Duration::from_secs(config.auth_config.ttl_seconds),
            config.auth_config.max_capacity,
        )
    }

    #[instrument(skip(self, api_token))]
    pub async fn get_workspace_auth_config(
        &self,
        workspace_id: &str,
        api_token: &str,
    ) -> Result<WorkspaceAuthConfig, AuthConfigError> {
        if let Some(cached) = self.cache.get(workspace_id).await {
            debug!("Using cached auth config");
            return Ok(cached);
        }

        info!("Fetching auth config for workspace {}", workspace_id);
        let workspace = self.workspaces.get_workspace(workspace_id, api_token).await?;
        let auth_config = derive_auth_config(
            &workspace,
            &self.authority_host,
            self.default_tenant.as_deref(),
        )?;

        self.cache
            .insert(workspace_id.to_string(), auth_config.clone())
            .await;
        Ok(auth_config)
    }

    pub async fn clear_cache(&self, workspace_id: &str) {
        self.cache.invalidate(workspace_id).await;
    }

    pub fn clear_all_cache(&self) {
        self.cache.invalidate_all();
        info!("Workspace auth config cache cleared");
    }
}
