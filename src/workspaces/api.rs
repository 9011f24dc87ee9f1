use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::config::{ApiConfig, HttpConfig};
use crate::http::build_http_client;
use crate::models::Workspace;

#[derive(Debug, Error)]
pub enum WorkspaceApiError {
    #[error("workspace {workspace_id} lookup failed with status {status}: {body}")]
    Status {
        workspace_id: String,
        status: u16,
        body: String,
    },

    #[error("workspace {workspace_id} response could not be parsed: {reason}")]
    Malformed { workspace_id: String, reason: String },

    #[error("workspace API request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Where workspace records are read from.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait WorkspaceSource: Send + Sync {
    /// Fetches one workspace, authenticating as the caller.
    async fn get_workspace(
        &self,
        workspace_id: &str,
        api_token: &str,
    ) -> Result<Workspace, WorkspaceApiError>;
}

#[derive(Deserialize)]
struct WorkspaceEnvelope {
    workspace: Workspace,
}

/// Client for the core API's workspace endpoint.
#[derive(Debug, Clone)]
pub struct TreApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl TreApiClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(api: &ApiConfig, http: &HttpConfig) -> reqwest::Result<Self> {
        Ok(Self::new(build_http_client(http)?, api.base_url.clone()))
    }

    pub fn workspace_url(&self, workspace_id: &str) -> String {
        format!("{}/api/workspaces/{}", self.base_url, workspace_id)
    }
}

#[async_trait]
impl WorkspaceSource for TreApiClient {
    #[instrument(skip(self, api_token))]
    async fn get_workspace(
        &self,
        workspace_id: &str,
        api_token: &str,
    ) -> Result<Workspace, WorkspaceApiError> {
        let response = self
            .client
            .get(self.workspace_url(workspace_id))
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(api_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            debug!(status = status.as_u16(), body = %body, "Workspace lookup returned non-200");
            return Err(WorkspaceApiError::Status {
                workspace_id: workspace_id.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let envelope: WorkspaceEnvelope =
            serde_json::from_str(&body).map_err(|e| WorkspaceApiError::Malformed {
                workspace_id: workspace_id.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Fetched workspace");
        Ok(envelope.workspace.with_id_if_missing(workspace_id))
    }
}
