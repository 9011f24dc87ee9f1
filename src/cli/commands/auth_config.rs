use anyhow::Result;
use std::sync::Arc;

use super::Command;
use crate::config::TreConfig;
use crate::workspaces::{TreApiClient, WorkspaceAuthConfigService};

pub struct AuthConfigCommand {
    pub workspace_id: String,
    pub api_token: String,
}

impl Command for AuthConfigCommand {
    async fn execute(&self, config: &TreConfig) -> Result<bool> {
        let client = TreApiClient::from_config(&config.api, &config.http)?;
        let service = WorkspaceAuthConfigService::from_config(Arc::new(client), config);

        let auth_config = service
            .get_workspace_auth_config(&self.workspace_id, &self.api_token)
            .await?;
        println!("{}", serde_json::to_string_pretty(&auth_config)?);
        Ok(true)
    }
}
