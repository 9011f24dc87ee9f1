use anyhow::Result;

use super::Command;
use crate::config::TreConfig;
use crate::models::WorkspaceRole;
use crate::workflows::{GrantOutcome, GrantRequest, RoleGrantWorkflow};

pub struct GrantRoleCommand {
    pub workspace_id: String,
    pub role: WorkspaceRole,
    pub api_token: String,
}

impl Command for GrantRoleCommand {
    async fn execute(&self, config: &TreConfig) -> Result<bool> {
        let workflow = RoleGrantWorkflow::from_config(config)?;
        let report = workflow
            .ensure_role_granted(&GrantRequest {
                workspace_id: self.workspace_id.clone(),
                role: self.role,
                api_token: self.api_token.clone(),
            })
            .await;

        match &report.outcome {
            GrantOutcome::Applied => println!(
                "✅ Granted {} on workspace {}",
                report.role, report.workspace_id
            ),
            GrantOutcome::AlreadyPresent => println!(
                "✅ {} was already granted on workspace {}",
                report.role, report.workspace_id
            ),
            GrantOutcome::NotConfigured => println!(
                "⏭️  Workspace {} has no {} role configured, nothing to do",
                report.workspace_id, report.role
            ),
            GrantOutcome::Failed(e) => println!("❌ {e}"),
        }
        println!("   correlation id: {}", report.correlation_id);

        Ok(report.outcome.is_success())
    }
}
