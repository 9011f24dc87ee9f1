use clap::{Parser, Subcommand};

use crate::models::WorkspaceRole;

pub mod commands;

#[derive(Parser)]
#[command(name = "tre-controlplane")]
#[command(about = "Control-plane state store bootstrap and workspace role reconciliation")]
#[command(long_about = "Prepares the control-plane state store and keeps workspace app-role grants \
                       in the identity system converged. Safe to re-run: every command is idempotent.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create every required state store collection that does not exist yet
    Bootstrap,
    /// Ensure this service's principal holds a workspace app role
    GrantRole {
        /// Workspace to reconcile
        #[arg(long, help = "Id of the workspace whose app role is granted")]
        workspace_id: String,
        /// Role to grant
        #[arg(long, default_value = "airlock-manager", value_parser = parse_role, help = "owner, researcher or airlock-manager")]
        role: WorkspaceRole,
        /// Core API token used to read the workspace
        #[arg(long, env = "TRE_API_TOKEN", hide_env_values = true)]
        api_token: String,
    },
    /// Print the OAuth2 settings bound to a workspace
    AuthConfig {
        /// Workspace to resolve
        #[arg(long, help = "Id of the workspace to resolve")]
        workspace_id: String,
        /// Core API token used to read the workspace
        #[arg(long, env = "TRE_API_TOKEN", hide_env_values = true)]
        api_token: String,
    },
}

fn parse_role(value: &str) -> Result<WorkspaceRole, String> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_role_arguments() {
        let cli = Cli::try_parse_from([
            "tre-controlplane",
            "grant-role",
            "--workspace-id",
            "ws-1",
            "--role",
            "owner",
            "--api-token",
            "t",
        ])
        .unwrap();

        match cli.command {
            Commands::GrantRole { workspace_id, role, .. } => {
                assert_eq!(workspace_id, "ws-1");
                assert_eq!(role, WorkspaceRole::Owner);
            }
            _ => panic!("expected grant-role"),
        }
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result = Cli::try_parse_from([
            "tre-controlplane",
            "grant-role",
            "--workspace-id",
            "ws-1",
            "--role",
            "admin",
            "--api-token",
            "t",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
