use anyhow::Result;
use clap::Parser;

use tre_controlplane::cli::commands::{
    AuthConfigCommand, BootstrapCommand, Command, GrantRoleCommand,
};
use tre_controlplane::cli::{Cli, Commands};
use tre_controlplane::config::{config, TreConfig};
use tre_controlplane::telemetry::init_telemetry;

fn main() -> Result<()> {
    // .env may carry TRE_API_TOKEN, so it has to be loaded before parsing
    let _ = TreConfig::load_env_file();
    let cli = Cli::parse();

    let config = config()?;
    init_telemetry(&config.observability)?;

    let succeeded = tokio::runtime::Runtime::new()?.block_on(async {
        match cli.command {
            Commands::Bootstrap => BootstrapCommand.execute(config).await,
            Commands::GrantRole {
                workspace_id,
                role,
                api_token,
            } => {
                GrantRoleCommand {
                    workspace_id,
                    role,
                    api_token,
                }
                .execute(config)
                .await
            }
            Commands::AuthConfig {
                workspace_id,
                api_token,
            } => {
                AuthConfigCommand {
                    workspace_id,
                    api_token,
                }
                .execute(config)
                .await
            }
        }
    })?;

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
