use anyhow::Result;

use crate::config::TreConfig;

pub mod auth_config;
pub mod bootstrap;
pub mod grant_role;

pub use auth_config::AuthConfigCommand;
pub use bootstrap::BootstrapCommand;
pub use grant_role::GrantRoleCommand;

/// A subcommand. `Ok(false)` means it ran but did not succeed, which the
/// binary turns into exit status 1.
#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self, config: &TreConfig) -> Result<bool>;
}
