// Workspace reads from the core API and the auth config derived from them

pub mod api;
pub mod auth_config;

#[cfg(any(test, feature = "testing"))]
pub use api::MockWorkspaceSource;
pub use api::{TreApiClient, WorkspaceApiError, WorkspaceSource};
pub use auth_config::{
    derive_auth_config, extract_workspace_id_from_uri, AuthConfigError,
    WorkspaceAuthConfigService,
};
