// TRE control plane library - state store bootstrap and workspace role reconciliation
// This exposes the core components for testing and integration

pub mod cli;
pub mod config;
pub mod http;
pub mod identity;
pub mod models;
pub mod store;
pub mod telemetry;
pub mod workflows;
pub mod workspaces;

// Re-export key types for easy access
pub use config::{config, init_config, TreConfig};
pub use http::RateLimitedHttpClient;
pub use identity::{
    AccessToken, AppRoleAssignment, AssignmentOutcome, ClientSecretCredential, CloudEnvironment,
    GraphClient, IdentityDirectory, IdentityError, TokenProvider,
};
pub use models::{
    Resource, ResourceType, ValidationError, Workspace, WorkspaceAuthConfig, WorkspaceProperties,
    WorkspaceRole,
};
pub use store::{
    bootstrap_database, create_collection_if_not_exists, open_state_store, BootstrapError,
    CollectionSpec, DatabaseProxy, MemoryStateStore, ResourceRepository, StateStore, StoreError,
};
pub use telemetry::{create_reconciliation_span, generate_correlation_id, init_telemetry};
pub use workflows::{GrantOutcome, GrantReport, GrantRequest, ReconcileError, RoleGrantWorkflow};
pub use workspaces::{
    extract_workspace_id_from_uri, TreApiClient, WorkspaceAuthConfigService, WorkspaceSource,
};
