// Persisted control-plane entities and their validation rules. No I/O here.

pub mod resource;
pub mod workspace;

pub use resource::{validate, Resource, ResourceType, ValidationError, ValidationResult};
pub use workspace::{
    GrantTarget, Workspace, WorkspaceAuthConfig, WorkspaceProperties, WorkspaceRole,
};
