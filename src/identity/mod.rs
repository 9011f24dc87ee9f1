// Identity system access: service credential tokens and directory operations

use async_trait::async_trait;
#[cfg(any(test, feature = "testing"))]
use mockall::automock;

pub mod cloud;
pub mod error;
pub mod graph;
pub mod token;

pub use cloud::CloudEnvironment;
pub use error::{IdentityError, IdentityResult};
pub use graph::{AppRoleAssignment, AssignmentOutcome, GraphClient};
pub use token::{AccessToken, ClientSecretCredential, MissingCredential};

/// Source of bearer tokens for the identity system's API.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self) -> IdentityResult<AccessToken>;
}

/// The directory operations role reconciliation needs.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Object id of the service principal registered for `app_id`.
    async fn find_service_principal_id(
        &self,
        token: &AccessToken,
        app_id: &str,
    ) -> IdentityResult<String>;

    /// Assigns an app role. Rejections come back as an outcome, only
    /// transport failures are errors.
    async fn assign_app_role(
        &self,
        token: &AccessToken,
        assignment: &AppRoleAssignment,
    ) -> IdentityResult<AssignmentOutcome>;
}
