//! Idempotent "ensure role R is granted to this service for workspace W".
//!
//! The identity system's assignment call is not idempotent: it rejects a
//! duplicate. The workflow absorbs that, so running it any number of times for
//! the same `(workspace, principal, role)` converges on one grant and never
//! fails because the grant already exists.
//!
//! ```text
//! Start -> WorkspaceResolved -> NotConfigured
//!                            -> TokenAcquired -> PrincipalResolved -> GrantApplied
//!                                                                  -> GrantAlreadyPresent
//! any non-terminal state -> Failed
//! ```
//!
//! No local state is written. Every remote step is bounded by the step
//! timeout, and a timeout is that step's failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::TreConfig;
use crate::http::build_http_client;
use crate::identity::{
    AppRoleAssignment, AssignmentOutcome, ClientSecretCredential, GraphClient,
    IdentityDirectory, IdentityError, MissingCredential, TokenProvider,
};
use crate::models::WorkspaceRole;
use crate::telemetry::{create_reconciliation_span, generate_correlation_id};
use crate::workspaces::{TreApiClient, WorkspaceSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantState {
    Start,
    WorkspaceResolved,
    NotConfigured,
    TokenAcquired,
    PrincipalResolved,
    GrantApplied,
    GrantAlreadyPresent,
    Failed,
}

impl GrantState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GrantState::NotConfigured
                | GrantState::GrantApplied
                | GrantState::GrantAlreadyPresent
                | GrantState::Failed
        )
    }

    pub fn can_transition_to(self, next: GrantState) -> bool {
        use GrantState::*;
        match (self, next) {
            (current, Failed) => !current.is_terminal(),
            (Start, WorkspaceResolved) => true,
            (WorkspaceResolved, NotConfigured | TokenAcquired) => true,
            (TokenAcquired, PrincipalResolved) => true,
            (PrincipalResolved, GrantApplied | GrantAlreadyPresent) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("could not authenticate to the identity system: {0}")]
    RemoteUnauthenticated(String),

    #[error("lookup of {target} failed: {reason}")]
    RemoteLookupFailed { target: String, reason: String },

    #[error("role grant rejected: {reason}")]
    RemoteGrantRejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Applied,
    AlreadyPresent,
    /// The workspace defines no such role. Nothing was done.
    NotConfigured,
    Failed(ReconcileError),
}

impl GrantOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, GrantOutcome::Failed(_))
    }
}

#[derive(Clone)]
pub struct GrantRequest {
    pub workspace_id: String,
    pub role: WorkspaceRole,
    /// Caller's credential for the core API
    pub api_token: String,
}

impl std::fmt::Debug for GrantRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantRequest")
            .field("workspace_id", &self.workspace_id)
            .field("role", &self.role)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GrantReport {
    pub workspace_id: String,
    pub role: WorkspaceRole,
    pub outcome: GrantOutcome,
    /// Every state visited, starting with `Start`
    pub transitions: Vec<GrantState>,
    pub correlation_id: String,
}

impl GrantReport {
    pub fn final_state(&self) -> GrantState {
        self.transitions.last().copied().unwrap_or(GrantState::Start)
    }
}

struct Trail(Vec<GrantState>);

impl Trail {
    fn new() -> Self {
        Trail(vec![GrantState::Start])
    }

    fn current(&self) -> GrantState {
        self.0.last().copied().unwrap_or(GrantState::Start)
    }

    fn advance(&mut self, next: GrantState) {
        debug_assert!(
            self.current().can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.current(),
            next
        );
        debug!(from = ?self.current(), to = ?next, "Grant state transition");
        self.0.push(next);
    }

    fn fail(&mut self, error: ReconcileError) -> GrantOutcome {
        self.advance(GrantState::Failed);
        GrantOutcome::Failed(error)
    }
}

pub struct RoleGrantWorkflow {
    workspaces: Arc<dyn WorkspaceSource>,
    tokens: Arc<dyn TokenProvider>,
    directory: Arc<dyn IdentityDirectory>,
    principal_app_id: String,
    step_timeout: Duration,
}

impl RoleGrantWorkflow {
    pub fn new(
        workspaces: Arc<dyn WorkspaceSource>,
        tokens: Arc<dyn TokenProvider>,
        directory: Arc<dyn IdentityDirectory>,
        principal_app_id: impl Into<String>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            workspaces,
            tokens,
            directory,
            principal_app_id: principal_app_id.into(),
            step_timeout,
        }
    }

    /// Wires the HTTP-backed collaborators. The principal granted the role is
    /// this service's own credential. An incomplete credential is not an
    /// error here: it fails the token step of runs that reach it.
    pub fn from_config(config: &TreConfig) -> Result<Self, IdentityError> {
        let workspaces = TreApiClient::from_config(&config.api, &config.http)?;
        let tokens: Arc<dyn TokenProvider> =
            match ClientSecretCredential::from_config(&config.identity, build_http_client(&config.http)?) {
                Ok(credential) => Arc::new(credential),
                Err(IdentityError::Config(reason)) => {
                    warn!(%reason, "Service credential is incomplete; grants that need a token will fail");
                    Arc::new(MissingCredential::new(reason))
                }
                Err(e) => return Err(e),
            };
        let directory = GraphClient::from_config(&config.identity, &config.http)?;

        Ok(Self::new(
            Arc::new(workspaces),
            tokens,
            Arc::new(directory),
            config.identity.client_id.clone(),
            config.reconciliation.step_timeout(),
        ))
    }

    pub async fn ensure_role_granted(&self, request: &GrantRequest) -> GrantReport {
        let correlation_id = generate_correlation_id();
        let span = create_reconciliation_span(
            "ensure_role_granted",
            &request.workspace_id,
            &correlation_id,
        );

        let mut trail = Trail::new();
        let outcome = self.run(request, &mut trail).instrument(span).await;

        GrantReport {
            workspace_id: request.workspace_id.clone(),
            role: request.role,
            outcome,
            transitions: trail.0,
            correlation_id,
        }
    }

    async fn bounded<T, F>(&self, step: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        timeout(self.step_timeout, step).await.ok()
    }

    fn timed_out(&self) -> String {
        format!("timed out after {:?}", self.step_timeout)
    }

    async fn run(&self, request: &GrantRequest, trail: &mut Trail) -> GrantOutcome {
        let role = request.role;
        let workspace_target = format!("workspace {}", request.workspace_id);

        let lookup = self
            .bounded(
                self.workspaces
                    .get_workspace(&request.workspace_id, &request.api_token),
            )
            .await;
        let workspace = match lookup {
            Some(Ok(workspace)) => workspace,
            Some(Err(e)) => {
                error!(error = %e, "Failed to get workspace");
                return trail.fail(ReconcileError::RemoteLookupFailed {
                    target: workspace_target,
                    reason: e.to_string(),
                });
            }
            None => {
                error!("Workspace lookup {}", self.timed_out());
                return trail.fail(ReconcileError::RemoteLookupFailed {
                    target: workspace_target,
                    reason: self.timed_out(),
                });
            }
        };
        trail.advance(GrantState::WorkspaceResolved);

        let Some(target) = workspace.properties().grant_target(role) else {
            info!("Workspace does not have {} role configured, skipping", role);
            trail.advance(GrantState::NotConfigured);
            return GrantOutcome::NotConfigured;
        };

        let token = match self.bounded(self.tokens.get_token()).await {
            Some(Ok(token)) => token,
            Some(Err(e)) => {
                error!(error = %e, "Failed to acquire identity token");
                return trail.fail(ReconcileError::RemoteUnauthenticated(e.to_string()));
            }
            None => {
                error!("Token acquisition {}", self.timed_out());
                return trail.fail(ReconcileError::RemoteUnauthenticated(self.timed_out()));
            }
        };
        trail.advance(GrantState::TokenAcquired);

        let principal_target = format!("service principal for appId '{}'", self.principal_app_id);
        let principal = self
            .bounded(
                self.directory
                    .find_service_principal_id(&token, &self.principal_app_id),
            )
            .await;
        let principal_id = match principal {
            Some(Ok(id)) => id,
            Some(Err(e)) => {
                error!(error = %e, "Failed to get service principal");
                return trail.fail(ReconcileError::RemoteLookupFailed {
                    target: principal_target,
                    reason: e.to_string(),
                });
            }
            None => {
                error!("Service principal lookup {}", self.timed_out());
                return trail.fail(ReconcileError::RemoteLookupFailed {
                    target: principal_target,
                    reason: self.timed_out(),
                });
            }
        };
        trail.advance(GrantState::PrincipalResolved);

        let assignment = AppRoleAssignment {
            principal_id,
            resource_id: target.service_principal_id.to_string(),
            app_role_id: target.app_role_id.to_string(),
        };
        let reason = match self
            .bounded(self.directory.assign_app_role(&token, &assignment))
            .await
        {
            Some(Ok(AssignmentOutcome::Created)) => {
                info!("Assigned {} role to principal {}", role, assignment.principal_id);
                trail.advance(GrantState::GrantApplied);
                return GrantOutcome::Applied;
            }
            Some(Ok(AssignmentOutcome::AlreadyExists)) => {
                info!("{} role already assigned to principal {}", role, assignment.principal_id);
                trail.advance(GrantState::GrantAlreadyPresent);
                return GrantOutcome::AlreadyPresent;
            }
            Some(Ok(AssignmentOutcome::Failed { status, body })) => {
                format!("status {status}: {body}")
            }
            Some(Err(e)) => e.to_string(),
            None => self.timed_out(),
        };

        warn!(reason = %reason, "Failed to assign {} role", role);
        trail.fail(ReconcileError::RemoteGrantRejected { reason })
    }
}
