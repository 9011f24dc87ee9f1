// Reconciliation workflows against the identity system

pub mod role_grant;

pub use role_grant::{
    GrantOutcome, GrantReport, GrantRequest, GrantState, ReconcileError, RoleGrantWorkflow,
};
