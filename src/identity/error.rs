use thiserror::Error;

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Errors talking to the identity system.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Token acquisition failed.
    #[error("token acquisition failed: {0}")]
    RemoteUnauthenticated(String),

    /// A read against the directory returned a non-success status.
    #[error("lookup of {target} failed with status {status}: {body}")]
    RemoteLookupFailed {
        target: String,
        status: u16,
        body: String,
    },

    /// The lookup succeeded but returned no principal.
    #[error("no service principal found for appId '{0}'")]
    PrincipalNotFound(String),

    #[error("identity configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
