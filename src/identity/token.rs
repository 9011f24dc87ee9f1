//! OAuth2 client-credentials tokens for the identity system.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{IdentityError, IdentityResult, TokenProvider};
use crate::config::IdentityConfig;

/// A bearer token and when it stops being valid.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the token is expired or will expire within the grace period.
    pub fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Client-credentials flow against `{authority}/{tenant}/oauth2/v2.0/token`.
///
/// Tokens are cached and reused until five minutes before expiry.
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority_host: String,
    scope: String,
    http_client: reqwest::Client,
    cached_token: Arc<RwLock<Option<AccessToken>>>,
    grace_period: Duration,
}

impl std::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("authority_host", &self.authority_host)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authority_host: impl Into<String>,
        scope: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
            scope: scope.into(),
            http_client,
            cached_token: Arc::new(RwLock::new(None)),
            grace_period: Duration::minutes(5),
        }
    }

    /// Builds the credential from configuration; fails when any part of the
    /// service credential is missing.
    pub fn from_config(identity: &IdentityConfig, http_client: reqwest::Client) -> IdentityResult<Self> {
        let secret = identity
            .client_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| IdentityError::Config("client secret is not configured".to_string()))?;
        if identity.tenant_id.is_empty() {
            return Err(IdentityError::Config("tenant id is not configured".to_string()));
        }
        if identity.client_id.is_empty() {
            return Err(IdentityError::Config("client id is not configured".to_string()));
        }

        Ok(Self::new(
            identity.tenant_id.clone(),
            identity.client_id.clone(),
            secret,
            identity.authority_host(),
            identity.cloud.graph_default_scope(),
            http_client,
        ))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, self.tenant_id)
    }

    /// Invalidates the cached token, forcing a refresh on next use.
    pub async fn invalidate(&self) {
        let mut cache = self.cached_token.write().await;
        *cache = None;
    }

    #[instrument(skip(self))]
    async fn acquire_token(&self) -> IdentityResult<AccessToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http_client
            .post(self.token_url())
            .form(&params)
            .send()
            .await
            .map_err(|e| IdentityError::RemoteUnauthenticated(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IdentityError::RemoteUnauthenticated(format!(
                "token request failed with status {status}: {body}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            IdentityError::RemoteUnauthenticated(format!("failed to parse token response: {e}"))
        })?;

        let expires_at = Utc::now() + Duration::seconds(token.expires_in);
        debug!(
            "Acquired new token, expires at {}",
            expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        Ok(AccessToken::new(token.access_token, expires_at))
    }
}

#[async_trait]
impl TokenProvider for ClientSecretCredential {
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    async fn get_token(&self) -> IdentityResult<AccessToken> {
        {
            let cache = self.cached_token.read().await;
            if let Some(ref token) = *cache {
                if !token.is_expired(self.grace_period) {
                    debug!("Using cached token");
                    return Ok(token.clone());
                }
            }
        }

        let token = self.acquire_token().await?;
        {
            let mut cache = self.cached_token.write().await;
            *cache = Some(token.clone());
        }
        Ok(token)
    }
}

/// Placeholder for a service credential whose configuration is incomplete.
/// The problem only surfaces when a token is actually requested, so runs that
/// never need one are unaffected.
#[derive(Debug, Clone)]
pub struct MissingCredential {
    reason: String,
}

impl MissingCredential {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for MissingCredential {
    async fn get_token(&self) -> IdentityResult<AccessToken> {
        Err(IdentityError::Config(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential(authority: &str) -> ClientSecretCredential {
        ClientSecretCredential::new(
            "tenant-1",
            "client-1",
            "secret-1",
            authority,
            "https://graph.microsoft.com/.default",
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_token_expiry_grace() {
        let token = AccessToken::new("t", Utc::now() + Duration::minutes(10));
        assert!(!token.is_expired(Duration::minutes(5)));
        assert!(token.is_expired(Duration::minutes(15)));
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let token = AccessToken::new("very-secret", Utc::now());
        assert!(!format!("{token:?}").contains("very-secret"));
        assert!(!format!("{:?}", credential("https://login.example")).contains("secret-1"));
    }

    #[tokio::test]
    async fn test_token_is_fetched_once_and_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=client-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "graph-token",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cred = credential(&server.uri());
        assert_eq!(cred.get_token().await.unwrap().secret(), "graph-token");
        assert_eq!(cred.get_token().await.unwrap().secret(), "graph-token");
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_unauthenticated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let err = credential(&server.uri()).get_token().await.unwrap_err();
        match err {
            IdentityError::RemoteUnauthenticated(msg) => assert!(msg.contains("invalid_client")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_config_requires_secret() {
        let identity = crate::config::TreConfig::default().identity;
        assert!(matches!(
            ClientSecretCredential::from_config(&identity, reqwest::Client::new()),
            Err(IdentityError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_credential_fails_on_use() {
        let credential = MissingCredential::new("client secret is not configured");
        let err = credential.get_token().await.unwrap_err();
        assert!(matches!(err, IdentityError::Config(reason) if reason.contains("secret")));
    }
}
