//! Microsoft Graph client for service-principal lookups and app-role grants.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{AccessToken, IdentityDirectory, IdentityError, IdentityResult};
use crate::config::IdentityConfig;
use crate::http::RateLimitedHttpClient;

const GRAPH_API_VERSION: &str = "v1.0";

/// Body of `POST servicePrincipals/{id}/appRoleAssignedTo`. Field order is
/// the order Graph documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRoleAssignment {
    pub principal_id: String,
    pub resource_id: String,
    pub app_role_id: String,
}

/// How Graph answered an app-role assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentOutcome {
    Created,
    AlreadyExists,
    Failed { status: u16, body: String },
}

impl AssignmentOutcome {
    /// Classifies an assignment response.
    ///
    /// Graph reports a duplicate assignment as 409 on some tenants and as 400
    /// with "already exists" in the message on others, so both count.
    pub fn from_response(status: u16, body: &str) -> Self {
        if status == StatusCode::CREATED.as_u16() {
            AssignmentOutcome::Created
        } else if status == StatusCode::CONFLICT.as_u16()
            || body.to_lowercase().contains("already exists")
        {
            AssignmentOutcome::AlreadyExists
        } else {
            AssignmentOutcome::Failed {
                status,
                body: body.to_string(),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServicePrincipal {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ODataList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

/// Escapes a literal for use inside an OData `$filter` string.
fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Graph client. Every request goes through the shared rate limiter.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: RateLimitedHttpClient,
    base_url: String,
}

impl GraphClient {
    pub fn new(http: RateLimitedHttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(identity: &IdentityConfig, http: &crate::config::HttpConfig) -> IdentityResult<Self> {
        let client = RateLimitedHttpClient::new(http, &identity.rate_limit)?;
        Ok(Self::new(client, identity.graph_base_url()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, GRAPH_API_VERSION, path)
    }
}

#[async_trait]
impl IdentityDirectory for GraphClient {
    #[instrument(skip(self, token))]
    async fn find_service_principal_id(
        &self,
        token: &AccessToken,
        app_id: &str,
    ) -> IdentityResult<String> {
        let filter = format!("appId eq '{}'", odata_literal(app_id));
        let request = self
            .http
            .client()
            .get(self.url("servicePrincipals"))
            .query(&[("$filter", filter.as_str())])
            .bearer_auth(token.secret());

        let response = self.http.execute_with_rate_limit(request).await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Service principal lookup failed");
            return Err(IdentityError::RemoteLookupFailed {
                target: format!("service principal for appId '{app_id}'"),
                status: status.as_u16(),
                body,
            });
        }

        let list: ODataList<ServicePrincipal> = response.json().await?;
        let principal = list
            .value
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::PrincipalNotFound(app_id.to_string()))?;

        debug!(principal_id = %principal.id, "Resolved service principal");
        Ok(principal.id)
    }

    #[instrument(skip(self, token), fields(resource_id = %assignment.resource_id, app_role_id = %assignment.app_role_id))]
    async fn assign_app_role(
        &self,
        token: &AccessToken,
        assignment: &AppRoleAssignment,
    ) -> IdentityResult<AssignmentOutcome> {
        let request = self
            .http
            .client()
            .post(self.url(&format!(
                "servicePrincipals/{}/appRoleAssignedTo",
                assignment.resource_id
            )))
            .bearer_auth(token.secret())
            .json(assignment);

        let response = self.http.execute_with_rate_limit(request).await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        let outcome = AssignmentOutcome::from_response(status, &body);
        match &outcome {
            AssignmentOutcome::Created => {
                info!(principal_id = %assignment.principal_id, "App role assigned")
            }
            AssignmentOutcome::AlreadyExists => {
                info!(principal_id = %assignment.principal_id, "App role already assigned")
            }
            AssignmentOutcome::Failed { status, .. } => {
                warn!(status, "App role assignment rejected")
            }
        }
        Ok(outcome)
    }
}
