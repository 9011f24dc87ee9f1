use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::resource::{validate_workspace_url, Resource, ResourceType, ValidationError, ValidationResult};

/// Workspace roles. The discriminants are persisted and compared by value,
/// so they must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkspaceRole {
    NoRole = 0,
    Researcher = 1,
    Owner = 2,
    AirlockManager = 3,
}

impl WorkspaceRole {
    pub const ALL: [WorkspaceRole; 4] = [
        WorkspaceRole::NoRole,
        WorkspaceRole::Researcher,
        WorkspaceRole::Owner,
        WorkspaceRole::AirlockManager,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.ordinal() == value)
    }

    /// Key under which provisioning stores this role's app-role id.
    pub fn role_id_property(self) -> Option<&'static str> {
        match self {
            WorkspaceRole::NoRole => None,
            WorkspaceRole::Researcher => Some("app_role_id_workspace_researcher"),
            WorkspaceRole::Owner => Some("app_role_id_workspace_owner"),
            WorkspaceRole::AirlockManager => Some("app_role_id_workspace_airlock_manager"),
        }
    }
}

impl std::fmt::Display for WorkspaceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkspaceRole::NoRole => "NoRole",
            WorkspaceRole::Researcher => "Researcher",
            WorkspaceRole::Owner => "Owner",
            WorkspaceRole::AirlockManager => "AirlockManager",
        };
        f.write_str(name)
    }
}

impl FromStr for WorkspaceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "norole" => Ok(WorkspaceRole::NoRole),
            "researcher" => Ok(WorkspaceRole::Researcher),
            "owner" => Ok(WorkspaceRole::Owner),
            "airlockmanager" => Ok(WorkspaceRole::AirlockManager),
            _ => Err(format!("unknown workspace role '{s}'")),
        }
    }
}

/// The service principal and app role a grant targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantTarget<'a> {
    pub service_principal_id: &'a str,
    pub app_role_id: &'a str,
}

/// Provisioning outputs recorded on a workspace.
///
/// Recognized keys are typed; anything else is carried in `extra` untouched so
/// a read-modify-write never drops fields written by provisioning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_role_id_workspace_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_role_id_workspace_researcher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_role_id_workspace_airlock_manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_tenant_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl WorkspaceProperties {
    pub fn service_principal_id(&self) -> Option<&str> {
        non_empty(&self.sp_id)
    }

    pub fn role_id(&self, role: WorkspaceRole) -> Option<&str> {
        match role {
            WorkspaceRole::NoRole => None,
            WorkspaceRole::Researcher => non_empty(&self.app_role_id_workspace_researcher),
            WorkspaceRole::Owner => non_empty(&self.app_role_id_workspace_owner),
            WorkspaceRole::AirlockManager => non_empty(&self.app_role_id_workspace_airlock_manager),
        }
    }

    /// `None` means the workspace has no such role configured.
    pub fn grant_target(&self, role: WorkspaceRole) -> Option<GrantTarget<'_>> {
        Some(GrantTarget {
            service_principal_id: self.service_principal_id()?,
            app_role_id: self.role_id(role)?,
        })
    }

    pub fn client_id(&self) -> Option<&str> {
        non_empty(&self.client_id)
    }

    pub fn scope_id(&self) -> Option<&str> {
        non_empty(&self.scope_id)
    }

    pub fn auth_tenant_id(&self) -> Option<&str> {
        non_empty(&self.auth_tenant_id)
    }
}

fn workspace_type() -> ResourceType {
    ResourceType::Workspace
}

fn default_active() -> bool {
    true
}

/// A workspace resource with its provisioning outputs typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    #[serde(default)]
    id: String,
    #[serde(default = "workspace_type")]
    resource_type: ResourceType,
    #[serde(default)]
    template_name: String,
    #[serde(default)]
    template_version: String,
    #[serde(default = "default_active")]
    is_active: bool,
    #[serde(rename = "workspaceURL", default)]
    workspace_url: String,
    #[serde(default)]
    properties: WorkspaceProperties,
    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
}

impl Workspace {
    pub fn new(id: impl Into<String>, properties: WorkspaceProperties) -> Self {
        Self {
            id: id.into(),
            resource_type: ResourceType::Workspace,
            template_name: String::new(),
            template_version: String::new(),
            is_active: true,
            workspace_url: String::new(),
            properties,
            etag: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// API responses may omit the id; the caller knows which one it asked for.
    pub(crate) fn with_id_if_missing(mut self, id: &str) -> Self {
        if self.id.is_empty() {
            self.id = id.to_string();
        }
        self
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn workspace_url(&self) -> &str {
        &self.workspace_url
    }

    pub fn set_workspace_url(&mut self, url: impl Into<String>) {
        self.workspace_url = url.into();
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn properties(&self) -> &WorkspaceProperties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut WorkspaceProperties {
        &mut self.properties
    }

    pub fn validate(&self) -> ValidationResult {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if self.resource_type != ResourceType::Workspace {
            return Err(ValidationError::NotAWorkspace {
                id: self.id.clone(),
                actual: self.resource_type,
            });
        }
        validate_workspace_url(&self.id, &self.workspace_url)
    }
}

impl PartialEq for Workspace {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Workspace {}

impl TryFrom<Resource> for Workspace {
    type Error = ValidationError;

    fn try_from(resource: Resource) -> Result<Self, Self::Error> {
        if resource.resource_type() != ResourceType::Workspace {
            return Err(ValidationError::NotAWorkspace {
                id: resource.id().to_string(),
                actual: resource.resource_type(),
            });
        }
        let properties: WorkspaceProperties =
            serde_json::from_value(serde_json::Value::Object(resource.properties().clone()))
                .map_err(|e| ValidationError::MalformedProperties {
                    id: resource.id().to_string(),
                    reason: e.to_string(),
                })?;

        Ok(Self {
            id: resource.id().to_string(),
            resource_type: ResourceType::Workspace,
            template_name: resource.template_name().to_string(),
            template_version: resource.template_version().to_string(),
            is_active: resource.is_active(),
            workspace_url: resource.workspace_url().unwrap_or_default().to_string(),
            properties,
            etag: resource.etag().map(str::to_string),
        })
    }
}

impl From<Workspace> for Resource {
    fn from(workspace: Workspace) -> Self {
        let properties = match serde_json::to_value(&workspace.properties) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        let mut resource = Resource::new(workspace.id, ResourceType::Workspace)
            .with_template(workspace.template_name, workspace.template_version)
            .with_properties(properties);
        resource.set_workspace_url(workspace.workspace_url);
        resource.set_etag(workspace.etag);
        if !workspace.is_active {
            resource.mark_deleted();
        }
        resource
    }
}

/// OAuth2 settings bound to a workspace. Issued by provisioning and only ever
/// read here, so there are no setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceAuthConfig {
    client_id: String,
    scope_id: String,
    issuer: String,
    jwks_endpoint: String,
}

impl WorkspaceAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        scope_id: impl Into<String>,
        issuer: impl Into<String>,
        jwks_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            scope_id: scope_id.into(),
            issuer: issuer.into(),
            jwks_endpoint: jwks_endpoint.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn jwks_endpoint(&self) -> &str {
        &self.jwks_endpoint
    }
}
