use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Closed set of resource families persisted in the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    #[serde(rename = "workspace")]
    Workspace,
    #[serde(rename = "workspace-service")]
    WorkspaceService,
    #[serde(rename = "user-resource")]
    UserResource,
    #[serde(rename = "shared-service")]
    SharedService,
    /// Any tag this build does not know about. Never valid for writes.
    #[serde(other, rename = "unrecognized")]
    Unrecognized,
}

impl ResourceType {
    pub fn is_recognized(self) -> bool {
        !matches!(self, ResourceType::Unrecognized)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Workspace => "workspace",
            ResourceType::WorkspaceService => "workspace-service",
            ResourceType::UserResource => "user-resource",
            ResourceType::SharedService => "shared-service",
            ResourceType::Unrecognized => "unrecognized",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("resource {id} has an unrecognized resource type")]
    UnrecognizedResourceType { id: String },
    #[error("resource id must not be empty")]
    EmptyId,
    #[error("workspace {id} has a malformed workspaceURL '{url}': {reason}")]
    MalformedWorkspaceUrl {
        id: String,
        url: String,
        reason: String,
    },
    #[error("resource {id} is a {actual}, not a workspace")]
    NotAWorkspace { id: String, actual: ResourceType },
    #[error("workspace {id} has malformed properties: {reason}")]
    MalformedProperties { id: String, reason: String },
}

pub type ValidationResult = Result<(), ValidationError>;

/// A persisted control-plane entity.
///
/// Identity is the `id` alone: two values with the same id are the same logical
/// resource observed at different times, so `PartialEq` and `Hash` only look at
/// the id. `id` and `resource_type` are fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    id: String,
    resource_type: ResourceType,
    #[serde(default)]
    template_name: String,
    #[serde(default)]
    template_version: String,
    #[serde(default = "default_active")]
    is_active: bool,
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
    #[serde(
        rename = "workspaceURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    workspace_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_when: Option<DateTime<Utc>>,
    /// Version stamp assigned by the store on every write.
    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Resource {
    pub fn new(id: impl Into<String>, resource_type: ResourceType) -> Self {
        let workspace_url = match resource_type {
            ResourceType::Workspace => Some(String::new()),
            _ => None,
        };
        Self {
            id: id.into(),
            resource_type,
            template_name: String::new(),
            template_version: String::new(),
            is_active: true,
            properties: serde_json::Map::new(),
            workspace_url,
            updated_when: None,
            etag: None,
        }
    }

    pub fn with_template(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.template_name = name.into();
        self.template_version = version.into();
        self
    }

    pub fn with_properties(mut self, properties: serde_json::Map<String, serde_json::Value>) -> Self {
        self.properties = properties;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    pub fn template_version(&self) -> &str {
        &self.template_version
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Soft delete. The record stays in the store with `isActive = false`.
    pub fn mark_deleted(&mut self) {
        self.is_active = false;
    }

    pub fn properties(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut serde_json::Map<String, serde_json::Value> {
        &mut self.properties
    }

    pub fn workspace_url(&self) -> Option<&str> {
        self.workspace_url.as_deref()
    }

    pub fn set_workspace_url(&mut self, url: impl Into<String>) {
        self.workspace_url = Some(url.into());
    }

    pub fn updated_when(&self) -> Option<DateTime<Utc>> {
        self.updated_when
    }

    /// Store version this copy was read at, if it came from the store.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub(crate) fn set_etag(&mut self, etag: Option<String>) {
        self.etag = etag;
    }

    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_when = Some(at);
    }

    /// Checks the resource type is recognized and, for workspaces, that the
    /// URL is either empty or well-formed.
    pub fn validate(&self) -> ValidationResult {
        validate(self)
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

pub fn validate(resource: &Resource) -> ValidationResult {
    if resource.id.is_empty() {
        return Err(ValidationError::EmptyId);
    }
    if !resource.resource_type.is_recognized() {
        return Err(ValidationError::UnrecognizedResourceType {
            id: resource.id.clone(),
        });
    }
    if resource.resource_type == ResourceType::Workspace {
        if let Some(url) = resource.workspace_url.as_deref() {
            validate_workspace_url(&resource.id, url)?;
        }
    }
    Ok(())
}

pub(crate) fn validate_workspace_url(id: &str, url: &str) -> ValidationResult {
    if url.is_empty() {
        return Ok(());
    }
    let malformed = |reason: String| ValidationError::MalformedWorkspaceUrl {
        id: id.to_string(),
        url: url.to_string(),
        reason,
    };
    let parsed = url::Url::parse(url).map_err(|e| malformed(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(malformed(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().is_none() {
        return Err(malformed("missing host".to_string()));
    }
    Ok(())
}
