use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use super::{DatabaseProxy, StoreError, RESOURCES_COLLECTION};
use crate::models::{Resource, Workspace};

const DELETE_ATTEMPTS: usize = 3;

/// CRUD over the resources collection.
///
/// Resources are never physically removed: `soft_delete` flips `isActive`.
/// The repository refuses updates that would change a resource's type.
#[derive(Clone)]
pub struct ResourceRepository {
    proxy: Arc<dyn DatabaseProxy>,
    collection: String,
}

impl ResourceRepository {
    pub fn new(proxy: Arc<dyn DatabaseProxy>) -> Self {
        Self {
            proxy,
            collection: RESOURCES_COLLECTION.to_string(),
        }
    }

    /// Stores a new resource. Fails with `Conflict` if the id is taken, even
    /// when another writer got there between our calls.
    pub async fn create(&self, mut resource: Resource) -> Result<Resource, StoreError> {
        resource.validate()?;
        resource.touch(Utc::now());
        let item = serde_json::to_value(&resource)?;
        let created: Resource =
            serde_json::from_value(self.proxy.create_item(&self.collection, item).await?)?;
        info!(resource_id = created.id(), resource_type = %created.resource_type(), "Created resource");
        Ok(created)
    }

    pub async fn get(&self, id: &str) -> Result<Resource, StoreError> {
        self.find(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub async fn get_workspace(&self, id: &str) -> Result<Workspace, StoreError> {
        let resource = self.get(id).await?;
        Ok(Workspace::try_from(resource)?)
    }

    /// Replaces the stored resource with the same id.
    ///
    /// The write only lands if the stored record is still the one checked
    /// here: the type must match, the record must be active, and a copy read
    /// from the store must still carry the current etag. A copy without an
    /// etag replaces whatever version is current.
    pub async fn update(&self, mut resource: Resource) -> Result<Resource, StoreError> {
        resource.validate()?;
        let existing = self.get(resource.id()).await?;
        if existing.resource_type() != resource.resource_type() {
            return Err(StoreError::ImmutableField {
                id: resource.id().to_string(),
                field: "resourceType",
            });
        }
        if !existing.is_active() {
            return Err(StoreError::Deleted(resource.id().to_string()));
        }
        let current = existing.etag().unwrap_or_default();
        if resource.etag().is_some_and(|seen| seen != current) {
            return Err(StoreError::PreconditionFailed(resource.id().to_string()));
        }
        resource.touch(Utc::now());
        let updated = self.replace(&resource, current).await?;
        debug!(resource_id = updated.id(), "Updated resource");
        Ok(updated)
    }

    pub async fn update_workspace(&self, workspace: Workspace) -> Result<Workspace, StoreError> {
        let updated = self.update(Resource::from(workspace)).await?;
        Ok(Workspace::try_from(updated)?)
    }

    /// Marks the resource inactive. Deleting an already deleted resource is a
    /// no-op. A concurrent write makes us re-read and try again.
    pub async fn soft_delete(&self, id: &str) -> Result<Resource, StoreError> {
        for _ in 0..DELETE_ATTEMPTS {
            let mut resource = self.get(id).await?;
            if !resource.is_active() {
                return Ok(resource);
            }
            let current = resource.etag().unwrap_or_default().to_string();
            resource.mark_deleted();
            resource.touch(Utc::now());
            match self.replace(&resource, &current).await {
                Ok(deleted) => {
                    info!(resource_id = id, "Marked resource as deleted");
                    return Ok(deleted);
                }
                Err(StoreError::PreconditionFailed(_)) => {
                    debug!(resource_id = id, "Resource changed while deleting, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::PreconditionFailed(id.to_string()))
    }

    pub async fn list_active(&self) -> Result<Vec<Resource>, StoreError> {
        let items = self.proxy.list_items(&self.collection).await?;
        let mut resources = Vec::with_capacity(items.len());
        for item in items {
            let resource: Resource = serde_json::from_value(item)?;
            if resource.is_active() {
                resources.push(resource);
            }
        }
        Ok(resources)
    }

    async fn find(&self, id: &str) -> Result<Option<Resource>, StoreError> {
        // Partitioned on /id, so the id is also the partition key.
        match self.proxy.read_item(&self.collection, id, id).await? {
            Some(item) => Ok(Some(serde_json::from_value(item)?)),
            None => Ok(None),
        }
    }

    async fn replace(&self, resource: &Resource, if_match: &str) -> Result<Resource, StoreError> {
        let item = serde_json::to_value(resource)?;
        let stored = self
            .proxy
            .replace_item(&self.collection, item, if_match)
            .await?;
        Ok(serde_json::from_value(stored)?)
    }
}
