use serde::{Deserialize, Serialize};

pub const RESOURCES_COLLECTION: &str = "Resources";
pub const RESOURCE_TEMPLATES_COLLECTION: &str = "ResourceTemplates";
pub const OPERATIONS_COLLECTION: &str = "Operations";
pub const SHARED_SERVICE_TEMPLATES_COLLECTION: &str = "SharedServiceTemplates";
pub const USER_RESOURCE_TEMPLATES_COLLECTION: &str = "UserResourceTemplates";

/// Every collection is partitioned on the document id.
pub const DEFAULT_PARTITION_KEY_PATH: &str = "/id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionKind {
    Hash,
}

impl PartitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PartitionKind::Hash => "Hash",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeyDefinition {
    pub paths: Vec<String>,
    pub kind: PartitionKind,
}

/// Argument to the store's create-if-not-exists primitive. Serializes to
/// `{"id": name, "partitionKey": {"paths": [path], "kind": "Hash"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSpec {
    pub id: String,
    pub partition_key: PartitionKeyDefinition,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>, partition_key_path: impl Into<String>) -> Self {
        Self {
            id: name.into(),
            partition_key: PartitionKeyDefinition {
                paths: vec![partition_key_path.into()],
                kind: PartitionKind::Hash,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.id
    }

    pub fn partition_key_path(&self) -> &str {
        self.partition_key
            .paths
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_PARTITION_KEY_PATH)
    }
}

/// The collections the control plane needs, one per entity family.
pub fn required_collections() -> Vec<CollectionSpec> {
    [
        RESOURCES_COLLECTION,
        RESOURCE_TEMPLATES_COLLECTION,
        OPERATIONS_COLLECTION,
        SHARED_SERVICE_TEMPLATES_COLLECTION,
        USER_RESOURCE_TEMPLATES_COLLECTION,
    ]
    .into_iter()
    .map(|name| CollectionSpec::new(name, DEFAULT_PARTITION_KEY_PATH))
    .collect()
}

/// Resolves an item's partition key. The path is a JSON pointer into the item.
pub fn partition_key_value(item: &serde_json::Value, path: &str) -> Option<String> {
    match item.pointer(path)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_creation_payload_shape() {
        let spec = CollectionSpec::new("test_container", "/test");
        assert_eq!(
            serde_json::to_string(&spec).unwrap(),
            r#"{"id":"test_container","partitionKey":{"paths":["/test"],"kind":"Hash"}}"#
        );
    }

    #[test]
    fn test_required_collections_are_fixed() {
        let names: Vec<_> = required_collections()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "Resources",
                "ResourceTemplates",
                "Operations",
                "SharedServiceTemplates",
                "UserResourceTemplates"
            ]
        );
        assert!(required_collections()
            .iter()
            .all(|c| c.partition_key_path() == "/id"));
    }

    #[test]
    fn test_partition_key_follows_json_pointer() {
        let item = json!({"id": "a", "owner": {"tenant": "t-1"}, "shard": 7});
        assert_eq!(partition_key_value(&item, "/id").as_deref(), Some("a"));
        assert_eq!(partition_key_value(&item, "/owner/tenant").as_deref(), Some("t-1"));
        assert_eq!(partition_key_value(&item, "/shard").as_deref(), Some("7"));
        assert_eq!(partition_key_value(&item, "/missing"), None);
        assert_eq!(partition_key_value(&item, "/owner"), None);
    }
}
