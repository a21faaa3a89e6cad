//! User-supplied and system metadata attached to objects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Structured annotations stored inline with each object catalog row.
///
/// `bucket_id` is the sole tenancy boundary: object lookups by name are
/// always scoped by it. It is required at creation and immutable after.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ObjectMetadata {
    pub bucket_id: Uuid,

    /// Identity that uploaded the object, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Ordered, user-defined tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Free-form key/value annotations. Keys are unique.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom: Map<String, Value>,
}

impl ObjectMetadata {
    /// Fresh metadata bound to a bucket, everything else empty.
    pub fn for_bucket(bucket_id: Uuid) -> Self {
        Self {
            bucket_id,
            uploader_id: None,
            title: String::new(),
            description: String::new(),
            tags: Vec::new(),
            custom: Map::new(),
        }
    }
}

/// Partial metadata update as accepted by the API.
///
/// Absent fields keep their stored values; `tags` replaces the whole
/// sequence when present; `custom` entries are merged key by key.
/// `bucket_id` is deliberately not patchable.
#[derive(Debug, Default, Deserialize)]
pub struct MetadataPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub custom: Map<String, Value>,
}

impl MetadataPatch {
    pub fn apply(&self, meta: &mut ObjectMetadata) {
        if let Some(title) = &self.title {
            meta.title = title.clone();
        }
        if let Some(description) = &self.description {
            meta.description = description.clone();
        }
        if let Some(tags) = &self.tags {
            meta.tags = tags.clone();
        }
        for (key, value) in &self.custom {
            meta.custom.insert(key.clone(), value.clone());
        }
    }
}
