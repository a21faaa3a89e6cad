//! Represents a bucket - a uniquely named tenant namespace for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A tenant namespace containing objects.
///
/// Bucket names are globally unique; uniqueness is enforced by a unique
/// index on `name`, not by a check before insert.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Unique identifier, server-generated at creation, immutable.
    pub id: Uuid,

    /// Globally unique bucket name. Mutable, but must remain unique.
    pub name: String,

    /// Name of the underlying storage collection holding this bucket's
    /// objects. Currently shared across all buckets.
    pub collection_ref: String,

    /// Number of live objects in this bucket.
    pub object_count: i64,

    /// Sum of the sizes of all live objects, in bytes.
    pub total_size: i64,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,

    /// When this bucket was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Bucket {
    /// Build a new, not-yet-persisted bucket with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::nil(),
            name: name.into(),
            collection_ref: "objects".into(),
            object_count: 0,
            total_size: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-stamp `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Partial bucket update as accepted by the API.
///
/// Only present fields are applied; everything else keeps its stored value.
#[derive(Debug, Default, Deserialize)]
pub struct BucketPatch {
    pub name: Option<String>,
}

impl BucketPatch {
    pub fn apply(&self, bucket: &mut Bucket) {
        if let Some(name) = &self.name {
            bucket.name = name.clone();
        }
    }
}
