//! Represents an object - an immutable-once-written blob with mutable metadata.

use crate::models::metadata::ObjectMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// A single object within a bucket.
///
/// The catalog row is the one source of truth: metadata is materialized
/// inline rather than fetched through a separate blob handle. Content
/// bytes live in the chunk store, addressed by `id`.
///
/// `size`, `content_hash` and `uploaded_at` are derived when the blob is
/// finalized and never change afterwards; only `name` and `metadata` may
/// be updated post-creation.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    /// Identifier assigned by the blob store at creation.
    pub id: Uuid,

    /// Path-like key, unique only within `(bucket, name)`.
    pub name: String,

    /// MIME type supplied at upload time.
    pub content_type: Option<String>,

    /// Size in bytes, computed while streaming the upload.
    pub size: i64,

    /// MD5 of the content, computed while streaming the upload.
    pub content_hash: String,

    /// When the blob was finalized.
    pub uploaded_at: DateTime<Utc>,

    /// Materialized metadata document, including the owning bucket id.
    pub metadata: Json<ObjectMetadata>,
}

impl Object {
    /// The owning bucket. This is the tenancy boundary for name lookups.
    pub fn bucket_id(&self) -> Uuid {
        self.metadata.bucket_id
    }
}
