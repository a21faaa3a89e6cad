//! Object catalog - indexes objects by `(bucket, name)` and by id, with
//! metadata inline and content in the chunked blob store.
//!
//! Creation streams bytes through a `BlobWriter` first and only persists
//! the catalog row once the blob is finalized, so an interrupted upload
//! leaves neither a row nor chunks behind. The row insert and the bucket
//! counter bump share one transaction.

use crate::errors::{StorageError, StorageResult};
use crate::models::metadata::ObjectMetadata;
use crate::models::object::Object;
use crate::services::blob_store::BlobStore;
use bytes::Bytes;
use futures::Stream;
use futures::stream::BoxStream;
use sqlx::types::Json;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::fmt;
use std::io;
use std::sync::Arc;
use uuid::Uuid;

const OBJECT_COLUMNS: &str =
    "id, name, content_type, size, content_hash, uploaded_at, metadata";

/// An object resolved for reading: the catalog record plus a lazy,
/// forward-only byte stream over its content.
pub struct ObjectReader {
    pub object: Object,
    pub stream: BoxStream<'static, StorageResult<Bytes>>,
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("object", &self.object)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ObjectCatalog {
    db: Arc<SqlitePool>,
    pub(crate) blobs: BlobStore,
}

impl ObjectCatalog {
    pub fn new(db: Arc<SqlitePool>, blobs: BlobStore) -> Self {
        Self { db, blobs }
    }

    /// Stream `input` into a new blob and persist the catalog entry.
    ///
    /// Size and content hash are computed as bytes are written; nothing is
    /// buffered beyond one chunk. Any failure, whether in the input stream
    /// or in persistence, tears the blob down before returning, so no
    /// catalog entry ever points at an unfinalized blob.
    pub async fn create<S>(
        &self,
        input: S,
        name: &str,
        content_type: Option<&str>,
        metadata: ObjectMetadata,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let blob = self.blobs.store(input).await?;

        let object = Object {
            id: blob.id,
            name: name.to_string(),
            content_type: content_type.map(str::to_string),
            size: blob.size,
            content_hash: blob.content_hash,
            uploaded_at: blob.uploaded_at,
            metadata: Json(metadata),
        };

        if let Err(err) = self.insert_row(&object).await {
            // the blob must not outlive a failed catalog insert
            if let Err(cleanup) = self.blobs.delete(object.id).await {
                tracing::error!(
                    "failed to clean up chunks of blob {} after catalog insert failure: {cleanup}",
                    object.id
                );
            }
            return Err(err);
        }
        Ok(object)
    }

    async fn insert_row(&self, object: &Object) -> StorageResult<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query(
            "INSERT INTO objects (id, bucket_id, name, content_type, size, content_hash, uploaded_at, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(object.id)
        .bind(object.bucket_id())
        .bind(&object.name)
        .bind(&object.content_type)
        .bind(object.size)
        .bind(&object.content_hash)
        .bind(object.uploaded_at)
        .bind(&object.metadata)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE buckets
             SET object_count = object_count + 1, total_size = total_size + ?
             WHERE id = ?",
        )
        .bind(object.size)
        .bind(object.bucket_id())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Fetch the catalog record for an object id.
    pub async fn get(&self, id: Uuid) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(StorageError::NotFound("object"))
    }

    /// Resolve an object for reading by id.
    pub async fn open_by_id(&self, id: Uuid) -> StorageResult<ObjectReader> {
        let object = self.get(id).await?;
        let stream = self.blobs.read(object.id, 0);
        Ok(ObjectReader { object, stream })
    }

    /// Resolve the most recently uploaded object matching `(name, bucket)`.
    ///
    /// Name uniqueness within a bucket is not enforced; the newest
    /// `uploaded_at` wins when duplicates exist.
    pub async fn open_by_name(&self, name: &str, bucket_id: Uuid) -> StorageResult<ObjectReader> {
        let object = sqlx::query_as::<_, Object>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects
             WHERE name = ? AND bucket_id = ?
             ORDER BY uploaded_at DESC, id LIMIT 1"
        ))
        .bind(name)
        .bind(bucket_id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(StorageError::NotFound("object"))?;
        let stream = self.blobs.read(object.id, 0);
        Ok(ObjectReader { object, stream })
    }

    /// Paginated listing of a bucket's objects, newest upload first.
    ///
    /// The secondary sort on id keeps the order stable when timestamps tie.
    pub async fn find_by_bucket(
        &self,
        bucket_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> StorageResult<Vec<Object>> {
        let rows = sqlx::query_as::<_, Object>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects
             WHERE bucket_id = ?
             ORDER BY uploaded_at DESC, id LIMIT ? OFFSET ?"
        ))
        .bind(bucket_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    /// Batch lookup by id. Result order is unspecified.
    pub async fn find_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Object>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE id IN ("
        ));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        let rows = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(rows)
    }

    /// Replace the display name and metadata without touching blob bytes,
    /// size, hash or upload time.
    pub async fn update_metadata(
        &self,
        id: Uuid,
        name: &str,
        metadata: &ObjectMetadata,
    ) -> StorageResult<()> {
        let result = sqlx::query("UPDATE objects SET name = ?, metadata = ? WHERE id = ?")
            .bind(name)
            .bind(Json(metadata))
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("object"));
        }
        Ok(())
    }

    /// Remove the catalog entry and all associated chunks.
    ///
    /// The row delete and counter decrement commit together; the chunk
    /// sweep follows through the blob store and is logged if it fails, so
    /// a crash can orphan chunks but never resurrect the object.
    pub async fn delete_by_id(&self, id: Uuid) -> StorageResult<()> {
        let object = self.get(id).await?;

        let mut tx = self.db.begin().await?;
        let result = sqlx::query("DELETE FROM objects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("object"));
        }
        sqlx::query(
            "UPDATE buckets
             SET object_count = object_count - 1, total_size = total_size - ?
             WHERE id = ?",
        )
        .bind(object.size)
        .bind(object.bucket_id())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if let Err(err) = self.blobs.delete(id).await {
            tracing::error!("failed to remove chunks of deleted object {id}: {err}");
            return Err(err);
        }
        Ok(())
    }
}
