//! Bucket directory - the uniqueness-enforcing registry of bucket records.
//!
//! Name uniqueness is the job of the unique index on `buckets(name)`; the
//! directory never checks-then-inserts, so two concurrent creations of the
//! same name resolve to exactly one winner at the storage engine.

use crate::errors::{StorageError, StorageResult, is_unique_violation};
use crate::models::bucket::Bucket;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const BUCKET_COLUMNS: &str =
    "id, name, collection_ref, object_count, total_size, created_at, updated_at";

/// Parse a textual resource id, rejecting malformed input up front.
pub fn parse_key(id: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| StorageError::InvalidKey)
}

#[derive(Clone)]
pub struct BucketDirectory {
    db: Arc<SqlitePool>,
}

impl BucketDirectory {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a new bucket, assigning an id if none is set and stamping
    /// both timestamps. A name collision surfaces as `DuplicateName`.
    pub async fn insert(&self, bucket: &mut Bucket) -> StorageResult<()> {
        if bucket.id.is_nil() {
            bucket.id = Uuid::new_v4();
        }
        let now = Utc::now();
        bucket.created_at = now;
        bucket.updated_at = now;

        let result = sqlx::query(
            "INSERT INTO buckets (id, name, collection_ref, object_count, total_size, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(bucket.id)
        .bind(&bucket.name)
        .bind(&bucket.collection_ref)
        .bind(bucket.object_count)
        .bind(bucket.total_size)
        .bind(bucket.created_at)
        .bind(bucket.updated_at)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StorageError::DuplicateName),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find_by_id(&self, id: &str) -> StorageResult<Bucket> {
        let id = parse_key(id)?;
        sqlx::query_as::<_, Bucket>(&format!(
            "SELECT {BUCKET_COLUMNS} FROM buckets WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(StorageError::NotFound("bucket"))
    }

    pub async fn find_by_name(&self, name: &str) -> StorageResult<Bucket> {
        sqlx::query_as::<_, Bucket>(&format!(
            "SELECT {BUCKET_COLUMNS} FROM buckets WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(StorageError::NotFound("bucket"))
    }

    /// Full-record replace, re-stamping `updated_at`. Renames stay subject
    /// to the unique index.
    pub async fn update(&self, bucket: &mut Bucket) -> StorageResult<()> {
        bucket.touch();
        let result = sqlx::query(
            "UPDATE buckets
             SET name = ?, collection_ref = ?, object_count = ?, total_size = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&bucket.name)
        .bind(&bucket.collection_ref)
        .bind(bucket.object_count)
        .bind(bucket.total_size)
        .bind(bucket.updated_at)
        .bind(bucket.id)
        .execute(&*self.db)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(StorageError::NotFound("bucket")),
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StorageError::DuplicateName),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove the record. Contained objects are not cascaded.
    pub async fn delete_by_id(&self, id: &str) -> StorageResult<()> {
        let id = parse_key(id)?;
        let result = sqlx::query("DELETE FROM buckets WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("bucket"));
        }
        Ok(())
    }

    pub async fn exists(&self, name: &str) -> StorageResult<bool> {
        match self.find_by_name(name).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testutil::mem_pool;

    #[tokio::test]
    async fn insert_assigns_id_and_timestamps() {
        let dir = BucketDirectory::new(mem_pool().await);
        let mut bucket = Bucket::named("media");
        dir.insert(&mut bucket).await.unwrap();

        assert!(!bucket.id.is_nil());
        let found = dir.find_by_name("media").await.unwrap();
        assert_eq!(found.id, bucket.id);
        assert_eq!(found.created_at, found.updated_at);
    }

    #[tokio::test]
    async fn concurrent_same_name_creation_has_one_winner() {
        let dir = BucketDirectory::new(mem_pool().await);
        let (a, b) = tokio::join!(
            async {
                let mut bucket = Bucket::named("contested");
                dir.insert(&mut bucket).await
            },
            async {
                let mut bucket = Bucket::named("contested");
                dir.insert(&mut bucket).await
            }
        );

        let outcomes = [a, b];
        let wins = outcomes.iter().filter(|r| r.is_ok()).count();
        let dupes = outcomes
            .iter()
            .filter(|r| matches!(r, Err(StorageError::DuplicateName)))
            .count();
        assert_eq!((wins, dupes), (1, 1));
    }

    #[tokio::test]
    async fn find_by_id_rejects_malformed_key() {
        let dir = BucketDirectory::new(mem_pool().await);
        let err = dir.find_by_id("not-a-uuid").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey));
    }

    #[tokio::test]
    async fn find_missing_bucket_is_not_found() {
        let dir = BucketDirectory::new(mem_pool().await);
        let err = dir.find_by_id(&Uuid::new_v4().to_string()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound("bucket")));
        let err = dir.find_by_name("ghost").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound("bucket")));
    }

    #[tokio::test]
    async fn update_touches_timestamp_and_keeps_uniqueness() {
        let dir = BucketDirectory::new(mem_pool().await);
        let mut first = Bucket::named("first");
        let mut second = Bucket::named("second");
        dir.insert(&mut first).await.unwrap();
        dir.insert(&mut second).await.unwrap();

        let created = second.created_at;
        second.name = "renamed".into();
        dir.update(&mut second).await.unwrap();
        assert!(second.updated_at >= created);
        assert!(dir.exists("renamed").await.unwrap());

        // renaming onto a taken name hits the index
        second.name = "first".into();
        let err = dir.update(&mut second).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateName));
    }

    #[tokio::test]
    async fn delete_then_lookup_is_not_found() {
        let dir = BucketDirectory::new(mem_pool().await);
        let mut bucket = Bucket::named("doomed");
        dir.insert(&mut bucket).await.unwrap();

        dir.delete_by_id(&bucket.id.to_string()).await.unwrap();
        let err = dir.find_by_id(&bucket.id.to_string()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound("bucket")));
        assert!(!dir.exists("doomed").await.unwrap());
    }
}
