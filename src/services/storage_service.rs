//! Storage façade - the public API the HTTP layer calls.
//!
//! Every operation resolves its bucket, consults the access gate, then
//! delegates to the bucket directory, object catalog or blob store; none
//! bypasses the gate. Object operations addressed through a bucket verify
//! the object actually belongs to it, so cross-tenant probing answers
//! `NotFound`.

use crate::errors::{StorageError, StorageResult};
use crate::models::bucket::{Bucket, BucketPatch};
use crate::models::metadata::{MetadataPatch, ObjectMetadata};
use crate::models::object::Object;
use crate::services::access::{AccessMode, AccessPolicy, check_access};
use crate::services::blob_store::BlobStore;
use crate::services::catalog::{ObjectCatalog, ObjectReader};
use crate::services::directory::{BucketDirectory, parse_key};
use bytes::Bytes;
use futures::Stream;
use sqlx::SqlitePool;
use std::io;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// How a bucket is addressed by a façade call.
#[derive(Debug, Clone, Copy)]
pub enum BucketKey<'a> {
    Id(&'a str),
    Name(&'a str),
}

#[derive(Clone)]
pub struct StorageService {
    /// Shared connection pool; exposed for health probes.
    pub db: Arc<SqlitePool>,
    directory: BucketDirectory,
    catalog: ObjectCatalog,
}

impl StorageService {
    /// Compose the storage core on top of an injected database handle.
    pub fn new(db: Arc<SqlitePool>) -> Self {
        let blobs = BlobStore::new(db.clone());
        Self {
            directory: BucketDirectory::new(db.clone()),
            catalog: ObjectCatalog::new(db.clone(), blobs),
            db,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_parts(
        db: Arc<SqlitePool>,
        directory: BucketDirectory,
        catalog: ObjectCatalog,
    ) -> Self {
        Self {
            db,
            directory,
            catalog,
        }
    }

    async fn resolve_bucket(&self, key: BucketKey<'_>) -> StorageResult<Bucket> {
        match key {
            BucketKey::Id(id) => self.directory.find_by_id(id).await,
            BucketKey::Name(name) => self.directory.find_by_name(name).await,
        }
    }

    async fn gated_bucket(
        &self,
        policy: &dyn AccessPolicy,
        key: BucketKey<'_>,
        mode: AccessMode,
    ) -> StorageResult<Bucket> {
        let bucket = self.resolve_bucket(key).await?;
        check_access(policy, &bucket, mode)?;
        Ok(bucket)
    }

    /// Fetch an object and verify it belongs to `bucket`. A hit in a
    /// different bucket is reported as missing, not as someone else's.
    async fn object_in_bucket(&self, bucket: &Bucket, object_id: &str) -> StorageResult<Object> {
        let id = parse_key(object_id)?;
        let object = self.catalog.get(id).await?;
        if object.bucket_id() != bucket.id {
            return Err(StorageError::NotFound("object"));
        }
        Ok(object)
    }

    // --- bucket operations ---

    pub async fn create_bucket(&self, name: &str) -> StorageResult<Bucket> {
        if name.trim().is_empty() {
            return Err(StorageError::Validation("bucket name is required".into()));
        }
        let mut bucket = Bucket::named(name);
        self.directory.insert(&mut bucket).await?;
        debug!("created bucket {} ({})", bucket.name, bucket.id);
        Ok(bucket)
    }

    pub async fn get_bucket(
        &self,
        policy: &dyn AccessPolicy,
        key: BucketKey<'_>,
    ) -> StorageResult<Bucket> {
        self.gated_bucket(policy, key, AccessMode::Read).await
    }

    pub async fn update_bucket(
        &self,
        policy: &dyn AccessPolicy,
        id: &str,
        patch: BucketPatch,
    ) -> StorageResult<Bucket> {
        let mut bucket = self
            .gated_bucket(policy, BucketKey::Id(id), AccessMode::Write)
            .await?;
        patch.apply(&mut bucket);
        if bucket.name.trim().is_empty() {
            return Err(StorageError::Validation("bucket name is required".into()));
        }
        self.directory.update(&mut bucket).await?;
        Ok(bucket)
    }

    /// Remove the bucket record. Contained objects are not cascaded; see
    /// the catalog for per-object deletion.
    pub async fn delete_bucket(&self, policy: &dyn AccessPolicy, id: &str) -> StorageResult<()> {
        let bucket = self
            .gated_bucket(policy, BucketKey::Id(id), AccessMode::Write)
            .await?;
        self.directory.delete_by_id(&bucket.id.to_string()).await
    }

    // --- object operations ---

    /// Stream an upload into the bucket. `uploader_id` is recorded in the
    /// object metadata when the auth layer resolved one.
    pub async fn upload_object<S>(
        &self,
        policy: &dyn AccessPolicy,
        bucket_id: &str,
        name: &str,
        content_type: Option<&str>,
        uploader_id: Option<Uuid>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        if name.is_empty() {
            return Err(StorageError::Validation("object name is required".into()));
        }
        let bucket = self
            .gated_bucket(policy, BucketKey::Id(bucket_id), AccessMode::Write)
            .await?;
        debug!("posting object to bucket {} with path {}", bucket.id, name);

        let mut metadata = ObjectMetadata::for_bucket(bucket.id);
        metadata.uploader_id = uploader_id;
        self.catalog.create(stream, name, content_type, metadata).await
    }

    /// Fetch the catalog record of an object addressed through its bucket.
    pub async fn get_object(
        &self,
        policy: &dyn AccessPolicy,
        bucket_id: &str,
        object_id: &str,
    ) -> StorageResult<Object> {
        let bucket = self
            .gated_bucket(policy, BucketKey::Id(bucket_id), AccessMode::Read)
            .await?;
        self.object_in_bucket(&bucket, object_id).await
    }

    /// Resolve an object for content serving, addressed by bucket name and
    /// object name. The newest upload wins when names are duplicated.
    pub async fn download_object(
        &self,
        policy: &dyn AccessPolicy,
        bucket_name: &str,
        object_name: &str,
    ) -> StorageResult<ObjectReader> {
        let bucket = self
            .gated_bucket(policy, BucketKey::Name(bucket_name), AccessMode::Read)
            .await?;
        debug!("serving object [{}] from bucket [{}]", object_name, bucket.name);
        self.catalog.open_by_name(object_name, bucket.id).await
    }

    /// Resolve an object for reading by id, addressed through its bucket.
    pub async fn download_object_by_id(
        &self,
        policy: &dyn AccessPolicy,
        bucket_id: &str,
        object_id: &str,
    ) -> StorageResult<ObjectReader> {
        let bucket = self
            .gated_bucket(policy, BucketKey::Id(bucket_id), AccessMode::Read)
            .await?;
        let object = self.object_in_bucket(&bucket, object_id).await?;
        self.catalog.open_by_id(object.id).await
    }

    pub async fn list_objects(
        &self,
        policy: &dyn AccessPolicy,
        bucket_id: &str,
        skip: i64,
        limit: i64,
    ) -> StorageResult<Vec<Object>> {
        let bucket = self
            .gated_bucket(policy, BucketKey::Id(bucket_id), AccessMode::Read)
            .await?;
        self.catalog.find_by_bucket(bucket.id, skip, limit).await
    }

    /// Batch lookup, restricted to the resolved bucket: ids living in other
    /// buckets are silently absent from the result.
    pub async fn list_objects_by_ids(
        &self,
        policy: &dyn AccessPolicy,
        bucket_id: &str,
        object_ids: &[&str],
    ) -> StorageResult<Vec<Object>> {
        let bucket = self
            .gated_bucket(policy, BucketKey::Id(bucket_id), AccessMode::Read)
            .await?;
        let ids = object_ids
            .iter()
            .map(|raw| parse_key(raw))
            .collect::<StorageResult<Vec<_>>>()?;
        let objects = self.catalog.find_by_ids(&ids).await?;
        Ok(objects
            .into_iter()
            .filter(|object| object.bucket_id() == bucket.id)
            .collect())
    }

    /// Replace display name and metadata; content fields are untouched and
    /// the owning bucket cannot be changed.
    pub async fn update_object_metadata(
        &self,
        policy: &dyn AccessPolicy,
        bucket_id: &str,
        object_id: &str,
        name: Option<&str>,
        patch: MetadataPatch,
    ) -> StorageResult<Object> {
        let bucket = self
            .gated_bucket(policy, BucketKey::Id(bucket_id), AccessMode::Write)
            .await?;
        let object = self.object_in_bucket(&bucket, object_id).await?;

        let mut metadata = object.metadata.0.clone();
        patch.apply(&mut metadata);
        let name = name.unwrap_or(&object.name);
        self.catalog.update_metadata(object.id, name, &metadata).await?;
        self.catalog.get(object.id).await
    }

    pub async fn delete_object(
        &self,
        policy: &dyn AccessPolicy,
        bucket_id: &str,
        object_id: &str,
    ) -> StorageResult<()> {
        let bucket = self
            .gated_bucket(policy, BucketKey::Id(bucket_id), AccessMode::Write)
            .await?;
        let object = self.object_in_bucket(&bucket, object_id).await?;
        self.catalog.delete_by_id(object.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::access::Caller;
    use crate::services::access::testpolicy::{DenyAll, WriteOnly};
    use crate::services::testutil::mem_pool;
    use futures::TryStreamExt;

    async fn service() -> StorageService {
        let db = mem_pool().await;
        let blobs = BlobStore::with_chunk_size(db.clone(), 4);
        StorageService::with_parts(
            db.clone(),
            BucketDirectory::new(db.clone()),
            ObjectCatalog::new(db, blobs),
        )
    }

    fn bytes(data: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> {
        futures::stream::iter([Ok(Bytes::from_static(data))])
    }

    #[tokio::test]
    async fn end_to_end_media_flow() {
        let svc = service().await;
        let caller = Caller::default();

        let bucket = svc.create_bucket("media").await.unwrap();
        let object = svc
            .upload_object(
                &caller,
                &bucket.id.to_string(),
                "/cat.png",
                Some("image/png"),
                None,
                bytes(b"0123456789"),
            )
            .await
            .unwrap();
        assert_eq!(object.size, 10);

        let by_name = svc
            .get_bucket(&caller, BucketKey::Name("media"))
            .await
            .unwrap();
        assert_eq!(by_name.id, bucket.id);
        assert_eq!(by_name.object_count, 1);
        assert_eq!(by_name.total_size, 10);

        let listed = svc
            .list_objects(&caller, &bucket.id.to_string(), 0, 100)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "/cat.png");
        assert_eq!(listed[0].size, 10);

        svc.delete_object(&caller, &bucket.id.to_string(), &object.id.to_string())
            .await
            .unwrap();
        let listed = svc
            .list_objects(&caller, &bucket.id.to_string(), 0, 100)
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn download_streams_bytes_back() {
        let svc = service().await;
        let caller = Caller::default();
        let bucket = svc.create_bucket("files").await.unwrap();
        svc.upload_object(
            &caller,
            &bucket.id.to_string(),
            "/notes.txt",
            Some("text/plain"),
            None,
            bytes(b"many small chunks add up"),
        )
        .await
        .unwrap();

        let reader = svc
            .download_object(&caller, "files", "/notes.txt")
            .await
            .unwrap();
        assert_eq!(reader.object.content_type.as_deref(), Some("text/plain"));
        let body: Vec<u8> = reader
            .stream
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .unwrap();
        assert_eq!(body, b"many small chunks add up");
    }

    #[tokio::test]
    async fn download_by_id_round_trips() {
        let svc = service().await;
        let caller = Caller::default();
        let bucket = svc.create_bucket("by-id").await.unwrap();
        let object = svc
            .upload_object(
                &caller,
                &bucket.id.to_string(),
                "/blob.bin",
                None,
                None,
                bytes(b"addressed by id"),
            )
            .await
            .unwrap();

        let reader = svc
            .download_object_by_id(&caller, &bucket.id.to_string(), &object.id.to_string())
            .await
            .unwrap();
        assert_eq!(reader.object.id, object.id);
        let body: Vec<u8> = reader
            .stream
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .unwrap();
        assert_eq!(body, b"addressed by id");
    }

    #[tokio::test]
    async fn facade_calls_run_on_spawned_tasks() {
        let svc = service().await;
        // handlers run on executor tasks, holding the policy as a trait
        // object across await points
        let caller: Box<dyn AccessPolicy> = Box::new(Caller::default());
        let handle = tokio::spawn(async move {
            let bucket = svc.create_bucket("spawned").await.unwrap();
            svc.list_objects(&*caller, &bucket.id.to_string(), 0, 10)
                .await
                .unwrap()
        });
        assert!(handle.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn denied_read_reveals_nothing() {
        let svc = service().await;
        let caller = Caller::default();
        let bucket = svc.create_bucket("private").await.unwrap();
        svc.upload_object(
            &caller,
            &bucket.id.to_string(),
            "/secret",
            None,
            None,
            bytes(b"classified"),
        )
        .await
        .unwrap();

        // both an existing and a missing object answer Forbidden: the gate
        // fires before any lookup could tell them apart
        let err = svc
            .download_object(&DenyAll, "private", "/secret")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Forbidden));
        let err = svc
            .download_object(&DenyAll, "private", "/no-such-object")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Forbidden));

        let err = svc
            .list_objects(&DenyAll, &bucket.id.to_string(), 0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Forbidden));
    }

    #[tokio::test]
    async fn write_only_policy_cannot_read() {
        let svc = service().await;
        let caller = Caller::default();
        let bucket = svc.create_bucket("drop-box").await.unwrap();
        let id = bucket.id.to_string();

        let uploaded = svc
            .upload_object(&WriteOnly, &id, "/in", None, None, bytes(b"payload"))
            .await;
        assert!(uploaded.is_ok());

        let err = svc.list_objects(&WriteOnly, &id, 0, 10).await.unwrap_err();
        assert!(matches!(err, StorageError::Forbidden));

        // sanity: a full caller still reads
        assert_eq!(svc.list_objects(&caller, &id, 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn object_lookups_are_scoped_to_the_bucket() {
        let svc = service().await;
        let caller = Caller::default();
        let mine = svc.create_bucket("mine").await.unwrap();
        let theirs = svc.create_bucket("theirs").await.unwrap();
        let object = svc
            .upload_object(
                &caller,
                &mine.id.to_string(),
                "/private.txt",
                None,
                None,
                bytes(b"data"),
            )
            .await
            .unwrap();

        let err = svc
            .get_object(&caller, &theirs.id.to_string(), &object.id.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound("object")));

        let cross = svc
            .list_objects_by_ids(
                &caller,
                &theirs.id.to_string(),
                &[&object.id.to_string()],
            )
            .await
            .unwrap();
        assert!(cross.is_empty());
    }

    #[tokio::test]
    async fn metadata_update_keeps_content_and_bucket() {
        let svc = service().await;
        let caller = Caller::default();
        let bucket = svc.create_bucket("tagged").await.unwrap();
        let object = svc
            .upload_object(
                &caller,
                &bucket.id.to_string(),
                "/img",
                None,
                None,
                bytes(b"pixels"),
            )
            .await
            .unwrap();

        let patch = MetadataPatch {
            title: Some("Sunset".into()),
            ..Default::default()
        };
        let updated = svc
            .update_object_metadata(
                &caller,
                &bucket.id.to_string(),
                &object.id.to_string(),
                Some("/sunset.jpg"),
                patch,
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "/sunset.jpg");
        assert_eq!(updated.metadata.title, "Sunset");
        assert_eq!(updated.bucket_id(), bucket.id);
        assert_eq!(updated.size, object.size);
        assert_eq!(updated.content_hash, object.content_hash);
        assert_eq!(updated.uploaded_at, object.uploaded_at);
    }

    #[tokio::test]
    async fn malformed_ids_are_rejected_up_front() {
        let svc = service().await;
        let caller = Caller::default();
        let err = svc
            .get_bucket(&caller, BucketKey::Id("zzz"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey));

        let bucket = svc.create_bucket("b1").await.unwrap();
        let err = svc
            .get_object(&caller, &bucket.id.to_string(), "also-not-a-uuid")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey));
    }

    #[tokio::test]
    async fn empty_names_fail_validation() {
        let svc = service().await;
        let caller = Caller::default();
        assert!(matches!(
            svc.create_bucket("  ").await.unwrap_err(),
            StorageError::Validation(_)
        ));

        let bucket = svc.create_bucket("ok").await.unwrap();
        let err = svc
            .upload_object(
                &caller,
                &bucket.id.to_string(),
                "",
                None,
                None,
                bytes(b""),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }
}
