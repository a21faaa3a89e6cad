//! Chunked blob store - append-only storage of byte streams split into
//! fixed-size chunks, addressed by a generated id.
//!
//! The store knows nothing about buckets or the object catalog. Writers
//! stream bytes in, computing size and MD5 as chunks are flushed, and only
//! `finalize()` yields an addressable blob; an aborted or failed write
//! removes every chunk it managed to insert. Reads are lazy, forward-only
//! streams starting at an arbitrary byte offset, so per-request memory is
//! bounded by the chunk size rather than the blob size.

use crate::errors::{StorageError, StorageResult};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::io;
use std::sync::Arc;
use uuid::Uuid;

/// 255 KiB, matching the classic GridFS chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

/// Result of closing a blob writer: everything derived from the byte
/// stream that the catalog needs to persist.
#[derive(Debug, Clone)]
pub struct FinalizedBlob {
    pub id: Uuid,
    pub size: i64,
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct BlobStore {
    db: Arc<SqlitePool>,
    chunk_size: usize,
}

impl BlobStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self::with_chunk_size(db, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(db: Arc<SqlitePool>, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self { db, chunk_size }
    }

    /// Open a writer for a new blob. The id is assigned here.
    pub fn writer(&self) -> BlobWriter {
        BlobWriter {
            db: self.db.clone(),
            id: Uuid::new_v4(),
            chunk_size: self.chunk_size,
            buf: BytesMut::new(),
            seq: 0,
            size: 0,
            digest: Context::new(),
        }
    }

    /// Drain `stream` into a new blob and finalize it.
    ///
    /// A failing stream item or chunk insert aborts the write: no chunks
    /// survive and no blob id becomes addressable.
    pub async fn store<S>(&self, stream: S) -> StorageResult<FinalizedBlob>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let mut writer = self.writer();
        pin_mut!(stream);
        while let Some(next) = stream.next().await {
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(err) => {
                    writer.abort().await;
                    return Err(StorageError::WriteFailure(err));
                }
            };
            if let Err(err) = writer.push(&chunk).await {
                writer.abort().await;
                return Err(err);
            }
        }
        writer.finalize().await
    }

    /// Lazy, forward-only read of a blob starting at `offset` bytes.
    ///
    /// Chunks are fetched one at a time as the stream is polled; dropping
    /// the stream early releases everything. A blob with no chunks yields
    /// an empty stream, which is indistinguishable from a missing id;
    /// existence checks belong to the catalog.
    pub fn read(&self, id: Uuid, offset: i64) -> BoxStream<'static, StorageResult<Bytes>> {
        let db = self.db.clone();
        let chunk_size = self.chunk_size as i64;
        let offset = offset.max(0);
        let first_seq = offset / chunk_size;
        let first_skip = (offset % chunk_size) as usize;

        futures::stream::try_unfold(
            (db, first_seq, first_skip),
            move |(db, seq, skip)| async move {
                let row: Option<Vec<u8>> =
                    sqlx::query_scalar("SELECT data FROM chunks WHERE object_id = ? AND seq = ?")
                        .bind(id)
                        .bind(seq)
                        .fetch_optional(&*db)
                        .await?;
                match row {
                    None => Ok(None),
                    Some(data) => {
                        let bytes = Bytes::from(data);
                        let start = skip.min(bytes.len());
                        Ok(Some((bytes.slice(start..), (db, seq + 1, 0))))
                    }
                }
            },
        )
        .boxed()
    }

    /// Remove every chunk of a blob. Returns the number of chunks removed.
    pub async fn delete(&self, id: Uuid) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE object_id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of stored chunks for a blob.
    pub async fn chunk_count(&self, id: Uuid) -> StorageResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE object_id = ?")
            .bind(id)
            .fetch_one(&*self.db)
            .await?;
        Ok(count)
    }
}

/// In-progress blob write.
///
/// Bytes accumulate in a buffer that is flushed as full fixed-size chunk
/// rows; the trailing partial chunk is flushed by `finalize()`. Size and
/// hash are accounted as bytes arrive, never by re-reading.
pub struct BlobWriter {
    db: Arc<SqlitePool>,
    id: Uuid,
    chunk_size: usize,
    buf: BytesMut,
    seq: i64,
    size: i64,
    digest: Context,
}

impl BlobWriter {
    /// Append bytes, flushing full chunks as they fill.
    pub async fn push(&mut self, chunk: &[u8]) -> StorageResult<()> {
        self.digest.consume(chunk);
        self.size += chunk.len() as i64;
        self.buf.extend_from_slice(chunk);
        while self.buf.len() >= self.chunk_size {
            let data = self.buf.split_to(self.chunk_size).to_vec();
            self.write_chunk(data).await?;
        }
        Ok(())
    }

    /// Flush the trailing chunk and close the blob.
    ///
    /// On a failed flush the already-written chunks are removed before the
    /// error propagates, so no half-written blob remains addressable.
    pub async fn finalize(mut self) -> StorageResult<FinalizedBlob> {
        if !self.buf.is_empty() {
            let data = self.buf.split_off(0).to_vec();
            if let Err(err) = self.write_chunk(data).await {
                self.abort().await;
                return Err(err);
            }
        }
        Ok(FinalizedBlob {
            id: self.id,
            size: self.size,
            content_hash: format!("{:x}", self.digest.compute()),
            uploaded_at: Utc::now(),
        })
    }

    /// Discard the write, removing any chunks already inserted.
    pub async fn abort(self) {
        if let Err(err) = sqlx::query("DELETE FROM chunks WHERE object_id = ?")
            .bind(self.id)
            .execute(&*self.db)
            .await
        {
            tracing::error!("failed to clean up chunks of aborted blob {}: {err}", self.id);
        }
    }

    async fn write_chunk(&mut self, data: Vec<u8>) -> StorageResult<()> {
        sqlx::query("INSERT INTO chunks (object_id, seq, data) VALUES (?, ?, ?)")
            .bind(self.id)
            .bind(self.seq)
            .bind(data)
            .execute(&*self.db)
            .await?;
        self.seq += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testutil::mem_pool;
    use futures::TryStreamExt;

    fn byte_stream(parts: Vec<&'static [u8]>) -> impl Stream<Item = io::Result<Bytes>> {
        futures::stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    async fn read_all(store: &BlobStore, id: Uuid, offset: i64) -> Vec<u8> {
        store
            .read(id, offset)
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .expect("read blob")
    }

    #[tokio::test]
    async fn round_trips_bytes_across_chunk_boundaries() {
        let store = BlobStore::with_chunk_size(mem_pool().await, 4);
        let payload = b"hello chunked world";

        let blob = store
            .store(byte_stream(vec![&payload[..7], &payload[7..]]))
            .await
            .unwrap();

        assert_eq!(blob.size, payload.len() as i64);
        assert_eq!(blob.content_hash, format!("{:x}", md5::compute(payload)));
        assert_eq!(store.chunk_count(blob.id).await.unwrap(), 5);
        assert_eq!(read_all(&store, blob.id, 0).await, payload);
    }

    #[tokio::test]
    async fn stores_empty_blob() {
        let store = BlobStore::new(mem_pool().await);
        let blob = store.store(byte_stream(vec![])).await.unwrap();
        assert_eq!(blob.size, 0);
        assert_eq!(blob.content_hash, format!("{:x}", md5::compute(b"")));
        assert!(read_all(&store, blob.id, 0).await.is_empty());
    }

    #[tokio::test]
    async fn reads_from_arbitrary_offset() {
        let store = BlobStore::with_chunk_size(mem_pool().await, 4);
        let payload = b"0123456789";
        let blob = store.store(byte_stream(vec![payload])).await.unwrap();

        assert_eq!(read_all(&store, blob.id, 6).await, b"6789");
        // offset inside the first chunk
        assert_eq!(read_all(&store, blob.id, 2).await, b"23456789");
        // offset past the end yields nothing
        assert!(read_all(&store, blob.id, 64).await.is_empty());
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_chunks() {
        let db = mem_pool().await;
        let store = BlobStore::with_chunk_size(db.clone(), 2);
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"some data")),
            Err(io::Error::other("client went away")),
        ]);

        let err = store.store(stream).await.unwrap_err();
        assert!(matches!(err, StorageError::WriteFailure(_)));

        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&*db)
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn delete_removes_all_chunks() {
        let store = BlobStore::with_chunk_size(mem_pool().await, 2);
        let blob = store.store(byte_stream(vec![b"abcdefgh"])).await.unwrap();
        assert_eq!(store.chunk_count(blob.id).await.unwrap(), 4);

        let removed = store.delete(blob.id).await.unwrap();
        assert_eq!(removed, 4);
        assert_eq!(store.chunk_count(blob.id).await.unwrap(), 0);
        assert!(read_all(&store, blob.id, 0).await.is_empty());
    }
}
