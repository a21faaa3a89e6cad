//! The storage core: bucket directory, chunked blob store, object catalog,
//! access gate, and the façade that composes them for the HTTP layer.

pub mod access;
pub mod blob_store;
pub mod catalog;
pub mod directory;
pub mod storage_service;

#[cfg(test)]
pub(crate) mod testutil {
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

    /// Fresh in-memory database with the schema applied.
    pub async fn mem_pool() -> Arc<SqlitePool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        for stmt in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt)
                .execute(&pool)
                .await
                .expect("schema statement");
        }
        Arc::new(pool)
    }
}
