//! Core data models for the multi-tenant object storage service.
//!
//! Buckets are uniquely named tenant namespaces; objects are named binary
//! blobs scoped to one bucket. Records map to SQLite rows via
//! `sqlx::FromRow` and serialize as JSON via `serde`.

pub mod bucket;
pub mod metadata;
pub mod object;
