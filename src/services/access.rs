//! Access gate - the single read/write decision point guarding
//! bucket-scoped operations.
//!
//! Read and write are genuinely independent predicates. The gate owns no
//! policy: who may read or write a bucket is decided by whatever the
//! caller supplies as the `AccessPolicy`.

use crate::errors::{StorageError, StorageResult};
use crate::models::bucket::Bucket;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Caller-supplied permission predicates.
///
/// Policies ride through handler futures as trait objects, so they must
/// be shareable across await points and tasks.
pub trait AccessPolicy: Send + Sync {
    fn can_read_bucket(&self, bucket: &Bucket) -> bool;
    fn can_write_bucket(&self, bucket: &Bucket) -> bool;
}

/// Evaluate the policy for one operation on one bucket.
///
/// Denial is always `Forbidden`, never a not-found variant, so a denied
/// caller learns nothing about what exists behind the gate.
pub fn check_access(
    policy: &dyn AccessPolicy,
    bucket: &Bucket,
    mode: AccessMode,
) -> StorageResult<()> {
    let allowed = match mode {
        AccessMode::Read => policy.can_read_bucket(bucket),
        AccessMode::Write => policy.can_write_bucket(bucket),
    };
    if allowed { Ok(()) } else { Err(StorageError::Forbidden) }
}

/// The identity resolved for a request by the (external) auth layer.
///
/// Until bucket ownership and sharing land, every known caller may read
/// and write every bucket; the gate is still consulted on every operation
/// so tightening the policy is a change here, not in the façade.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub user_id: Option<Uuid>,
}

impl Caller {
    pub fn new(user_id: Option<Uuid>) -> Self {
        Self { user_id }
    }
}

impl AccessPolicy for Caller {
    fn can_read_bucket(&self, _bucket: &Bucket) -> bool {
        true
    }

    fn can_write_bucket(&self, _bucket: &Bucket) -> bool {
        true
    }
}
