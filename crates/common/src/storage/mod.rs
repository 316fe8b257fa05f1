//! Issuance record storage.
//!
//! [`IssuanceStore`] is the persistence seam of the trust center. Implementations must enforce
//! `issued_id` uniqueness and, atomically with the insert, `(digest, keyspec)` uniqueness: the
//! duplicate guard only pre-checks, the store has the final word when two issuances race.
//!
//! - [`MemoryIssuanceStore`]: process-local, used for tests and local development.
//! - [`crate::fastly_storage::FastlyKvIssuanceStore`]: Fastly KV Store.

pub mod memory;

pub use memory::MemoryIssuanceStore;

use error_stack::Report;

use crate::error::TrustCenterError;
use crate::models::IssuanceRecord;

/// Storage backend for issuance records.
///
/// A uniqueness violation on insert is reported as [`TrustCenterError::Conflict`]; every other
/// failure as [`TrustCenterError::Storage`].
pub trait IssuanceStore: Send + Sync {
    /// Persist a new record and return its `issued_id`.
    ///
    /// # Errors
    ///
    /// Returns a conflict if the `issued_id` or the `(digest, keyspec)` pair already exists,
    /// or a storage error if the write fails.
    fn insert(&self, record: &IssuanceRecord) -> Result<String, Report<TrustCenterError>>;

    /// All records whose digest matches `digest`, ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    fn find_by_digest(&self, digest: &str) -> Result<Vec<IssuanceRecord>, Report<TrustCenterError>>;

    /// The record with the given `issued_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    fn find_by_id(&self, issued_id: &str) -> Result<Option<IssuanceRecord>, Report<TrustCenterError>>;
}
