//! In-memory issuance store.
//!
//! Data is lost on restart.

use std::sync::{Mutex, MutexGuard};

use error_stack::Report;

use crate::error::TrustCenterError;
use crate::models::IssuanceRecord;

use super::IssuanceStore;

#[derive(Debug, Default)]
pub struct MemoryIssuanceStore {
    records: Mutex<Vec<IssuanceRecord>>,
}

impl MemoryIssuanceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn len(&self) -> Result<usize, Report<TrustCenterError>> {
        Ok(self.lock()?.len())
    }

    /// Whether the store holds no records.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, Report<TrustCenterError>> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<IssuanceRecord>>, Report<TrustCenterError>> {
        self.records.lock().map_err(|_| {
            Report::new(TrustCenterError::Storage {
                message: "record store lock poisoned".into(),
            })
        })
    }
}

impl IssuanceStore for MemoryIssuanceStore {
    fn insert(&self, record: &IssuanceRecord) -> Result<String, Report<TrustCenterError>> {
        let mut records = self.lock()?;

        if records.iter().any(|r| r.issued_id == record.issued_id) {
            return Err(Report::new(TrustCenterError::conflict(format!(
                "Record '{}' already exists",
                record.issued_id
            ))));
        }

        if records
            .iter()
            .any(|r| r.keyspec == record.keyspec && r.digest.eq_ignore_ascii_case(&record.digest))
        {
            return Err(Report::new(TrustCenterError::conflict(format!(
                "Digest already issued under {}",
                record.keyspec
            ))));
        }

        log::debug!("Storing issuance {}", record.issued_id);
        records.push(record.clone());
        Ok(record.issued_id.clone())
    }

    fn find_by_digest(&self, digest: &str) -> Result<Vec<IssuanceRecord>, Report<TrustCenterError>> {
        let records = self.lock()?;
        Ok(records
            .iter()
            .filter(|r| r.digest.eq_ignore_ascii_case(digest))
            .cloned()
            .collect())
    }

    fn find_by_id(&self, issued_id: &str) -> Result<Option<IssuanceRecord>, Report<TrustCenterError>> {
        let records = self.lock()?;
        Ok(records.iter().find(|r| r.issued_id == issued_id).cloned())
    }
}
