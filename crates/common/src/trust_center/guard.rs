//! Duplicate issuance guard.

use error_stack::Report;

use crate::constants::DUPLICATE_ISSUE_MESSAGE;
use crate::error::{into_internal, TrustCenterError};
use crate::models::{IssuanceRecord, Keyspec};
use crate::storage::IssuanceStore;

/// Decide whether `digest` may be issued under `keyspec`.
///
/// Issuance is refused when a record for the same keyspec exists, or when every keyspec slot of
/// the digest is already taken. The conflict lists every record sharing the digest so the
/// caller can extend one of them instead.
///
/// This is a read-then-decide pre-check; concurrent issuances are ultimately settled by the
/// store's uniqueness constraint.
///
/// # Errors
///
/// Returns [`TrustCenterError::Conflict`] on a duplicate and [`TrustCenterError::Internal`]
/// if the store cannot be queried.
pub fn check_duplicate(
    store: &dyn IssuanceStore,
    digest: &str,
    keyspec: Keyspec,
) -> Result<(), Report<TrustCenterError>> {
    let existing = store.find_by_digest(digest).map_err(into_internal)?;

    if let Some(conflict) = duplicate_conflict(&existing, keyspec) {
        log::info!(
            "Refusing issuance of {} under {}: {} existing record(s)",
            digest,
            keyspec,
            existing.len()
        );
        return Err(Report::new(conflict));
    }

    Ok(())
}

fn duplicate_conflict(existing: &[IssuanceRecord], keyspec: Keyspec) -> Option<TrustCenterError> {
    let same_keyspec = existing.iter().any(|record| record.keyspec == keyspec);
    let no_slot_left = existing.len() >= Keyspec::ALL.len();

    (same_keyspec || no_slot_left).then(|| TrustCenterError::Conflict {
        message: DUPLICATE_ISSUE_MESSAGE.to_string(),
        data: Some(existing.iter().map(IssuanceRecord::to_issued_ref).collect()),
    })
}
