//! Issuance and verification orchestration.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use error_stack::{Report, ResultExt};

use crate::constants::{
    DUPLICATE_ISSUE_MESSAGE, ISSUE_NOT_FOUND_MESSAGE, MALFORMED_ISSUED_ID_MESSAGE,
    SIGNING_ALGORITHM_ECDSA_SHA_256,
};
use crate::digest::{content_digest, decode_signature_input, is_well_formed_identifier};
use crate::error::{into_internal, TrustCenterError};
use crate::models::{Conditions, IssuanceReceipt, IssuanceRecord, VerificationRecord};
use crate::settings::Keys;
use crate::signing::{extract_metadata, SignCommand, SigningBackend, VerifyCommand};
use crate::storage::IssuanceStore;

use super::guard::check_duplicate;
use super::types::IssueRequest;

/// Issues and verifies signatures through an injected backend and record store.
///
/// Holds no per-request state; one instance serves any number of requests.
pub struct TrustCenter {
    backend: Arc<dyn SigningBackend>,
    store: Arc<dyn IssuanceStore>,
    keys: Keys,
}

impl TrustCenter {
    pub fn new(backend: Arc<dyn SigningBackend>, store: Arc<dyn IssuanceStore>, keys: Keys) -> Self {
        Self {
            backend,
            store,
            keys,
        }
    }

    /// Sign `request.message` under `request.keyspec` and persist the issuance.
    ///
    /// `now` is the request time; it becomes `created_at`, truncated to whole seconds.
    ///
    /// # Errors
    ///
    /// Returns a conflict when the message was already issued under the keyspec (or every
    /// keyspec is taken), and an internal error when the backend or the store fails. Nothing is
    /// persisted unless the backend signed successfully.
    pub fn sign(
        &self,
        request: &IssueRequest,
        now: DateTime<Utc>,
    ) -> Result<IssuanceReceipt, Report<TrustCenterError>> {
        let digest = content_digest(&request.message);
        let created_at = now.trunc_subsecs(0);
        let expired_at = expiry(created_at, request.expiry_days)?;

        check_duplicate(self.store.as_ref(), &digest, request.keyspec)?;

        let digest_bytes = hex::decode(&digest).change_context(TrustCenterError::internal(
            "Failed to decode message digest",
        ))?;
        let key_id = self.keys.key_id(request.keyspec);

        log::debug!(
            "Signing {} with {} key '{}' via {}",
            digest,
            request.keyspec,
            key_id,
            self.backend.backend_name()
        );
        let output = self
            .backend
            .sign(&SignCommand {
                key_id,
                digest: &digest_bytes,
                signing_algorithm: SIGNING_ALGORITHM_ECDSA_SHA_256,
            })
            .map_err(into_internal)?;

        let meta_data = extract_metadata(&output.envelope);
        let record = IssuanceRecord {
            issued_id: meta_data.request_id.clone(),
            issued_to: content_digest(&request.applicant),
            extended_issued_id: meta_data.extended_request_id.clone(),
            trace_id: meta_data.trace_id.clone(),
            attempts: meta_data.attempts,
            signing_algorithm: output.signing_algorithm,
            keyspec: request.keyspec,
            signature: general_purpose::STANDARD.encode(&output.signature),
            digest,
            created_at,
            updated_at: None,
            expired_at,
        };

        if let Err(report) = self.store.insert(&record) {
            return Err(self.insert_failure(report, &record));
        }

        log::info!(
            "Issued {} for {} under {} with key '{}'",
            record.issued_id,
            record.digest,
            record.keyspec,
            output.key_id
        );
        Ok(IssuanceReceipt { meta_data, record })
    }

    /// A store-side uniqueness rejection means a concurrent issuance won the race: answer with
    /// the same conflict the guard would give now.
    fn insert_failure(
        &self,
        report: Report<TrustCenterError>,
        record: &IssuanceRecord,
    ) -> Report<TrustCenterError> {
        if !matches!(report.current_context(), TrustCenterError::Conflict { .. }) {
            return into_internal(report);
        }

        log::warn!(
            "Store rejected issuance {} for {} under {}",
            record.issued_id,
            record.digest,
            record.keyspec
        );
        match check_duplicate(self.store.as_ref(), &record.digest, record.keyspec) {
            Err(conflict) => conflict,
            Ok(()) => report.change_context(TrustCenterError::conflict(DUPLICATE_ISSUE_MESSAGE)),
        }
    }

    /// Reproduce the verification decision for a previously issued signature.
    ///
    /// # Errors
    ///
    /// Returns a conflict when `issued_id` is missing, malformed or unknown, and an internal
    /// error when the store or the backend fails.
    pub fn verify(
        &self,
        issued_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<VerificationRecord, Report<TrustCenterError>> {
        let issued_id = match issued_id {
            Some(id) if is_well_formed_identifier(id) => id,
            _ => {
                return Err(Report::new(TrustCenterError::conflict(
                    MALFORMED_ISSUED_ID_MESSAGE,
                )))
            }
        };

        let record = self
            .store
            .find_by_id(issued_id)
            .map_err(into_internal)?
            .ok_or_else(|| Report::new(TrustCenterError::conflict(ISSUE_NOT_FOUND_MESSAGE)))?;

        let digest = decode_signature_input(&record.digest).map_err(into_internal)?;
        let signature = decode_signature_input(&record.signature).map_err(into_internal)?;

        let output = self
            .backend
            .verify(&VerifyCommand {
                key_id: self.keys.key_id(record.keyspec),
                digest: &digest,
                signature: &signature,
                signing_algorithm: &record.signing_algorithm,
            })
            .map_err(into_internal)?;

        let legitimate = output.signature_valid;
        let active = record.is_active_at(now);
        log::info!(
            "Verified {} with key '{}': legitimate={}, active={}",
            record.issued_id,
            output.key_id,
            legitimate,
            active
        );

        Ok(VerificationRecord {
            meta_data: extract_metadata(&output.envelope),
            issued_id: record.issued_id,
            issued_to: record.issued_to,
            keyspec: record.keyspec,
            signing_algorithm: record.signing_algorithm,
            signature: record.signature,
            digest: record.digest,
            signature_valid: legitimate && active,
            conditions: Conditions { legitimate, active },
            created_at: record.created_at,
            updated_at: record.updated_at,
            expired_at: record.expired_at,
        })
    }
}

fn expiry(
    created_at: DateTime<Utc>,
    expiry_days: u32,
) -> Result<Option<DateTime<Utc>>, Report<TrustCenterError>> {
    if expiry_days == 0 {
        return Ok(None);
    }

    TimeDelta::try_days(i64::from(expiry_days))
        .and_then(|delta| created_at.checked_add_signed(delta))
        .map(Some)
        .ok_or_else(|| {
            Report::new(TrustCenterError::Validation {
                message: format!("expiry of {expiry_days} days is out of range"),
                fields: Default::default(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::UNSET_TIMESTAMP;
    use crate::models::Keyspec;
    use crate::storage::MemoryIssuanceStore;
    use crate::test_support::tests::{
        issue_request, test_backend, test_keys, CountingStore, FailingStore, ScriptedBackend,
        StaleReadStore,
    };
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 15).unwrap()
            + TimeDelta::milliseconds(250)
    }

    fn center() -> (TrustCenter, Arc<MemoryIssuanceStore>) {
        let store = Arc::new(MemoryIssuanceStore::new());
        let center = TrustCenter::new(Arc::new(test_backend()), store.clone(), test_keys());
        (center, store)
    }

    #[test]
    fn test_sign_builds_full_record() {
        let (center, store) = center();
        let message = "deadbeef".repeat(4);
        let now = fixed_now();

        let receipt = center
            .sign(&issue_request(&message, Keyspec::Prime256v1, 1), now)
            .unwrap();
        let record = &receipt.record;

        assert_eq!(record.digest, content_digest(&message));
        assert_eq!(record.issued_to, content_digest("a@b.com"));
        assert_eq!(record.keyspec, Keyspec::Prime256v1);
        assert_eq!(record.signing_algorithm, "ECDSA_SHA_256");
        assert_eq!(record.issued_id, receipt.meta_data.request_id);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.created_at, Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 15).unwrap());
        assert_eq!(record.expired_at, Some(record.created_at + TimeDelta::days(1)));
        assert_eq!(record.updated_at, None);
        assert!(is_well_formed_identifier(&record.issued_id));
        assert_eq!(store.find_by_id(&record.issued_id).unwrap().as_ref(), Some(record));
    }

    #[test]
    fn test_sign_zero_expiry_never_expires() {
        let (center, _) = center();
        let receipt = center
            .sign(&issue_request("forever", Keyspec::Secp256k1, 0), fixed_now())
            .unwrap();
        assert_eq!(receipt.record.expired_at, None);
    }

    #[test]
    fn test_sign_same_keyspec_twice_conflicts() {
        let (center, store) = center();
        let request = issue_request("hello", Keyspec::Prime256v1, 1);
        let first = center.sign(&request, fixed_now()).unwrap();

        let err = center.sign(&request, fixed_now()).unwrap_err();
        match err.current_context() {
            TrustCenterError::Conflict {
                message,
                data: Some(data),
            } => {
                assert_eq!(message, DUPLICATE_ISSUE_MESSAGE);
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].issued_id, first.record.issued_id);
                assert_eq!(data[0].keyspec, Keyspec::Prime256v1);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_sign_other_keyspec_succeeds_then_slots_are_exhausted() {
        let (center, store) = center();
        let first = center
            .sign(&issue_request("hello", Keyspec::Prime256v1, 1), fixed_now())
            .unwrap();
        let second = center
            .sign(&issue_request("hello", Keyspec::Secp256k1, 1), fixed_now())
            .unwrap();
        assert_eq!(first.record.digest, second.record.digest);
        assert_ne!(first.record.issued_id, second.record.issued_id);

        for keyspec in Keyspec::ALL {
            let err = center
                .sign(&issue_request("hello", keyspec, 1), fixed_now())
                .unwrap_err();
            match err.current_context() {
                TrustCenterError::Conflict {
                    data: Some(data), ..
                } => {
                    let ids: Vec<_> = data.iter().map(|r| r.issued_id.as_str()).collect();
                    assert!(ids.contains(&first.record.issued_id.as_str()));
                    assert!(ids.contains(&second.record.issued_id.as_str()));
                }
                other => panic!("expected conflict, got {other:?}"),
            }
        }
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_sign_conflict_skips_backend() {
        let backend = Arc::new(ScriptedBackend::valid());
        let store = Arc::new(MemoryIssuanceStore::new());
        let center = TrustCenter::new(backend.clone(), store, test_keys());
        let request = issue_request("hello", Keyspec::Prime256v1, 1);

        center.sign(&request, fixed_now()).unwrap();
        assert!(center.sign(&request, fixed_now()).is_err());
        assert_eq!(backend.sign_calls(), 1);
    }

    #[test]
    fn test_sign_backend_failure_is_internal_and_persists_nothing() {
        let store = Arc::new(MemoryIssuanceStore::new());
        let center = TrustCenter::new(Arc::new(ScriptedBackend::failing()), store.clone(), test_keys());

        let err = center
            .sign(&issue_request("hello", Keyspec::Prime256v1, 1), fixed_now())
            .unwrap_err();
        match err.current_context() {
            TrustCenterError::Internal { message } => assert!(message.contains("backend unavailable")),
            other => panic!("expected internal error, got {other:?}"),
        }
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_sign_store_failure_is_internal() {
        let center = TrustCenter::new(Arc::new(test_backend()), Arc::new(FailingStore), test_keys());
        let err = center
            .sign(&issue_request("hello", Keyspec::Prime256v1, 1), fixed_now())
            .unwrap_err();
        assert!(matches!(err.current_context(), TrustCenterError::Internal { .. }));
    }

    #[test]
    fn test_sign_lost_race_returns_winner_in_conflict() {
        let backend = Arc::new(ScriptedBackend::valid());
        // The second request's duplicate check runs before the first insert becomes visible.
        let store = Arc::new(StaleReadStore::new(MemoryIssuanceStore::new(), 2));
        let center = TrustCenter::new(backend.clone(), store.clone(), test_keys());
        let request = issue_request("hello", Keyspec::Prime256v1, 1);

        let winner = center.sign(&request, fixed_now()).unwrap();
        let err = center.sign(&request, fixed_now()).unwrap_err();

        match err.current_context() {
            TrustCenterError::Conflict {
                message,
                data: Some(data),
            } => {
                assert_eq!(message, DUPLICATE_ISSUE_MESSAGE);
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].issued_id, winner.record.issued_id);
                assert_eq!(data[0].keyspec, Keyspec::Prime256v1);
            }
            other => panic!("expected conflict with data, got {other:?}"),
        }
        assert_eq!(backend.sign_calls(), 2);
        assert_eq!(
            store.find_by_digest(&winner.record.digest).unwrap(),
            vec![winner.record.clone()]
        );
    }

    #[test]
    fn test_sign_store_uniqueness_rejection_becomes_conflict() {
        let backend = Arc::new(ScriptedBackend::valid().with_fixed_request_id(
            "1b4e28ba-2fa1-4d2b-a883-6c7f1e2d3a4b",
        ));
        let center = TrustCenter::new(backend, Arc::new(MemoryIssuanceStore::new()), test_keys());

        center
            .sign(&issue_request("first", Keyspec::Prime256v1, 1), fixed_now())
            .unwrap();
        // Same issued_id for a different digest: the guard passes, the store refuses.
        let err = center
            .sign(&issue_request("second", Keyspec::Prime256v1, 1), fixed_now())
            .unwrap_err();
        match err.current_context() {
            TrustCenterError::Conflict { message, data } => {
                assert_eq!(message, DUPLICATE_ISSUE_MESSAGE);
                assert!(data.is_none());
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_fresh_issuance_is_valid_and_active() {
        let (center, _) = center();
        let now = fixed_now();
        let receipt = center
            .sign(&issue_request("hello", Keyspec::Secp256k1, 1), now)
            .unwrap();

        let verified = center
            .verify(Some(&receipt.record.issued_id), now + TimeDelta::hours(1))
            .unwrap();

        assert!(verified.conditions.legitimate);
        assert!(verified.conditions.active);
        assert!(verified.signature_valid);
        assert_eq!(verified.digest, receipt.record.digest);
        assert_eq!(verified.keyspec, Keyspec::Secp256k1);
        assert_eq!(verified.expired_at, receipt.record.expired_at);
    }

    #[test]
    fn test_verify_after_expiry_is_inactive() {
        let (center, _) = center();
        let now = fixed_now();
        let receipt = center
            .sign(&issue_request("hello", Keyspec::Prime256v1, 1), now)
            .unwrap();

        let verified = center
            .verify(Some(&receipt.record.issued_id), now + TimeDelta::days(2))
            .unwrap();

        assert!(verified.conditions.legitimate);
        assert!(!verified.conditions.active);
        assert!(!verified.signature_valid);
    }

    #[test]
    fn test_verify_exactly_at_expiry_is_inactive() {
        let (center, _) = center();
        let receipt = center
            .sign(&issue_request("hello", Keyspec::Prime256v1, 1), fixed_now())
            .unwrap();
        let expired_at = receipt.record.expired_at.unwrap();

        let verified = center.verify(Some(&receipt.record.issued_id), expired_at).unwrap();
        assert!(!verified.conditions.active);
    }

    #[test]
    fn test_verify_zero_expiry_never_expires() {
        let (center, _) = center();
        let receipt = center
            .sign(&issue_request("hello", Keyspec::Prime256v1, 0), fixed_now())
            .unwrap();

        let verified = center
            .verify(
                Some(&receipt.record.issued_id),
                fixed_now() + TimeDelta::days(365 * 50),
            )
            .unwrap();
        assert!(verified.conditions.active);
        assert!(verified.signature_valid);
    }

    #[test]
    fn test_verify_reports_backend_invalid_separately() {
        let store = Arc::new(MemoryIssuanceStore::new());
        let signer = TrustCenter::new(Arc::new(test_backend()), store.clone(), test_keys());
        let receipt = signer
            .sign(&issue_request("hello", Keyspec::Prime256v1, 1), fixed_now())
            .unwrap();

        let verifier = TrustCenter::new(Arc::new(ScriptedBackend::invalid()), store, test_keys());
        let verified = verifier
            .verify(Some(&receipt.record.issued_id), fixed_now())
            .unwrap();

        assert!(!verified.conditions.legitimate);
        assert!(verified.conditions.active);
        assert!(!verified.signature_valid);
    }

    #[test]
    fn test_verify_tampered_signature_is_not_legitimate() {
        let store = Arc::new(MemoryIssuanceStore::new());
        let center = TrustCenter::new(Arc::new(test_backend()), store.clone(), test_keys());
        let first = center
            .sign(&issue_request("first", Keyspec::Prime256v1, 1), fixed_now())
            .unwrap();
        let second = center
            .sign(&issue_request("second", Keyspec::Prime256v1, 1), fixed_now())
            .unwrap();

        // Re-home the first signature onto the second digest.
        let tampered_store = Arc::new(MemoryIssuanceStore::new());
        let mut tampered = second.record.clone();
        tampered.signature = first.record.signature.clone();
        tampered_store.insert(&tampered).unwrap();

        let verifier = TrustCenter::new(Arc::new(test_backend()), tampered_store, test_keys());
        let verified = verifier.verify(Some(&tampered.issued_id), fixed_now()).unwrap();
        assert!(!verified.conditions.legitimate);
        assert!(!verified.signature_valid);
    }

    #[test]
    fn test_verify_missing_or_malformed_id_skips_store() {
        let store = Arc::new(CountingStore::new(MemoryIssuanceStore::new()));
        let backend = Arc::new(ScriptedBackend::valid());
        let center = TrustCenter::new(backend.clone(), store.clone(), test_keys());

        for issued_id in [None, Some(""), Some("not-a-uuid"), Some("1b4e28ba-2fa1-11d2-a883-6c7f1e2d3a4b")] {
            let err = center.verify(issued_id, fixed_now()).unwrap_err();
            match err.current_context() {
                TrustCenterError::Conflict { message, .. } => {
                    assert_eq!(message, MALFORMED_ISSUED_ID_MESSAGE);
                }
                other => panic!("expected conflict, got {other:?}"),
            }
        }
        assert_eq!(store.id_lookups(), 0);
        assert_eq!(backend.verify_calls(), 0);
    }

    #[test]
    fn test_verify_unknown_id_conflicts() {
        let (center, _) = center();
        let err = center
            .verify(Some("1b4e28ba-2fa1-4d2b-a883-6c7f1e2d3a4b"), fixed_now())
            .unwrap_err();
        match err.current_context() {
            TrustCenterError::Conflict { message, .. } => {
                assert_eq!(message, ISSUE_NOT_FOUND_MESSAGE);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_store_failure_is_internal() {
        let center = TrustCenter::new(Arc::new(test_backend()), Arc::new(FailingStore), test_keys());
        let err = center
            .verify(Some("1b4e28ba-2fa1-4d2b-a883-6c7f1e2d3a4b"), fixed_now())
            .unwrap_err();
        assert!(matches!(err.current_context(), TrustCenterError::Internal { .. }));
    }

    #[test]
    fn test_verify_backend_failure_is_internal() {
        let store = Arc::new(MemoryIssuanceStore::new());
        let signer = TrustCenter::new(Arc::new(test_backend()), store.clone(), test_keys());
        let receipt = signer
            .sign(&issue_request("hello", Keyspec::Secp256k1, 1), fixed_now())
            .unwrap();

        let verifier = TrustCenter::new(Arc::new(ScriptedBackend::failing()), store, test_keys());
        let err = verifier
            .verify(Some(&receipt.record.issued_id), fixed_now())
            .unwrap_err();
        assert!(matches!(err.current_context(), TrustCenterError::Internal { .. }));
    }

    #[test]
    fn test_verify_reads_legacy_records() {
        let (center, store) = center();
        let receipt = center
            .sign(&issue_request("hello", Keyspec::Prime256v1, 0), fixed_now())
            .unwrap();

        let mut value = serde_json::to_value(&receipt.record).unwrap();
        value["expired_at"] = serde_json::json!(UNSET_TIMESTAMP);
        let legacy: IssuanceRecord = serde_json::from_value(value).unwrap();
        assert_eq!(legacy.expired_at, None);
        assert_eq!(store.find_by_id(&legacy.issued_id).unwrap(), Some(legacy));
    }

    #[test]
    fn test_expiry_out_of_range() {
        let err = expiry(fixed_now(), u32::MAX).unwrap_err();
        assert!(matches!(err.current_context(), TrustCenterError::Validation { .. }));
    }
}
