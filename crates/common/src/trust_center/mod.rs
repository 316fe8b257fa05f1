//! Message signing trust center.
//!
//! Issues signatures over SHA-256 message digests through a [`SigningBackend`], keeps one
//! [`IssuanceRecord`](crate::models::IssuanceRecord) per `(digest, keyspec)` in an
//! [`IssuanceStore`], and later answers whether an issued signature still holds: the backend
//! must confirm it and its expiry must not have passed.

use std::sync::Arc;

use error_stack::Report;

use crate::error::TrustCenterError;
use crate::fastly_storage::FastlyKvIssuanceStore;
use crate::settings::Settings;
use crate::signing::{EcdsaSigningBackend, SigningBackend};
use crate::storage::IssuanceStore;

pub mod endpoints;
pub mod guard;
pub mod orchestrator;
pub mod types;

pub use endpoints::{error_response, handle_index, handle_sign, handle_verify};
pub use guard::check_duplicate;
pub use orchestrator::TrustCenter;
pub use types::{IssuePayload, IssueRequest, VerifyRequest};

/// Wire the trust center to the configured Fastly stores.
///
/// # Errors
///
/// Returns an error if a signing key cannot be loaded from the secret store.
pub fn build_trust_center(settings: &Settings) -> Result<TrustCenter, Report<TrustCenterError>> {
    let backend: Arc<dyn SigningBackend> = Arc::new(EcdsaSigningBackend::from_secret_store(settings)?);
    let store: Arc<dyn IssuanceStore> =
        Arc::new(FastlyKvIssuanceStore::new(&settings.stores.record_store));

    log::debug!(
        "Trust center ready: backend={}, record store='{}'",
        backend.backend_name(),
        settings.stores.record_store
    );
    Ok(TrustCenter::new(backend, store, settings.keys.clone()))
}
