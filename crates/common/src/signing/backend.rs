//! Trait definition for signing backends.

use error_stack::Report;

use crate::error::TrustCenterError;

/// Parameters of a sign call. `digest` is the SHA-256 of the content, never the content itself.
#[derive(Debug, Clone, Copy)]
pub struct SignCommand<'a> {
    pub key_id: &'a str,
    pub digest: &'a [u8],
    pub signing_algorithm: &'a str,
}

/// Parameters of a verify call.
#[derive(Debug, Clone, Copy)]
pub struct VerifyCommand<'a> {
    pub key_id: &'a str,
    pub digest: &'a [u8],
    pub signature: &'a [u8],
    pub signing_algorithm: &'a str,
}

/// Transport metadata the backend attaches to every response, in its native shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub http_status_code: u16,
    pub request_id: String,
    pub extended_request_id: Option<String>,
    pub cf_id: Option<String>,
    pub attempts: u32,
    pub total_retry_delay: u64,
}

#[derive(Debug, Clone)]
pub struct SignOutput {
    pub key_id: String,
    pub signature: Vec<u8>,
    pub signing_algorithm: String,
    pub envelope: ResponseEnvelope,
}

#[derive(Debug, Clone)]
pub struct VerifyOutput {
    pub key_id: String,
    pub signature_valid: bool,
    pub envelope: ResponseEnvelope,
}

/// Trait implemented by asymmetric signing services.
///
/// Implementations hold no per-request state and are shared across requests.
pub trait SigningBackend: Send + Sync {
    /// Short identifier used in logs (e.g. "ecdsa").
    fn backend_name(&self) -> &'static str;

    /// Sign `command.digest` with the key named by `command.key_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the algorithm is unsupported or signing fails.
    fn sign(&self, command: &SignCommand<'_>) -> Result<SignOutput, Report<TrustCenterError>>;

    /// Check `command.signature` over `command.digest`.
    ///
    /// A signature that does not verify is reported as `signature_valid: false`, not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the algorithm is unsupported.
    fn verify(&self, command: &VerifyCommand<'_>) -> Result<VerifyOutput, Report<TrustCenterError>>;
}
