//! ECDSA signing backend over NIST P-256 and SECG secp256k1.
//!
//! Keys are addressed by key id and loaded from the Fastly Secret Store. Signatures are produced
//! over SHA-256 digests and returned DER encoded.

use std::collections::HashMap;

use base64::{engine::general_purpose, Engine};
use error_stack::{Report, ResultExt};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use uuid::Uuid;

use crate::constants::SIGNING_ALGORITHM_ECDSA_SHA_256;
use crate::error::TrustCenterError;
use crate::fastly_storage::FastlySecretStore;
use crate::models::Keyspec;
use crate::settings::Settings;

use super::backend::{
    ResponseEnvelope, SignCommand, SignOutput, SigningBackend, VerifyCommand, VerifyOutput,
};

const DIGEST_LEN: usize = 32;
const SCALAR_LEN: usize = 32;

/// A private key of one of the supported curves.
pub enum EcdsaKey {
    P256(p256::ecdsa::SigningKey),
    K256(k256::ecdsa::SigningKey),
}

impl EcdsaKey {
    /// Parse a private scalar for `keyspec`. Accepts 32 raw bytes or their base64 encoding,
    /// either one optionally followed by a line ending.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid scalar for the curve.
    pub fn from_bytes(keyspec: Keyspec, key_bytes: &[u8]) -> Result<Self, Report<TrustCenterError>> {
        let bytes = if let Some(scalar) = raw_scalar(key_bytes) {
            scalar.to_vec()
        } else {
            general_purpose::STANDARD
                .decode(key_bytes.trim_ascii())
                .map_err(|_| {
                    Report::new(TrustCenterError::Configuration {
                        message: format!("{keyspec} key is neither {SCALAR_LEN} raw bytes nor base64"),
                    })
                })?
        };

        let key = match keyspec {
            Keyspec::Prime256v1 => p256::ecdsa::SigningKey::from_slice(&bytes).map(Self::P256),
            Keyspec::Secp256k1 => k256::ecdsa::SigningKey::from_slice(&bytes).map(Self::K256),
        };

        key.map_err(|_| {
            Report::new(TrustCenterError::Configuration {
                message: format!("Invalid {keyspec} private key"),
            })
        })
    }

    fn sign_prehash(&self, digest: &[u8]) -> Result<Vec<u8>, Report<TrustCenterError>> {
        let der = match self {
            Self::P256(key) => {
                let signature: p256::ecdsa::Signature = key.sign_prehash(digest).map_err(|e| {
                    Report::new(TrustCenterError::Backend {
                        message: format!("P-256 signing failed: {e}"),
                    })
                })?;
                signature.to_der().as_bytes().to_vec()
            }
            Self::K256(key) => {
                let signature: k256::ecdsa::Signature = key.sign_prehash(digest).map_err(|e| {
                    Report::new(TrustCenterError::Backend {
                        message: format!("secp256k1 signing failed: {e}"),
                    })
                })?;
                signature.to_der().as_bytes().to_vec()
            }
        };
        Ok(der)
    }

    fn verify_prehash(&self, digest: &[u8], der: &[u8]) -> bool {
        match self {
            Self::P256(key) => p256::ecdsa::Signature::from_der(der)
                .is_ok_and(|signature| key.verifying_key().verify_prehash(digest, &signature).is_ok()),
            Self::K256(key) => k256::ecdsa::Signature::from_der(der)
                .is_ok_and(|signature| key.verifying_key().verify_prehash(digest, &signature).is_ok()),
        }
    }
}

/// The raw scalar, if `bytes` is exactly one, optionally followed by `\n` or `\r\n`.
fn raw_scalar(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() == SCALAR_LEN {
        return Some(bytes);
    }
    let line = bytes.strip_suffix(b"\n")?;
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    (line.len() == SCALAR_LEN).then_some(line)
}

/// In-process backend holding one key per key id.
#[derive(Default)]
pub struct EcdsaSigningBackend {
    keys: HashMap<String, EcdsaKey>,
}

impl EcdsaSigningBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_key(mut self, key_id: impl Into<String>, key: EcdsaKey) -> Self {
        self.keys.insert(key_id.into(), key);
        self
    }

    /// Load the key of every keyspec from the configured secret store.
    ///
    /// # Errors
    ///
    /// Returns an error if a key is missing from the store or cannot be parsed.
    pub fn from_secret_store(settings: &Settings) -> Result<Self, Report<TrustCenterError>> {
        let secret_store = FastlySecretStore::new(&settings.stores.key_store);
        let mut backend = Self::new();

        for keyspec in Keyspec::ALL {
            let key_id = settings.keys.key_id(keyspec);
            let key_bytes = secret_store
                .get(key_id)
                .attach(format!("while loading {keyspec} signing key '{key_id}'"))?;
            let key = EcdsaKey::from_bytes(keyspec, &key_bytes)
                .attach(format!("key id: {key_id}"))?;
            backend = backend.with_key(key_id, key);
        }

        log::debug!("Loaded {} signing keys", backend.keys.len());
        Ok(backend)
    }

    fn key(&self, key_id: &str) -> Result<&EcdsaKey, Report<TrustCenterError>> {
        self.keys.get(key_id).ok_or_else(|| {
            Report::new(TrustCenterError::Backend {
                message: format!("Key '{key_id}' is not available"),
            })
        })
    }
}

fn check_algorithm(signing_algorithm: &str) -> Result<(), Report<TrustCenterError>> {
    if signing_algorithm == SIGNING_ALGORITHM_ECDSA_SHA_256 {
        Ok(())
    } else {
        Err(Report::new(TrustCenterError::Backend {
            message: format!("Unsupported signing algorithm: {signing_algorithm}"),
        }))
    }
}

fn check_digest(digest: &[u8]) -> Result<(), Report<TrustCenterError>> {
    if digest.len() == DIGEST_LEN {
        return Ok(());
    }
    Err(Report::new(TrustCenterError::Backend {
        message: format!(
            "Digest must be {DIGEST_LEN} bytes for {SIGNING_ALGORITHM_ECDSA_SHA_256}, got {}",
            digest.len()
        ),
    }))
}

fn envelope() -> ResponseEnvelope {
    ResponseEnvelope {
        http_status_code: 200,
        request_id: Uuid::new_v4().to_string(),
        extended_request_id: None,
        cf_id: None,
        attempts: 1,
        total_retry_delay: 0,
    }
}

impl SigningBackend for EcdsaSigningBackend {
    fn backend_name(&self) -> &'static str {
        "ecdsa"
    }

    fn sign(&self, command: &SignCommand<'_>) -> Result<SignOutput, Report<TrustCenterError>> {
        check_algorithm(command.signing_algorithm)?;
        let key = self.key(command.key_id)?;
        check_digest(command.digest)?;
        let signature = key.sign_prehash(command.digest)?;

        Ok(SignOutput {
            key_id: command.key_id.to_string(),
            signature,
            signing_algorithm: SIGNING_ALGORITHM_ECDSA_SHA_256.to_string(),
            envelope: envelope(),
        })
    }

    fn verify(&self, command: &VerifyCommand<'_>) -> Result<VerifyOutput, Report<TrustCenterError>> {
        check_algorithm(command.signing_algorithm)?;
        let key = self.key(command.key_id)?;
        check_digest(command.digest)?;

        Ok(VerifyOutput {
            key_id: command.key_id.to_string(),
            signature_valid: key.verify_prehash(command.digest, command.signature),
            envelope: envelope(),
        })
    }
}
