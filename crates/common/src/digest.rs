//! Content hashing and encoding helpers.
//!
//! Pure functions shared by issuance and verification: the SHA-256 content digest used both as
//! the signed value and as the duplicate detection key, tolerant decoding of stored signature
//! material, and validation of issuance identifiers.

use base64::{engine::general_purpose, Engine};
use error_stack::Report;
use sha2::{Digest, Sha256};
use uuid::{Uuid, Variant, Version};

use crate::error::TrustCenterError;

/// Compute the SHA-256 digest of `message`, lowercase hex encoded.
pub fn content_digest(message: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(message.as_ref()))
}

/// Signature material as it arrives from a caller or from the record store.
#[derive(Debug, Clone, Copy)]
pub enum SignatureInput<'a> {
    Bytes(&'a [u8]),
    Text(&'a str),
}

impl<'a> From<&'a [u8]> for SignatureInput<'a> {
    fn from(value: &'a [u8]) -> Self {
        Self::Bytes(value)
    }
}

impl<'a> From<&'a Vec<u8>> for SignatureInput<'a> {
    fn from(value: &'a Vec<u8>) -> Self {
        Self::Bytes(value.as_slice())
    }
}

impl<'a> From<&'a str> for SignatureInput<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a String> for SignatureInput<'a> {
    fn from(value: &'a String) -> Self {
        Self::Text(value.as_str())
    }
}

fn looks_like_hex(value: &str) -> bool {
    !value.is_empty() && value.len() % 2 == 0 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Decode raw bytes, a hex string or a base64 string into bytes.
///
/// Hex is tried first so a valid hex string is never misread as base64.
///
/// # Errors
///
/// Returns [`TrustCenterError::Format`] when a string is empty or decodes as neither hex nor base64.
pub fn decode_signature_input<'a>(
    value: impl Into<SignatureInput<'a>>,
) -> Result<Vec<u8>, Report<TrustCenterError>> {
    let text = match value.into() {
        SignatureInput::Bytes(bytes) => return Ok(bytes.to_vec()),
        SignatureInput::Text(text) => text,
    };

    if looks_like_hex(text) {
        return hex::decode(text).map_err(|e| {
            Report::new(TrustCenterError::Format {
                message: format!("Failed to decode hex: {e}"),
            })
        });
    }

    if text.is_empty() {
        return Err(format_error());
    }

    general_purpose::STANDARD
        .decode(text)
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(text))
        .map_err(|_| Report::new(format_error()))
}

fn format_error() -> TrustCenterError {
    TrustCenterError::Format {
        message: "Valid signatures are of type byte, hex, or base64 only. So please adjust."
            .into(),
    }
}

/// Check that `value` is a hyphenated, 36 character UUIDv4 (RFC 4122 variant).
pub fn is_well_formed_identifier(value: &str) -> bool {
    if value.len() != 36 {
        return false;
    }

    match Uuid::try_parse(value) {
        Ok(uuid) => {
            uuid.get_version() == Some(Version::Random) && uuid.get_variant() == Variant::RFC4122
        }
        Err(_) => false,
    }
}
