//! Data models for issued signatures and verification results.

use chrono::{DateTime, SecondsFormat, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Supported asymmetric key algorithms. Each one maps to its own backend key identifier.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Keyspec {
    /// NIST P-256.
    #[display("prime256v1")]
    Prime256v1,
    /// SECG secp256k1.
    #[display("secp256k1")]
    Secp256k1,
}

impl Keyspec {
    pub const ALL: [Keyspec; 2] = [Keyspec::Prime256v1, Keyspec::Secp256k1];
}

/// Normalized transport metadata of a signing backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub status: u16,
    pub request_id: String,
    pub extended_request_id: Option<String>,
    pub trace_id: Option<String>,
    pub attempts: u32,
    pub delay: u64,
}

/// A persisted issuance. Created once at signing time and never mutated by the trust center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRecord {
    pub issued_id: String,
    /// SHA-256 hex of the applicant identity.
    pub issued_to: String,
    #[serde(default)]
    pub extended_issued_id: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    pub signing_algorithm: String,
    pub keyspec: Keyspec,
    /// Base64 signature.
    pub signature: String,
    /// Hex SHA-256 of the signed message.
    pub digest: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub expired_at: Option<DateTime<Utc>>,
}

impl IssuanceRecord {
    /// Whether the issuance is still within its validity window at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expired_at.map_or(true, |expired_at| expired_at > now)
    }

    #[must_use]
    pub fn to_issued_ref(&self) -> IssuedRef {
        IssuedRef {
            issued_id: self.issued_id.clone(),
            keyspec: self.keyspec,
            expired_at: self.expired_at,
        }
    }
}

/// Minimal identifying fields of an existing issuance, returned with duplicate conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedRef {
    pub issued_id: String,
    pub keyspec: Keyspec,
    #[serde(default, with = "timestamp::option")]
    pub expired_at: Option<DateTime<Utc>>,
}

/// Result of a successful issuance: the stored record plus backend metadata.
#[derive(Debug, Clone, Serialize)]
pub struct IssuanceReceipt {
    pub meta_data: Metadata,
    #[serde(flatten)]
    pub record: IssuanceRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Conditions {
    /// Backend decision on the signature alone.
    pub legitimate: bool,
    /// Not yet expired.
    pub active: bool,
}

/// Result of verifying a stored issuance.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationRecord {
    pub meta_data: Metadata,
    pub issued_id: String,
    pub issued_to: String,
    pub keyspec: Keyspec,
    pub signing_algorithm: String,
    pub signature: String,
    pub digest: String,
    pub signature_valid: bool,
    pub conditions: Conditions,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(with = "timestamp::option")]
    pub expired_at: Option<DateTime<Utc>>,
}

/// Format a timestamp as RFC 3339 with a numeric offset, e.g. `2024-01-01T00:00:00+00:00`.
#[must_use]
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Serde helpers for RFC 3339 timestamps with an explicit offset.
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }

    /// Optional timestamps. `null`, a missing field and the legacy unset marker all read as `None`.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        use crate::constants::UNSET_TIMESTAMP;

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_str(&super::super::format_timestamp(value)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                None => Ok(None),
                Some(raw) if raw.is_empty() || raw == UNSET_TIMESTAMP => Ok(None),
                Some(raw) => DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| Some(dt.with_timezone(&Utc)))
                    .map_err(de::Error::custom),
            }
        }
    }
}
