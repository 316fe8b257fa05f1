//! Error types for the trust center.
//!
//! Every fallible operation returns `Result<T, Report<TrustCenterError>>`. The variant carried by
//! the report's current context decides how the failure is surfaced to HTTP callers: caller
//! correctable conditions become `409 Conflict`, everything else `500 Internal Server Error`.

use std::collections::BTreeMap;

use derive_more::Display;
use error_stack::Report;
use http::StatusCode;
use serde_json::{json, Value};

use crate::models::IssuedRef;

#[derive(Debug, Display)]
pub enum TrustCenterError {
    /// Caller or state correctable condition: duplicate issuance, unknown or malformed id.
    #[display("{message}")]
    Conflict {
        message: String,
        data: Option<Vec<IssuedRef>>,
    },

    /// Request payload failed schema validation.
    #[display("Invalid payload: {message}")]
    Validation {
        message: String,
        fields: BTreeMap<String, String>,
    },

    /// Backend or store failure surfaced at the orchestration boundary.
    #[display("{message}")]
    Internal { message: String },

    #[display("Configuration error: {message}")]
    Configuration { message: String },

    /// Input could not be decoded as bytes, hex or base64.
    #[display("Invalid format: {message}")]
    Format { message: String },

    #[display("Storage error: {message}")]
    Storage { message: String },

    #[display("Signing backend error: {message}")]
    Backend { message: String },
}

impl core::error::Error for TrustCenterError {}

impl TrustCenterError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            data: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Wraps a collaborator failure into [`TrustCenterError::Internal`], keeping the underlying
/// message as the user visible one and the original report as the cause.
pub fn into_internal(report: Report<TrustCenterError>) -> Report<TrustCenterError> {
    match report.current_context() {
        TrustCenterError::Internal { .. } => report,
        context => {
            let message = context.to_string();
            report.change_context(TrustCenterError::Internal { message })
        }
    }
}

/// Maps errors onto HTTP responses.
pub trait IntoHttpResponse {
    /// Status code returned to the caller.
    fn status_code(&self) -> StatusCode;

    /// Message safe to show to the caller.
    fn user_message(&self) -> String;

    /// JSON body `{message, data?}` returned to the caller.
    fn error_body(&self) -> Value;
}

impl IntoHttpResponse for TrustCenterError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Conflict { .. } | Self::Validation { .. } => StatusCode::CONFLICT,
            Self::Internal { .. }
            | Self::Configuration { .. }
            | Self::Format { .. }
            | Self::Storage { .. }
            | Self::Backend { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Configuration { .. } => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }

    fn error_body(&self) -> Value {
        match self {
            Self::Conflict {
                message,
                data: Some(data),
            } => json!({ "message": message, "data": data }),
            Self::Validation { fields, .. } if !fields.is_empty() => {
                json!({ "message": fields })
            }
            Self::Validation { message, .. } => json!({ "message": message }),
            other => json!({ "message": other.user_message() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Keyspec;

    #[test]
    fn test_conflict_maps_to_409_with_data() {
        let error = TrustCenterError::Conflict {
            message: "already issued".to_string(),
            data: Some(vec![IssuedRef {
                issued_id: "d2b4f6a0-1c3e-4f5a-8b7c-9d0e1f2a3b4c".to_string(),
                keyspec: Keyspec::Prime256v1,
                expired_at: None,
            }]),
        };

        assert_eq!(error.status_code(), StatusCode::CONFLICT);
        let body = error.error_body();
        assert_eq!(body["message"], "already issued");
        assert_eq!(body["data"][0]["keyspec"], "prime256v1");
        assert!(body["data"][0]["expired_at"].is_null());
    }

    #[test]
    fn test_conflict_without_data_omits_data() {
        let body = TrustCenterError::conflict("Issue doesn't exist.").error_body();
        assert_eq!(body["message"], "Issue doesn't exist.");
        assert!(body.get("data").is_none());
    }

    #[test]
    fn test_validation_body_lists_fields() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "applicant".to_string(),
            "Applicant must be a valid email address.".to_string(),
        );
        let error = TrustCenterError::Validation {
            message: "applicant".to_string(),
            fields,
        };

        assert_eq!(error.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            error.error_body()["message"]["applicant"],
            "Applicant must be a valid email address."
        );
    }

    #[test]
    fn test_internal_failures_map_to_500() {
        let errors = [
            TrustCenterError::internal("kms down"),
            TrustCenterError::Storage {
                message: "kv".into(),
            },
            TrustCenterError::Backend {
                message: "sign".into(),
            },
            TrustCenterError::Format {
                message: "hex".into(),
            },
        ];
        for error in errors {
            assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_configuration_message_is_not_leaked() {
        let error = TrustCenterError::Configuration {
            message: "secret store 'keys' missing".into(),
        };
        assert_eq!(error.user_message(), "Internal Server Error");
    }

    #[test]
    fn test_into_internal_preserves_underlying_message() {
        let report = Report::new(TrustCenterError::Storage {
            message: "connection reset".into(),
        });
        let wrapped = into_internal(report);
        match wrapped.current_context() {
            TrustCenterError::Internal { message } => {
                assert_eq!(message, "Storage error: connection reset");
            }
            other => panic!("expected internal error, got {other:?}"),
        }
    }
}
