//! Request types accepted by the trust center.
//!
//! Payloads arrive as loosely typed JSON. [`IssuePayload`] keeps every field as raw JSON so that a
//! missing field, a wrong type and a rule violation are all reported together, field by field,
//! before an [`IssueRequest`] is built.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use validator::{Validate, ValidationErrors};

use crate::models::Keyspec;

/// Field name to the first reason it was rejected.
pub type FieldErrors = BTreeMap<String, String>;

/// A validated issuance request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub message: String,
    pub keyspec: Keyspec,
    /// Email address of the applicant; only its digest is stored.
    pub applicant: String,
    /// Days until expiry; `0` never expires.
    pub expiry_days: u32,
}

/// Issuance payload as received. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssuePayload {
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub keyspec: Option<Value>,
    #[serde(default)]
    pub applicant: Option<Value>,
    #[serde(default, alias = "exp")]
    pub expiry_days: Option<Value>,
}

#[derive(Debug, Default, Validate)]
struct IssueFields {
    #[validate(
        required(message = "Message is required."),
        length(min = 1, message = "Message is required.")
    )]
    message: Option<String>,
    #[validate(required(message = "Keyspec is required."))]
    keyspec: Option<Keyspec>,
    #[validate(
        required(message = "Applicant is required."),
        email(message = "Applicant must be a valid email address.")
    )]
    applicant: Option<String>,
    #[validate(
        required(message = "Exp is required."),
        range(min = 1, message = "Exp must be greater than or equal to 1.")
    )]
    expiry_days: Option<u32>,
}

impl IssuePayload {
    /// Check every field and build the request.
    ///
    /// # Errors
    ///
    /// Returns every offending field with its reason; type errors take precedence over rule
    /// violations of the same field.
    pub fn into_request(self) -> Result<IssueRequest, FieldErrors> {
        let mut errors = FieldErrors::new();

        let fields = IssueFields {
            message: string_field(self.message, "message", "Message", &mut errors),
            keyspec: string_field(self.keyspec, "keyspec", "Keyspec", &mut errors)
                .and_then(|name| keyspec_field(&name, &mut errors)),
            applicant: string_field(self.applicant, "applicant", "Applicant", &mut errors),
            expiry_days: expiry_field(self.expiry_days, &mut errors),
        };

        if let Err(violations) = fields.validate() {
            for (field, message) in field_messages(&violations) {
                errors.entry(field).or_insert(message);
            }
        }

        match fields {
            IssueFields {
                message: Some(message),
                keyspec: Some(keyspec),
                applicant: Some(applicant),
                expiry_days: Some(expiry_days),
            } if errors.is_empty() => Ok(IssueRequest {
                message,
                keyspec,
                applicant,
                expiry_days,
            }),
            _ => Err(errors),
        }
    }
}

/// Verification payload. A non-string `issued_id` is treated like a malformed one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub issued_id: Option<Value>,
}

impl VerifyRequest {
    #[must_use]
    pub fn issued_id(&self) -> Option<&str> {
        self.issued_id.as_ref().and_then(Value::as_str)
    }
}

/// First message of every failing field.
#[must_use]
pub fn field_messages(errors: &ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let message = errors
                .first()
                .and_then(|error| error.message.as_ref())
                .map_or_else(|| format!("{field} is invalid"), ToString::to_string);
            (field.to_string(), message)
        })
        .collect()
}

fn string_field(
    value: Option<Value>,
    field: &str,
    label: &str,
    errors: &mut FieldErrors,
) -> Option<String> {
    match value? {
        Value::String(text) => Some(text),
        _ => {
            errors.insert(field.to_string(), format!("{label} must be a string."));
            None
        }
    }
}

fn keyspec_field(name: &str, errors: &mut FieldErrors) -> Option<Keyspec> {
    let keyspec = Keyspec::ALL
        .into_iter()
        .find(|keyspec| keyspec.to_string() == name);
    if keyspec.is_none() {
        errors.insert(
            "keyspec".to_string(),
            "Keyspec must be one of secp256k1 or prime256v1.".to_string(),
        );
    }
    keyspec
}

/// Numbers and numeric strings are accepted; values below one are left to the range rule.
fn expiry_field(value: Option<Value>, errors: &mut FieldErrors) -> Option<u32> {
    const FIELD: &str = "expiry_days";

    let number = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    let Some(number) = number.filter(|n| n.is_finite()) else {
        errors.insert(FIELD.to_string(), "Exp must be a number.".to_string());
        return None;
    };
    if number.fract() != 0.0 {
        errors.insert(FIELD.to_string(), "Exp must be an integer.".to_string());
        return None;
    }
    if number < 1.0 {
        return Some(0);
    }
    if number > f64::from(u32::MAX) {
        errors.insert(
            FIELD.to_string(),
            format!("Exp must be less than or equal to {}.", u32::MAX),
        );
        return None;
    }

    Some(number as u32)
}
