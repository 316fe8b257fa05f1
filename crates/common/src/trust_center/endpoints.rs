//! HTTP endpoint handlers for the trust center.
//!
//! Handlers take the raw request body and return a ready-to-send [`http::Response`]; the edge
//! binary only converts it to the platform type.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::constants::EMPTY_PAYLOAD_MESSAGE;
use crate::error::{IntoHttpResponse, TrustCenterError};

use super::orchestrator::TrustCenter;
use super::types::{FieldErrors, IssuePayload, VerifyRequest};

/// Handle `POST /sign`: `201` with the issuance receipt.
///
/// # Errors
///
/// Returns an error if the payload is empty or invalid, or issuance fails.
pub fn handle_sign(
    center: &TrustCenter,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<Response<String>, Report<TrustCenterError>> {
    let payload: IssuePayload = parse_payload(body)?;
    let request = payload.into_request().map_err(validation_failure)?;

    let receipt = center.sign(&request, now)?;
    json_response(StatusCode::CREATED, &receipt)
}

/// Handle `POST /verify`: `200` with the verification record.
///
/// # Errors
///
/// Returns an error if the payload is empty or invalid, or verification fails.
pub fn handle_verify(
    center: &TrustCenter,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<Response<String>, Report<TrustCenterError>> {
    let request: VerifyRequest = parse_payload(body)?;

    let verified = center.verify(request.issued_id(), now)?;
    json_response(StatusCode::OK, &verified)
}

/// Handle `GET /`.
#[must_use]
pub fn handle_index() -> Response<String> {
    build_response(StatusCode::OK, json!({ "message": "200 OK" }).to_string())
}

/// Render an error report as `{message, data?}` with the status of its current context.
#[must_use]
pub fn error_response(report: &Report<TrustCenterError>) -> Response<String> {
    let error = report.current_context();
    build_response(error.status_code(), error.error_body().to_string())
}

fn parse_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T, Report<TrustCenterError>> {
    let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(body).change_context(TrustCenterError::Validation {
            message: "Request body is not valid JSON".to_string(),
            fields: BTreeMap::new(),
        })?
    };

    if value.is_null() || value.as_object().is_some_and(serde_json::Map::is_empty) {
        return Err(Report::new(TrustCenterError::conflict(EMPTY_PAYLOAD_MESSAGE)));
    }

    serde_json::from_value(value).map_err(|e| {
        Report::new(TrustCenterError::Validation {
            message: e.to_string(),
            fields: BTreeMap::new(),
        })
    })
}

fn validation_failure(fields: FieldErrors) -> Report<TrustCenterError> {
    let message = fields.keys().cloned().collect::<Vec<_>>().join(", ");
    Report::new(TrustCenterError::Validation { message, fields })
}

fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> Result<Response<String>, Report<TrustCenterError>> {
    let json = serde_json::to_string(body).change_context(TrustCenterError::internal(
        "Failed to serialize response",
    ))?;
    Ok(build_response(status, json))
}

fn build_response(status: StatusCode, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
