use crate::models::Metadata;

use super::backend::ResponseEnvelope;

/// Map a backend response envelope onto the stable [`Metadata`] shape.
#[must_use]
pub fn extract_metadata(envelope: &ResponseEnvelope) -> Metadata {
    Metadata {
        status: envelope.http_status_code,
        request_id: envelope.request_id.clone(),
        extended_request_id: envelope.extended_request_id.clone(),
        trace_id: envelope.cf_id.clone(),
        attempts: envelope.attempts,
        delay: envelope.total_retry_delay,
    }
}
