use error_stack::Report;
use fastly::Response;

use trust_center_common::error::TrustCenterError;
use trust_center_common::trust_center::error_response;

/// Convert a handler response into a Fastly response.
pub fn to_fastly_response(response: http::Response<String>) -> Response {
    let (parts, body) = response.into_parts();
    let mut fastly_response = Response::from_status(parts.status.as_u16()).with_body(body);

    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => fastly_response.set_header(name.as_str(), value),
            Err(_) => log::warn!("Dropping non-ASCII response header '{}'", name),
        }
    }

    fastly_response
}

/// Converts a [`TrustCenterError`] report into a JSON HTTP error response.
pub fn to_error_response(report: &Report<TrustCenterError>) -> Response {
    to_fastly_response(error_response(report))
}
