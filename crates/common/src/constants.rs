use http::header::HeaderName;

pub const HEADER_X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Signing algorithm requested for every supported keyspec.
pub const SIGNING_ALGORITHM_ECDSA_SHA_256: &str = "ECDSA_SHA_256";

/// Legacy marker persisted in place of an unset timestamp.
pub const UNSET_TIMESTAMP: &str = "0000-00-00T00:00:00+00:00";

pub const DUPLICATE_ISSUE_MESSAGE: &str =
    "Message already exists, issued and signed. Extend expiration instead of creating a new issue";
pub const MALFORMED_ISSUED_ID_MESSAGE: &str =
    "Sorry, Issued_id is required and must be in UUIDv4 format";
pub const ISSUE_NOT_FOUND_MESSAGE: &str = "Issue doesn't exist.";
pub const EMPTY_PAYLOAD_MESSAGE: &str = "payload is empty";

pub const RECORD_KEY_PREFIX: &str = "issue/";
pub const DIGEST_INDEX_KEY_PREFIX: &str = "digest/";
