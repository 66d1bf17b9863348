//! Common constants used throughout the crate.
//!
//! Tests that are testing the content of an error code or message should not use these constants;
//! they should use hard-coded strings so the tests are also testing for misspellings.
//!
//! Please keep this file organized alphabetically.

/// Content-Type string for JSON bodies
pub(crate) const APPLICATION_JSON: &str = "application/json";

/// Content-Type string for HTML forms
pub(crate) const APPLICATION_X_WWW_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Content-Type parameter for specifying the character set
pub(crate) const CHARSET: &str = "charset";

/// Default allowed timestamp mismatch in seconds, in either direction.
pub const DEFAULT_TIMESTAMP_TOLERANCE_SECONDS: u64 = 300;

/// Error code: InternalFailure
pub(crate) const ERR_CODE_INTERNAL_FAILURE: &str = "InternalFailure";

/// Error code: InvalidBodyEncoding
pub(crate) const ERR_CODE_INVALID_BODY_ENCODING: &str = "InvalidBodyEncoding";

/// Error code: InvalidConfiguration
pub(crate) const ERR_CODE_INVALID_CONFIGURATION: &str = "InvalidConfiguration";

/// Error code: MalformedParameters
pub(crate) const ERR_CODE_MALFORMED_PARAMETERS: &str = "MalformedParameters";

/// Error code: MissingHeader
pub(crate) const ERR_CODE_MISSING_HEADER: &str = "MissingHeader";

/// Error code: SignatureMismatch
pub(crate) const ERR_CODE_SIGNATURE_MISMATCH: &str = "SignatureMismatch";

/// Error code: TimestampExpired
pub(crate) const ERR_CODE_TIMESTAMP_EXPIRED: &str = "TimestampExpired";

/// Error code: UpgradeRequired
pub(crate) const ERR_CODE_UPGRADE_REQUIRED: &str = "UpgradeRequired";

/// Most parameters accepted from one query string or form body, as in PHP's `max_input_vars`.
pub(crate) const MAX_PARAMETER_COUNT: usize = 1000;

/// Most bracket segments allowed in one parameter name, as in PHP's `max_input_nesting_level`.
pub(crate) const MAX_PARAMETER_NESTING_DEPTH: usize = 64;

/// Error message: `"Invalid signature."`
pub(crate) const MSG_INVALID_SIGNATURE: &str = "Invalid signature.";

/// Error message: `"A newer application version is required to proceed."`
pub(crate) const MSG_NEWER_VERSION_REQUIRED: &str = "A newer application version is required to proceed.";

/// Error message: `"Request timestamp is out of date."`
pub(crate) const MSG_TIMESTAMP_OUT_OF_DATE: &str = "Request timestamp is out of date.";

/// Length of a SHA-256 hex digest.
pub(crate) const SHA256_HEX_LENGTH: usize = SHA256_OUTPUT_LEN * 2;

/// Length of a SHA-256 digest in bytes.
pub(crate) const SHA256_OUTPUT_LEN: usize = 32;

/// Header carrying the auth version.
pub const X_AUTH_VERSION: &str = "X-Auth-Version";

/// Header carrying the client identifier.
pub const X_AUTH_CLIENT_ID: &str = "X-Auth-Client-ID";

/// Header carrying the hex-encoded signature.
pub const X_AUTH_SIGNATURE: &str = "X-Auth-Signature";

/// Header carrying the request timestamp in Unix seconds.
pub const X_AUTH_TIMESTAMP: &str = "X-Auth-Timestamp";
