//! The `X-Auth-*` request headers.

use {
    crate::{
        config::AuthVersion,
        constants::{SHA256_HEX_LENGTH, X_AUTH_CLIENT_ID, X_AUTH_SIGNATURE, X_AUTH_TIMESTAMP, X_AUTH_VERSION},
        SignatureError,
    },
    http::header::{HeaderMap, HeaderValue},
    lazy_static::lazy_static,
    log::trace,
    regex::Regex,
};

lazy_static! {
    /// A signature is exactly one SHA-256 digest in hex, either case.
    static ref SIGNATURE_HEX: Regex = Regex::new(&format!("^[0-9a-fA-F]{{{}}}$", SHA256_HEX_LENGTH)).unwrap();
}

// Static header names passed to HeaderMap::insert must be lowercase.
const HEADER_VERSION: &str = "x-auth-version";
const HEADER_TIMESTAMP: &str = "x-auth-timestamp";
const HEADER_CLIENT_ID: &str = "x-auth-client-id";
const HEADER_SIGNATURE: &str = "x-auth-signature";

/// The four authentication headers, parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthHeaders {
    /// Auth version the request was signed with.
    pub auth_version: AuthVersion,

    /// Unix timestamp, in seconds, the request was signed at.
    pub timestamp: i64,

    /// Identifier of the signing client.
    pub client_id: String,

    /// Hex-encoded HMAC-SHA256 signature.
    pub signature: String,
}

impl AuthHeaders {
    /// Read and parse the authentication headers from a request.
    ///
    /// Headers are checked in the order `X-Auth-Version`, `X-Auth-Timestamp`, `X-Auth-Client-ID`,
    /// `X-Auth-Signature`; the first one that is missing or malformed is reported as
    /// [`SignatureError::MissingHeader`]. Values are trimmed of surrounding whitespace before parsing.
    pub fn from_header_map(headers: &HeaderMap<HeaderValue>) -> Result<Self, SignatureError> {
        let auth_version = get_header(headers, HEADER_VERSION, X_AUTH_VERSION)?
            .parse::<AuthVersion>()
            .map_err(|_| SignatureError::MissingHeader(X_AUTH_VERSION.to_string()))?;

        let timestamp = get_header(headers, HEADER_TIMESTAMP, X_AUTH_TIMESTAMP)?
            .parse::<i64>()
            .map_err(|_| SignatureError::MissingHeader(X_AUTH_TIMESTAMP.to_string()))?;

        let client_id = get_header(headers, HEADER_CLIENT_ID, X_AUTH_CLIENT_ID)?.to_string();

        let signature = get_header(headers, HEADER_SIGNATURE, X_AUTH_SIGNATURE)?;
        if !SIGNATURE_HEX.is_match(signature) {
            trace!("Signature is not a 64 character hex string: {:?}", signature);
            return Err(SignatureError::MissingHeader(X_AUTH_SIGNATURE.to_string()));
        }

        Ok(Self {
            auth_version,
            timestamp,
            client_id,
            signature: signature.to_string(),
        })
    }

    /// Write the authentication headers to a request, replacing any existing values.
    pub fn apply_to(&self, headers: &mut HeaderMap<HeaderValue>) -> Result<(), SignatureError> {
        headers.insert(HEADER_VERSION, HeaderValue::from(self.auth_version));
        headers.insert(HEADER_TIMESTAMP, HeaderValue::from(self.timestamp));
        headers.insert(
            HEADER_CLIENT_ID,
            HeaderValue::from_str(&self.client_id).map_err(|e| SignatureError::InternalServiceError(Box::new(e)))?,
        );
        headers.insert(
            HEADER_SIGNATURE,
            HeaderValue::from_str(&self.signature).map_err(|e| SignatureError::InternalServiceError(Box::new(e)))?,
        );
        Ok(())
    }
}

/// Return the trimmed value of a header, or `MissingHeader` if it is absent, not visible ASCII, or blank.
fn get_header<'a>(
    headers: &'a HeaderMap<HeaderValue>,
    name: &'static str,
    display_name: &str,
) -> Result<&'a str, SignatureError> {
    match headers.get(name).and_then(|value| value.to_str().ok()).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(SignatureError::MissingHeader(display_name.to_string())),
    }
}
