use {
    crate::{config::AuthVersion, constants::*},
    http::status::StatusCode,
    scratchstack_errors::ServiceError,
    std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
    },
};

/// Error returned when an attempt at validating a client request signature fails.
#[derive(Debug)]
#[non_exhaustive]
pub enum SignatureError {
    /// The request body used an unsupported character set encoding, or could not be decoded with the
    /// declared one.
    InvalidBodyEncoding(/* message */ String),

    /// The signing configuration cannot satisfy this request. This is an operator problem, not a caller
    /// problem, and is reported as a server-side failure.
    InvalidConfiguration(ConfigurationError),

    /// Validation failed due to an internal service error.
    InternalServiceError(Box<dyn Error + Send + Sync>),

    /// The query string or form body decoded to data that is not valid UTF-8.
    MalformedParameters(/* message */ String),

    /// One of the `X-Auth-*` headers is missing or cannot be parsed. The payload is the header name.
    MissingHeader(/* header name */ String),

    /// Signature did not match the calculated signature value.
    SignatureMismatch(/* message */ String),

    /// The request timestamp falls outside of the allowed window around the server time.
    TimestampExpired(/* message */ String),

    /// The auth version presented is below the minimum allowed for the client.
    UpgradeRequired(/* message */ String),
}

impl SignatureError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidBodyEncoding(_) => ERR_CODE_INVALID_BODY_ENCODING,
            Self::InvalidConfiguration(_) => ERR_CODE_INVALID_CONFIGURATION,
            Self::InternalServiceError(_) => ERR_CODE_INTERNAL_FAILURE,
            Self::MalformedParameters(_) => ERR_CODE_MALFORMED_PARAMETERS,
            Self::MissingHeader(_) => ERR_CODE_MISSING_HEADER,
            Self::SignatureMismatch(_) => ERR_CODE_SIGNATURE_MISMATCH,
            Self::TimestampExpired(_) => ERR_CODE_TIMESTAMP_EXPIRED,
            Self::UpgradeRequired(_) => ERR_CODE_UPGRADE_REQUIRED,
        }
    }

    fn http_status(&self) -> StatusCode {
        match self {
            Self::InvalidBodyEncoding(_) | Self::MalformedParameters(_) | Self::MissingHeader(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidConfiguration(_) | Self::InternalServiceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SignatureMismatch(_) => StatusCode::UNAUTHORIZED,
            Self::TimestampExpired(_) => StatusCode::REQUEST_TIMEOUT,
            Self::UpgradeRequired(_) => StatusCode::UPGRADE_REQUIRED,
        }
    }
}

impl ServiceError for SignatureError {
    fn error_code(&self) -> &'static str {
        SignatureError::error_code(self)
    }

    fn http_status(&self) -> StatusCode {
        SignatureError::http_status(self)
    }
}

impl Display for SignatureError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::InvalidBodyEncoding(msg) => f.write_str(msg),
            Self::InvalidConfiguration(ref e) => Display::fmt(e, f),
            Self::InternalServiceError(ref e) => Display::fmt(e, f),
            Self::MalformedParameters(msg) => f.write_str(msg),
            Self::MissingHeader(header) => write!(f, "Invalid or missing {} header.", header),
            Self::SignatureMismatch(msg) => f.write_str(msg),
            Self::TimestampExpired(msg) => f.write_str(msg),
            Self::UpgradeRequired(msg) => f.write_str(msg),
        }
    }
}

impl Error for SignatureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidConfiguration(ref e) => Some(e),
            Self::InternalServiceError(ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<ConfigurationError> for SignatureError {
    fn from(e: ConfigurationError) -> SignatureError {
        SignatureError::InvalidConfiguration(e)
    }
}

impl From<Box<dyn Error + Send + Sync>> for SignatureError {
    fn from(e: Box<dyn Error + Send + Sync>) -> SignatureError {
        match e.downcast::<SignatureError>() {
            Ok(sig_err) => *sig_err,
            Err(e) => SignatureError::InternalServiceError(e),
        }
    }
}

/// Error returned when the signing configuration is incomplete or cannot resolve a lookup.
///
/// These are raised while loading the configuration or, for lookups, while signing. They always indicate
/// operator misconfiguration.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// No auth version with the given number is configured.
    AuthVersionNotFound(AuthVersion),

    /// No client with the given identifier is configured.
    ClientNotFound(/* client id */ String),

    /// A signature template names a component that does not exist.
    InvalidTemplateKey {
        /// The unrecognized template entry.
        key: String,

        /// The auth version whose template contains the entry.
        auth_version: AuthVersion,
    },

    /// The `auth_versions` map is absent or empty.
    MissingAuthVersions,

    /// A client is configured without a `bundle_id`.
    MissingBundleId(/* client id */ String),

    /// A client is configured without a `client_secret`.
    MissingClientSecret(/* client id */ String),

    /// The `clients` map is absent or empty.
    MissingClients,

    /// The configuration document could not be read or parsed.
    Unreadable(/* message */ String),
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::AuthVersionNotFound(version) => {
                write!(f, "Configuration for auth version '{}' not found.", version)
            }
            Self::ClientNotFound(client_id) => write!(f, "Configuration for client ID '{}' not found.", client_id),
            Self::InvalidTemplateKey {
                key,
                auth_version,
            } => write!(f, "Invalid signature template key '{}' for auth version '{}'.", key, auth_version),
            Self::MissingAuthVersions => f.write_str("Configuration must include an \"auth_versions\" map."),
            Self::MissingBundleId(client_id) => write!(f, "Client '{}' must have a 'bundle_id' string.", client_id),
            Self::MissingClientSecret(client_id) => {
                write!(f, "Client '{}' must have a 'client_secret' string.", client_id)
            }
            Self::MissingClients => f.write_str("Configuration must include a \"clients\" map."),
            Self::Unreadable(msg) => write!(f, "Unable to read configuration: {}", msg),
        }
    }
}

impl Error for ConfigurationError {}
