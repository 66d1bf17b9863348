//! Server-side request validation.

use {
    crate::{
        body::IntoRequestBytes,
        canonical::Parameters,
        config::{AuthSignatureConfig, AuthVersion},
        constants::{MSG_INVALID_SIGNATURE, MSG_NEWER_VERSION_REQUIRED, MSG_TIMESTAMP_OUT_OF_DATE},
        headers::AuthHeaders,
        parameters::request_parameters,
        signer::SignatureGenerator,
        SignatureError,
    },
    bytes::Bytes,
    chrono::{DateTime, Utc},
    http::{request::Parts, Request},
    log::{debug, trace},
    std::sync::Arc,
    subtle::ConstantTimeEq,
    tower::BoxError,
};

/// The client a request was authenticated as.
///
/// On success, [`AuthSignatureVerifierService`][crate::AuthSignatureVerifierService] inserts this into the
/// request extensions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthenticatedClient {
    client_id: String,
    auth_version: AuthVersion,
    bundle_id: String,
}

impl AuthenticatedClient {
    /// Retrieve the client identifier.
    #[inline]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Retrieve the auth version the request was signed with.
    #[inline]
    pub fn auth_version(&self) -> AuthVersion {
        self.auth_version
    }

    /// Retrieve the client's configured bundle identifier.
    #[inline]
    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }
}

/// Validates signed requests against a shared configuration.
#[derive(Clone, Debug)]
pub struct RequestValidator {
    generator: SignatureGenerator,
}

impl RequestValidator {
    /// Create a validator over the given configuration.
    pub fn new(config: Arc<AuthSignatureConfig>) -> Self {
        Self {
            generator: SignatureGenerator::new(config),
        }
    }

    /// Retrieve the configuration.
    #[inline]
    pub fn config(&self) -> &AuthSignatureConfig {
        self.generator.config()
    }

    /// Validate parsed authentication headers against the request they arrived on.
    ///
    /// Checks are performed in this order, and the first failure is returned:
    /// 1. The request timestamp is within the configured tolerance of `server_timestamp`
    ///    ([`SignatureError::TimestampExpired`]).
    /// 2. The client is configured ([`SignatureError::InvalidConfiguration`]).
    /// 3. The auth version is not below the client's minimum ([`SignatureError::UpgradeRequired`]).
    /// 4. The presented signature equals the recomputed one ([`SignatureError::SignatureMismatch`]).
    pub fn validate_headers(
        &self,
        auth: &AuthHeaders,
        method: &str,
        path: &str,
        params: &Parameters,
        server_timestamp: DateTime<Utc>,
    ) -> Result<AuthenticatedClient, SignatureError> {
        self.check_timestamp(auth.timestamp, server_timestamp)?;
        let client = self.check_client(auth)?;
        self.check_signature(auth, method, path, params)?;
        Ok(client)
    }

    /// Validate a request given its parts and complete body.
    ///
    /// The headers are read first, so a request missing them is rejected before its body is parsed.
    pub fn validate_parts(
        &self,
        parts: &Parts,
        body: &Bytes,
        server_timestamp: DateTime<Utc>,
    ) -> Result<AuthenticatedClient, SignatureError> {
        let auth = AuthHeaders::from_header_map(&parts.headers)?;
        trace!("Request auth headers: {:?}", auth);

        self.check_timestamp(auth.timestamp, server_timestamp)?;
        let client = self.check_client(&auth)?;

        let params = request_parameters(parts, body)?;
        self.check_signature(&auth, parts.method.as_str(), parts.uri.path(), &params)?;
        Ok(client)
    }

    /// Validate a request.
    ///
    /// The body is read into memory. If the validation is successful, this returns the request parts, the
    /// body as [`Bytes`], and the [`AuthenticatedClient`].
    ///
    /// # Parameters
    /// * `request` - The HTTP [`Request`] to validate.
    /// * `server_timestamp` - The timestamp of the server when the request was received. Usually this
    ///   is the current time, `Utc::now()`.
    ///
    /// # Errors
    /// Failures to read the body are returned as-is; all other failures are a [`SignatureError`].
    pub async fn validate_request<B>(
        &self,
        request: Request<B>,
        server_timestamp: DateTime<Utc>,
    ) -> Result<(Parts, Bytes, AuthenticatedClient), BoxError>
    where
        B: IntoRequestBytes,
    {
        let (parts, body) = request.into_parts();
        let body = body.into_request_bytes().await?;
        let client = self.validate_parts(&parts, &body, server_timestamp)?;
        Ok((parts, body, client))
    }

    fn check_timestamp(&self, request_timestamp: i64, server_timestamp: DateTime<Utc>) -> Result<(), SignatureError> {
        let now = server_timestamp.timestamp();
        let tolerance = self.config().timestamp_tolerance().num_seconds();
        let min_ts = now.saturating_sub(tolerance);
        let max_ts = now.saturating_add(tolerance);

        if request_timestamp < min_ts || request_timestamp > max_ts {
            debug!(
                "Request timestamp {} is outside of the allowed window [{}, {}]",
                request_timestamp,
                min_ts,
                max_ts
            );
            return Err(SignatureError::TimestampExpired(MSG_TIMESTAMP_OUT_OF_DATE.to_string()));
        }

        Ok(())
    }

    fn check_client(&self, auth: &AuthHeaders) -> Result<AuthenticatedClient, SignatureError> {
        let client = self.config().client(&auth.client_id)?;

        if auth.auth_version < client.min_auth_level() {
            debug!(
                "Client {} presented auth version {} below minimum {}",
                auth.client_id,
                auth.auth_version,
                client.min_auth_level()
            );
            return Err(SignatureError::UpgradeRequired(MSG_NEWER_VERSION_REQUIRED.to_string()));
        }

        Ok(AuthenticatedClient {
            client_id: auth.client_id.clone(),
            auth_version: auth.auth_version,
            bundle_id: client.bundle_id().to_string(),
        })
    }

    fn check_signature(
        &self,
        auth: &AuthHeaders,
        method: &str,
        path: &str,
        params: &Parameters,
    ) -> Result<(), SignatureError> {
        let expected =
            self.generator.generate(&auth.client_id, auth.auth_version, auth.timestamp, method, path, params)?;
        let is_equal: bool = auth.signature.as_bytes().ct_eq(expected.as_bytes()).into();
        if !is_equal {
            debug!("Signature mismatch for client {}", auth.client_id);
            trace!("Expected signature '{}', got '{}'", expected, auth.signature);
            return Err(SignatureError::SignatureMismatch(MSG_INVALID_SIGNATURE.to_string()));
        }

        debug!("Authenticated client {} with auth version {}", auth.client_id, auth.auth_version);
        Ok(())
    }
}
