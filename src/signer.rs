//! Signature generation.
//!
//! The string to sign is built by concatenating the components named by the auth version's template, with
//! no separators, and is then keyed with the client secret followed by the auth version's secret (if any).

use {
    crate::{
        canonical::{canonicalize_parameters, form_decode, Parameters},
        config::{AuthSignatureConfig, AuthVersion, AuthVersionConfig, ClientConfig, ComponentKey},
        crypto::hmac_sha256_hex,
        headers::AuthHeaders,
        SignatureError,
    },
    chrono::Utc,
    derive_builder::Builder,
    log::trace,
    std::sync::Arc,
};

/// Everything about a request that goes into its signature.
///
/// SignedRequestContext structs are immutable. Use [`SignedRequestContextBuilder`] to construct one. If no
/// timestamp is given, the current time is used.
#[derive(Builder, Clone, Debug, Eq, PartialEq)]
pub struct SignedRequestContext {
    /// HTTP method, exactly as sent (case is significant).
    #[builder(setter(into))]
    method: String,

    /// Request path, without the query string. This may be percent-encoded.
    #[builder(setter(into))]
    path: String,

    /// Unix timestamp in seconds.
    #[builder(default = "Utc::now().timestamp()")]
    timestamp: i64,

    /// Identifier of the signing client.
    #[builder(setter(into))]
    client_id: String,

    /// Auth version to sign with.
    auth_version: AuthVersion,

    /// Query and body parameters.
    #[builder(default)]
    params: Parameters,
}

impl SignedRequestContext {
    /// Create a [SignedRequestContextBuilder] to construct a [SignedRequestContext].
    #[inline]
    pub fn builder() -> SignedRequestContextBuilder {
        SignedRequestContextBuilder::default()
    }

    /// Retrieve the HTTP method.
    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Retrieve the request path.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Retrieve the Unix timestamp.
    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Retrieve the client identifier.
    #[inline]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Retrieve the auth version.
    #[inline]
    pub fn auth_version(&self) -> AuthVersion {
        self.auth_version
    }

    /// Retrieve the parameters.
    #[inline]
    pub fn params(&self) -> &Parameters {
        &self.params
    }
}

/// Computes request signatures from a shared configuration.
///
/// This is used by clients to sign outgoing requests and by [`RequestValidator`][crate::RequestValidator] to
/// recompute the expected signature.
#[derive(Clone, Debug)]
pub struct SignatureGenerator {
    config: Arc<AuthSignatureConfig>,
}

impl SignatureGenerator {
    /// Create a generator over the given configuration.
    pub fn new(config: Arc<AuthSignatureConfig>) -> Self {
        Self {
            config,
        }
    }

    /// Retrieve the configuration.
    #[inline]
    pub fn config(&self) -> &AuthSignatureConfig {
        &self.config
    }

    /// Build the string to sign.
    ///
    /// # Errors
    /// Returns [`SignatureError::InvalidConfiguration`] if the client or auth version is not configured.
    pub fn string_to_sign(
        &self,
        client_id: &str,
        auth_version: AuthVersion,
        timestamp: i64,
        method: &str,
        path: &str,
        params: &Parameters,
    ) -> Result<Vec<u8>, SignatureError> {
        let signer = self.signer(client_id, auth_version)?;
        signer.string_to_sign(timestamp, method, path, params)
    }

    /// Compute the hex-encoded signature for a request.
    ///
    /// # Errors
    /// Returns [`SignatureError::InvalidConfiguration`] if the client or auth version is not configured.
    pub fn generate(
        &self,
        client_id: &str,
        auth_version: AuthVersion,
        timestamp: i64,
        method: &str,
        path: &str,
        params: &Parameters,
    ) -> Result<String, SignatureError> {
        let signer = self.signer(client_id, auth_version)?;
        let string_to_sign = signer.string_to_sign(timestamp, method, path, params)?;

        let signature = hmac_sha256_hex(&signer.key(), &string_to_sign)
            .map_err(|e| SignatureError::InternalServiceError(e.to_string().into()))?;
        trace!("Generated signature for client {} auth version {}: {}", client_id, auth_version, signature);
        Ok(signature)
    }

    fn signer<'a>(&'a self, client_id: &'a str, auth_version: AuthVersion) -> Result<ClientSigner<'a>, SignatureError> {
        Ok(ClientSigner {
            client_id,
            auth_version,
            client: self.config.client(client_id)?,
            version: self.config.auth_version(auth_version)?,
        })
    }

    /// Compute the hex-encoded signature for a request described by `context`.
    pub fn generate_for(&self, context: &SignedRequestContext) -> Result<String, SignatureError> {
        self.generate(
            context.client_id(),
            context.auth_version(),
            context.timestamp(),
            context.method(),
            context.path(),
            context.params(),
        )
    }

    /// Sign a request, returning the headers to attach to it.
    pub fn sign(&self, context: &SignedRequestContext) -> Result<AuthHeaders, SignatureError> {
        let signature = self.generate_for(context)?;
        Ok(AuthHeaders {
            auth_version: context.auth_version(),
            timestamp: context.timestamp(),
            client_id: context.client_id().to_string(),
            signature,
        })
    }
}

/// A client and auth version looked up once for a single signature.
struct ClientSigner<'a> {
    client_id: &'a str,
    auth_version: AuthVersion,
    client: &'a ClientConfig,
    version: &'a AuthVersionConfig,
}

impl ClientSigner<'_> {
    fn string_to_sign(
        &self,
        timestamp: i64,
        method: &str,
        path: &str,
        params: &Parameters,
    ) -> Result<Vec<u8>, SignatureError> {
        let mut result = Vec::with_capacity(256);
        for key in self.version.signature_template() {
            match key {
                ComponentKey::BundleId => result.extend(form_decode(self.client.bundle_id())),
                ComponentKey::Timestamp => result.extend(timestamp.to_string().as_bytes()),
                ComponentKey::ClientId => result.extend(self.client_id.as_bytes()),
                ComponentKey::State => result.extend(self.version.state().as_bytes()),
                ComponentKey::AuthVersion => result.extend(self.auth_version.to_string().as_bytes()),
                ComponentKey::Method => result.extend(method.as_bytes()),
                ComponentKey::Signature => result.extend(canonicalize_parameters(params)?.as_bytes()),
                ComponentKey::Path => result.extend(form_decode(path)),
            }
        }

        trace!("String to sign: {:?}", String::from_utf8_lossy(&result));
        Ok(result)
    }

    /// The client secret followed by the auth version's secret, if any.
    fn key(&self) -> Vec<u8> {
        let mut key = self.client.secret().to_vec();
        if let Some(extra_secret) = self.version.extra_secret() {
            key.extend_from_slice(extra_secret);
        }
        key
    }
}
