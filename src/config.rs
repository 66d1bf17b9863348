//! Signing configuration: clients, auth versions, and the timestamp tolerance.
//!
//! An [`AuthSignatureConfig`] is built once at startup, either programmatically or by deserializing a
//! configuration document, and is immutable afterwards. All validation happens while it is constructed so
//! that per-request lookups can only fail with "not found".

use {
    crate::{constants::DEFAULT_TIMESTAMP_TOLERANCE_SECONDS, ConfigurationError},
    chrono::Duration,
    derive_builder::Builder,
    serde::Deserialize,
    std::{
        collections::HashMap,
        fmt::{Debug, Display, Formatter, Result as FmtResult},
        fs::File,
        io::BufReader,
        path::Path,
        str::FromStr,
    },
};

/// Auth versions are plain integers chosen by the operator.
pub type AuthVersion = i64;

/// A named part of the string to sign.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ComponentKey {
    /// The client's bundle identifier, percent-decoded.
    BundleId,

    /// The request timestamp in decimal Unix seconds.
    Timestamp,

    /// The client identifier.
    ClientId,

    /// The auth version's static state string (empty if unset).
    State,

    /// The auth version in decimal.
    AuthVersion,

    /// The HTTP method, as given.
    Method,

    /// The canonicalized parameter block. This is *not* the final digest.
    Signature,

    /// The percent-decoded request path.
    Path,
}

/// The template used when an auth version does not define its own.
pub const DEFAULT_SIGNATURE_TEMPLATE: [ComponentKey; 8] = [
    ComponentKey::BundleId,
    ComponentKey::Timestamp,
    ComponentKey::ClientId,
    ComponentKey::State,
    ComponentKey::AuthVersion,
    ComponentKey::Method,
    ComponentKey::Signature,
    ComponentKey::Path,
];

impl ComponentKey {
    /// The name of this component as it appears in a `signature_template`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BundleId => "bundle_id",
            Self::Timestamp => "timestamp",
            Self::ClientId => "client_id",
            Self::State => "state",
            Self::AuthVersion => "auth_version",
            Self::Method => "method",
            Self::Signature => "signature",
            Self::Path => "path",
        }
    }
}

impl Display for ComponentKey {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Error returned by `ComponentKey::from_str` for an unrecognized name. The payload is the name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownComponentKey(pub String);

impl Display for UnknownComponentKey {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "Unknown signature template key '{}'", self.0)
    }
}

impl std::error::Error for UnknownComponentKey {}

impl FromStr for ComponentKey {
    type Err = UnknownComponentKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bundle_id" => Ok(Self::BundleId),
            "timestamp" => Ok(Self::Timestamp),
            "client_id" => Ok(Self::ClientId),
            "state" => Ok(Self::State),
            "auth_version" => Ok(Self::AuthVersion),
            "method" => Ok(Self::Method),
            "signature" => Ok(Self::Signature),
            "path" => Ok(Self::Path),
            _ => Err(UnknownComponentKey(s.to_string())),
        }
    }
}

/// Per-client signing settings.
///
/// ClientConfig structs are immutable. Use [`ClientConfigBuilder`] to construct one.
#[derive(Builder, Clone, Eq, PartialEq)]
pub struct ClientConfig {
    /// The shared secret used to key the HMAC.
    #[builder(setter(into))]
    secret: Vec<u8>,

    /// The bundle identifier of the client application. This may be percent-encoded.
    #[builder(setter(into))]
    bundle_id: String,

    /// Requests presenting an auth version below this are rejected.
    #[builder(default)]
    min_auth_level: AuthVersion,
}

impl ClientConfig {
    /// Create a [ClientConfigBuilder] to construct a [ClientConfig].
    #[inline]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Retrieve the client secret.
    #[inline]
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Retrieve the bundle identifier as configured (not decoded).
    #[inline]
    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    /// Retrieve the minimum auth version this client may use.
    #[inline]
    pub fn min_auth_level(&self) -> AuthVersion {
        self.min_auth_level
    }
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ClientConfig")
            .field("bundle_id", &self.bundle_id)
            .field("min_auth_level", &self.min_auth_level)
            .finish_non_exhaustive()
    }
}

/// Settings attached to a single auth version.
///
/// AuthVersionConfig structs are immutable. Use [`AuthVersionConfigBuilder`] to construct one.
#[derive(Builder, Clone, Default, Eq, PartialEq)]
pub struct AuthVersionConfig {
    /// Appended to the client secret when keying the HMAC.
    #[builder(setter(into, strip_option), default)]
    extra_secret: Option<Vec<u8>>,

    /// A static string included in the string to sign.
    #[builder(setter(into, strip_option), default)]
    state: Option<String>,

    /// The order of components in the string to sign. [`DEFAULT_SIGNATURE_TEMPLATE`] if unset.
    #[builder(setter(into, strip_option), default)]
    signature_template: Option<Vec<ComponentKey>>,
}

impl AuthVersionConfig {
    /// Create an [AuthVersionConfigBuilder] to construct an [AuthVersionConfig].
    #[inline]
    pub fn builder() -> AuthVersionConfigBuilder {
        AuthVersionConfigBuilder::default()
    }

    /// Retrieve the version-specific secret, if any.
    #[inline]
    pub fn extra_secret(&self) -> Option<&[u8]> {
        self.extra_secret.as_deref()
    }

    /// Retrieve the state string, or an empty string if unset.
    #[inline]
    pub fn state(&self) -> &str {
        self.state.as_deref().unwrap_or("")
    }

    /// Retrieve the effective template order for this version.
    #[inline]
    pub fn signature_template(&self) -> &[ComponentKey] {
        match &self.signature_template {
            Some(template) => template.as_slice(),
            None => &DEFAULT_SIGNATURE_TEMPLATE,
        }
    }
}

impl Debug for AuthVersionConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AuthVersionConfig")
            .field("has_extra_secret", &self.extra_secret.is_some())
            .field("state", &self.state)
            .field("signature_template", &self.signature_template)
            .finish()
    }
}

/// The complete, validated signing configuration.
///
/// This deserializes from a document of the form:
/// ```json
/// {
///     "timestamp_tolerance_seconds": 300,
///     "clients": {
///         "client-id": { "client_secret": "...", "bundle_id": "com.example.app", "min_auth_level": 300 }
///     },
///     "auth_versions": {
///         "300": {},
///         "400": { "secret": "...", "state": "...", "signature_template": ["method", "path", "signature"] }
///     }
/// }
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "RawAuthSignatureConfig")]
pub struct AuthSignatureConfig {
    timestamp_tolerance: Duration,
    clients: HashMap<String, ClientConfig>,
    auth_versions: HashMap<AuthVersion, AuthVersionConfig>,
}

impl AuthSignatureConfig {
    /// Create a configuration with the default timestamp tolerance.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::MissingClients`] or [`ConfigurationError::MissingAuthVersions`] if either
    /// map is empty.
    pub fn new(
        clients: HashMap<String, ClientConfig>,
        auth_versions: HashMap<AuthVersion, AuthVersionConfig>,
    ) -> Result<Self, ConfigurationError> {
        if clients.is_empty() {
            return Err(ConfigurationError::MissingClients);
        }

        if auth_versions.is_empty() {
            return Err(ConfigurationError::MissingAuthVersions);
        }

        Ok(Self {
            timestamp_tolerance: Duration::seconds(DEFAULT_TIMESTAMP_TOLERANCE_SECONDS as i64),
            clients,
            auth_versions,
        })
    }

    /// Replace the allowed timestamp mismatch. Negative durations are treated as zero.
    pub fn with_timestamp_tolerance(mut self, tolerance: Duration) -> Self {
        self.timestamp_tolerance = tolerance.max(Duration::zero());
        self
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let raw: RawAuthSignatureConfig =
            serde_json::from_str(json).map_err(|e| ConfigurationError::Unreadable(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Read, parse, and validate a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ConfigurationError::Unreadable(format!("{}: {}", path.display(), e)))?;
        let raw: RawAuthSignatureConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ConfigurationError::Unreadable(format!("{}: {}", path.display(), e)))?;
        Self::try_from(raw)
    }

    /// Retrieve the allowed timestamp mismatch in either direction.
    #[inline]
    pub fn timestamp_tolerance(&self) -> Duration {
        self.timestamp_tolerance
    }

    /// Look up a client by identifier.
    pub fn client(&self, client_id: &str) -> Result<&ClientConfig, ConfigurationError> {
        self.clients.get(client_id).ok_or_else(|| ConfigurationError::ClientNotFound(client_id.to_string()))
    }

    /// Look up an auth version.
    pub fn auth_version(&self, auth_version: AuthVersion) -> Result<&AuthVersionConfig, ConfigurationError> {
        self.auth_versions.get(&auth_version).ok_or(ConfigurationError::AuthVersionNotFound(auth_version))
    }
}

/// Configuration document as written by the operator, before validation.
#[derive(Debug, Deserialize)]
struct RawAuthSignatureConfig {
    #[serde(default = "default_timestamp_tolerance_seconds")]
    timestamp_tolerance_seconds: u64,

    #[serde(default)]
    clients: Option<HashMap<String, RawClientConfig>>,

    #[serde(default)]
    auth_versions: Option<HashMap<AuthVersion, RawAuthVersionConfig>>,
}

#[derive(Debug, Deserialize)]
struct RawClientConfig {
    #[serde(default)]
    client_secret: Option<String>,

    #[serde(default)]
    bundle_id: Option<String>,

    #[serde(default)]
    min_auth_level: AuthVersion,
}

#[derive(Debug, Deserialize)]
struct RawAuthVersionConfig {
    #[serde(default)]
    secret: Option<String>,

    #[serde(default)]
    state: Option<String>,

    #[serde(default)]
    signature_template: Option<Vec<String>>,
}

fn default_timestamp_tolerance_seconds() -> u64 {
    DEFAULT_TIMESTAMP_TOLERANCE_SECONDS
}

impl TryFrom<RawAuthSignatureConfig> for AuthSignatureConfig {
    type Error = ConfigurationError;

    fn try_from(raw: RawAuthSignatureConfig) -> Result<Self, Self::Error> {
        let raw_clients = raw.clients.filter(|c| !c.is_empty()).ok_or(ConfigurationError::MissingClients)?;
        let raw_versions =
            raw.auth_versions.filter(|v| !v.is_empty()).ok_or(ConfigurationError::MissingAuthVersions)?;

        let mut clients = HashMap::with_capacity(raw_clients.len());
        for (client_id, raw_client) in raw_clients {
            let secret =
                raw_client.client_secret.ok_or_else(|| ConfigurationError::MissingClientSecret(client_id.clone()))?;
            let bundle_id =
                raw_client.bundle_id.ok_or_else(|| ConfigurationError::MissingBundleId(client_id.clone()))?;

            clients.insert(
                client_id,
                ClientConfig {
                    secret: secret.into_bytes(),
                    bundle_id,
                    min_auth_level: raw_client.min_auth_level,
                },
            );
        }

        let mut auth_versions = HashMap::with_capacity(raw_versions.len());
        for (version, raw_version) in raw_versions {
            let signature_template = match raw_version.signature_template {
                None => None,
                Some(keys) => Some(
                    keys.iter()
                        .map(|key| {
                            ComponentKey::from_str(key).map_err(|e| ConfigurationError::InvalidTemplateKey {
                                key: e.0,
                                auth_version: version,
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                ),
            };

            auth_versions.insert(
                version,
                AuthVersionConfig {
                    // An empty version secret extends nothing.
                    extra_secret: raw_version.secret.filter(|s| !s.is_empty()).map(String::into_bytes),
                    state: raw_version.state,
                    signature_template,
                },
            );
        }

        let tolerance = i64::try_from(raw.timestamp_tolerance_seconds).unwrap_or(i64::MAX);
        let tolerance = Duration::try_seconds(tolerance).unwrap_or(Duration::MAX);

        Ok(Self::new(clients, auth_versions)?.with_timestamp_tolerance(tolerance))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{AuthSignatureConfig, AuthVersionConfig, ClientConfig, ComponentKey, DEFAULT_SIGNATURE_TEMPLATE},
        crate::ConfigurationError,
        chrono::Duration,
        std::{collections::HashMap, str::FromStr},
    };

    const SAMPLE: &str = r#"{
        "timestamp_tolerance_seconds": 60,
        "clients": {
            "your_client_id_here": {
                "client_secret": "your_super_secret_key_here",
                "bundle_id": "com.yourcompany.yourapp",
                "min_auth_level": 300
            },
            "another_client_id": {
                "client_secret": "another",
                "bundle_id": "com.yourcompany.anotherapp"
            }
        },
        "auth_versions": {
            "300": {},
            "400": {
                "secret": "version_400_specific_secret",
                "state": "some_static_state_string_for_v400",
                "signature_template": [
                    "method", "path", "timestamp", "client_id", "auth_version", "bundle_id", "state", "signature"
                ]
            }
        }
    }"#;

    #[test_log::test]
    fn test_load_sample() {
        let config = AuthSignatureConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.timestamp_tolerance(), Duration::seconds(60));

        let client = config.client("your_client_id_here").unwrap();
        assert_eq!(client.secret(), b"your_super_secret_key_here");
        assert_eq!(client.bundle_id(), "com.yourcompany.yourapp");
        assert_eq!(client.min_auth_level(), 300);
        assert_eq!(config.client("another_client_id").unwrap().min_auth_level(), 0);

        let v300 = config.auth_version(300).unwrap();
        assert!(v300.extra_secret().is_none());
        assert_eq!(v300.state(), "");
        assert_eq!(v300.signature_template(), &DEFAULT_SIGNATURE_TEMPLATE);

        let v400 = config.auth_version(400).unwrap();
        assert_eq!(v400.extra_secret(), Some(&b"version_400_specific_secret"[..]));
        assert_eq!(v400.state(), "some_static_state_string_for_v400");
        assert_eq!(v400.signature_template()[0], ComponentKey::Method);
        assert_eq!(v400.signature_template().len(), 8);
    }

    #[test_log::test]
    fn test_default_tolerance() {
        let config = AuthSignatureConfig::from_json_str(
            r#"{"clients": {"c1": {"client_secret": "s", "bundle_id": "b"}}, "auth_versions": {"1": {}}}"#,
        )
        .unwrap();
        assert_eq!(config.timestamp_tolerance(), Duration::seconds(300));
    }

    #[test_log::test]
    fn test_missing_sections() {
        let e = AuthSignatureConfig::from_json_str(r#"{"auth_versions": {"1": {}}}"#).unwrap_err();
        assert_eq!(e, ConfigurationError::MissingClients);

        let e = AuthSignatureConfig::from_json_str(r#"{"clients": {}, "auth_versions": {"1": {}}}"#).unwrap_err();
        assert_eq!(e, ConfigurationError::MissingClients);

        let e = AuthSignatureConfig::from_json_str(r#"{"clients": {"c1": {"client_secret": "s", "bundle_id": "b"}}}"#)
            .unwrap_err();
        assert_eq!(e, ConfigurationError::MissingAuthVersions);
    }

    #[test_log::test]
    fn test_incomplete_client() {
        let e = AuthSignatureConfig::from_json_str(r#"{"clients": {"c1": {"bundle_id": "b"}}, "auth_versions": {"1": {}}}"#)
            .unwrap_err();
        assert_eq!(e, ConfigurationError::MissingClientSecret("c1".to_string()));

        let e =
            AuthSignatureConfig::from_json_str(r#"{"clients": {"c1": {"client_secret": "s"}}, "auth_versions": {"1": {}}}"#)
                .unwrap_err();
        assert_eq!(e, ConfigurationError::MissingBundleId("c1".to_string()));
    }

    #[test_log::test]
    fn test_invalid_template_key() {
        let e = AuthSignatureConfig::from_json_str(
            r#"{
                "clients": {"id": {"client_secret": "s", "bundle_id": "b"}},
                "auth_versions": {"1": {"signature_template": ["method", "bad-key"]}}
            }"#,
        )
        .unwrap_err();
        assert_eq!(e.to_string(), "Invalid signature template key 'bad-key' for auth version '1'.");
    }

    #[test_log::test]
    fn test_unreadable() {
        let e = AuthSignatureConfig::from_json_str("{").unwrap_err();
        assert!(matches!(e, ConfigurationError::Unreadable(_)));

        let e = AuthSignatureConfig::from_json_file("/this-path/does/not/exist.json").unwrap_err();
        assert!(e.to_string().starts_with("Unable to read configuration: /this-path/does/not/exist.json"));
    }

    #[test_log::test]
    fn test_lookups() {
        let client = ClientConfig::builder().secret("s").bundle_id("b").build().unwrap();
        let config = AuthSignatureConfig::new(
            HashMap::from([("c1".to_string(), client)]),
            HashMap::from([(1, AuthVersionConfig::default())]),
        )
        .unwrap();

        assert_eq!(config.client("c2").unwrap_err(), ConfigurationError::ClientNotFound("c2".to_string()));
        assert_eq!(config.auth_version(2).unwrap_err(), ConfigurationError::AuthVersionNotFound(2));

        let config = config.with_timestamp_tolerance(Duration::seconds(-5));
        assert_eq!(config.timestamp_tolerance(), Duration::zero());

        assert_eq!(
            AuthSignatureConfig::new(HashMap::new(), HashMap::new()).unwrap_err(),
            ConfigurationError::MissingClients
        );
    }

    #[test_log::test]
    fn test_secrets_not_in_debug() {
        let client = ClientConfig::builder().secret("hunter2").bundle_id("b").min_auth_level(3).build().unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("min_auth_level: 3"));

        let version = AuthVersionConfig::builder().extra_secret("hunter3").state("st").build().unwrap();
        let debug = format!("{:?}", version);
        assert!(!debug.contains("hunter3"));
        assert!(debug.contains("has_extra_secret: true"));
    }

    #[test_log::test]
    fn test_component_key_names() {
        for key in DEFAULT_SIGNATURE_TEMPLATE {
            assert_eq!(ComponentKey::from_str(key.as_str()).unwrap(), key);
            assert_eq!(key.to_string(), key.as_str());
        }

        let e = ComponentKey::from_str("Method").unwrap_err();
        assert_eq!(e.to_string(), "Unknown signature template key 'Method'");
        assert!(ClientConfig::builder().bundle_id("b").build().is_err());
    }
}
