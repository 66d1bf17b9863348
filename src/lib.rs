//! The `scratchstack_auth_signature` crate signs and verifies HTTP requests from first-party client
//! applications using a shared-secret HMAC-SHA256 scheme carried in four `X-Auth-*` headers.
//!
//! Each client has an identifier, a secret, a bundle identifier, and a minimum auth version. Each auth
//! version can add its own secret, a static state string, and a different ordering of the components that
//! make up the string to sign. Retiring an old auth version is done by raising a client's minimum, which
//! makes the server answer old clients with `426 Upgrade Required`.
//!
//! # Workflow
//! On the client:
//! 1. Describe the request with a [`SignedRequestContext`].
//! 2. Call [`SignatureGenerator::sign`] to obtain the [`AuthHeaders`] and add them to the request.
//!
//! On the server, either wrap your service in an [`AuthSignatureVerifierService`] (or
//! [`AuthSignatureLayer`]), or call [`RequestValidator::validate_request`] directly. Validation reads the
//! query string and body, so the whole body is held in memory.
//!
//! ## Example
//! ```rust
//! use chrono::Utc;
//! use http::Request;
//! use scratchstack_auth_signature::{
//!     AuthSignatureConfig, Parameters, RequestValidator, SignatureGenerator, SignedRequestContext,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let config = Arc::new(AuthSignatureConfig::from_json_str(r#"{
//!     "clients": {
//!         "test-client": { "client_secret": "test-secret", "bundle_id": "com.example.app", "min_auth_level": 1 }
//!     },
//!     "auth_versions": {
//!         "1": { "secret": "v1-secret", "state": "v1-state" }
//!     }
//! }"#).unwrap());
//!
//! // Client side: sign a request.
//! let mut params = Parameters::new();
//! params.insert("page".to_string(), json!("2"));
//! let context = SignedRequestContext::builder()
//!     .method("GET")
//!     .path("/api/users")
//!     .client_id("test-client")
//!     .auth_version(1)
//!     .params(params)
//!     .build()
//!     .unwrap();
//! let auth_headers = SignatureGenerator::new(config.clone()).sign(&context).unwrap();
//!
//! let mut request = Request::get("/api/users?page=2").body(()).unwrap();
//! auth_headers.apply_to(request.headers_mut()).unwrap();
//!
//! // Server side: verify it.
//! # tokio_test::block_on(async {
//! let validator = RequestValidator::new(config);
//! let (_parts, _body, client) = validator.validate_request(request, Utc::now()).await.unwrap();
//! assert_eq!(client.client_id(), "test-client");
//! assert_eq!(client.bundle_id(), "com.example.app");
//! # });
//! ```
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(rustdoc::missing_crate_level_docs)]

mod body;
mod config;
mod constants;
mod crypto;
mod error;
mod headers;
mod parameters;
mod service;
mod signer;
mod validator;

#[cfg(any(doc, feature = "unstable"))]
pub mod canonical;

#[cfg(not(any(doc, feature = "unstable")))]
mod canonical;

pub use {
    body::IntoRequestBytes,
    canonical::{canonicalize_parameters, form_decode, rfc3986_encode, Parameters},
    config::{
        AuthSignatureConfig, AuthVersion, AuthVersionConfig, AuthVersionConfigBuilder, AuthVersionConfigBuilderError,
        ClientConfig, ClientConfigBuilder, ClientConfigBuilderError, ComponentKey, UnknownComponentKey,
        DEFAULT_SIGNATURE_TEMPLATE,
    },
    constants::{DEFAULT_TIMESTAMP_TOLERANCE_SECONDS, X_AUTH_CLIENT_ID, X_AUTH_SIGNATURE, X_AUTH_TIMESTAMP, X_AUTH_VERSION},
    error::{ConfigurationError, SignatureError},
    headers::AuthHeaders,
    parameters::{parse_form_parameters, request_parameters},
    service::{AuthSignatureLayer, AuthSignatureVerifierService, ErrorMapper, JsonErrorMapper},
    signer::{SignatureGenerator, SignedRequestContext, SignedRequestContextBuilder, SignedRequestContextBuilderError},
    validator::{AuthenticatedClient, RequestValidator},
};
