//! `tower` middleware that authenticates requests before passing them to an inner service.

use {
    crate::{
        body::IntoRequestBytes, config::AuthSignatureConfig, constants::APPLICATION_JSON, validator::RequestValidator,
        SignatureError,
    },
    async_trait::async_trait,
    bytes::Bytes,
    chrono::Utc,
    http::{header::CONTENT_TYPE, Request, Response},
    log::debug,
    scratchstack_errors::ServiceError,
    serde_json::json,
    std::{
        any::type_name,
        fmt::{Debug, Formatter, Result as FmtResult},
        future::Future,
        pin::Pin,
        sync::Arc,
        task::{Context, Poll},
    },
    tower::{BoxError, Layer, Service, ServiceExt},
};

/// AuthSignatureVerifierService authenticates each request's `X-Auth-*` signature.
///
/// Accepted requests are forwarded to the implementation with the body collected into [`Bytes`] and the
/// [`AuthenticatedClient`][crate::AuthenticatedClient] added to the request extensions. Rejected requests are
/// turned into responses by the error handler.
#[derive(Clone)]
pub struct AuthSignatureVerifierService<S, E> {
    validator: RequestValidator,
    implementation: S,
    error_handler: E,
}

impl<S, E> AuthSignatureVerifierService<S, E> {
    /// Wrap `implementation` with signature verification.
    pub fn new(config: Arc<AuthSignatureConfig>, implementation: S, error_handler: E) -> Self {
        Self::from_validator(RequestValidator::new(config), implementation, error_handler)
    }

    fn from_validator(validator: RequestValidator, implementation: S, error_handler: E) -> Self {
        AuthSignatureVerifierService {
            validator,
            implementation,
            error_handler,
        }
    }
}

impl<S, E> Debug for AuthSignatureVerifierService<S, E> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("AuthSignatureVerifierService")
            .field("validator", &self.validator)
            .field("implementation", &type_name::<S>())
            .field("error_handler", &type_name::<E>())
            .finish()
    }
}

impl<B, S, E, RB> Service<Request<B>> for AuthSignatureVerifierService<S, E>
where
    B: IntoRequestBytes + Send + 'static,
    S: Service<Request<Bytes>, Response = Response<RB>, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send,
    E: ErrorMapper<RB>,
    RB: Send + 'static,
{
    type Response = Response<RB>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<RB>, BoxError>> + Send>>;

    fn poll_ready(&mut self, c: &mut Context) -> Poll<Result<(), Self::Error>> {
        self.implementation.poll_ready(c)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let validator = self.validator.clone();
        let implementation = self.implementation.clone();
        let error_handler = self.error_handler.clone();

        Box::pin(handle_call(req, validator, implementation, error_handler))
    }
}

async fn handle_call<B, S, E, RB>(
    req: Request<B>,
    validator: RequestValidator,
    implementation: S,
    error_handler: E,
) -> Result<Response<RB>, BoxError>
where
    B: IntoRequestBytes + Send + 'static,
    S: Service<Request<Bytes>, Response = Response<RB>, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send,
    E: ErrorMapper<RB>,
    RB: Send + 'static,
{
    match validator.validate_request(req, Utc::now()).await {
        Ok((mut parts, body, client)) => {
            parts.extensions.insert(client);
            let req = Request::from_parts(parts, body);
            implementation.oneshot(req).await
        }
        Err(e) => {
            debug!("Rejecting request: {}", e);
            error_handler.map_error(e).await
        }
    }
}

/// A [`Layer`] that wraps services in an [`AuthSignatureVerifierService`].
#[derive(Clone)]
pub struct AuthSignatureLayer<E> {
    validator: RequestValidator,
    error_handler: E,
}

impl<E> AuthSignatureLayer<E> {
    /// Create a layer that verifies requests against `config` and renders failures with `error_handler`.
    pub fn new(config: Arc<AuthSignatureConfig>, error_handler: E) -> Self {
        AuthSignatureLayer {
            validator: RequestValidator::new(config),
            error_handler,
        }
    }
}

impl<E> Debug for AuthSignatureLayer<E> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("AuthSignatureLayer")
            .field("validator", &self.validator)
            .field("error_handler", &type_name::<E>())
            .finish()
    }
}

impl<S, E: Clone> Layer<S> for AuthSignatureLayer<E> {
    type Service = AuthSignatureVerifierService<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthSignatureVerifierService::from_validator(self.validator.clone(), inner, self.error_handler.clone())
    }
}

/// Converts a validation failure into a response.
///
/// Returning `Err` propagates the error out of the service instead.
#[async_trait]
pub trait ErrorMapper<RB>: Clone + Send + 'static {
    /// Render `error` as a response.
    async fn map_error(self, error: BoxError) -> Result<Response<RB>, BoxError>;
}

/// Renders [`SignatureError`]s as `{"error": {"code": ..., "message": ...}}` with the error's HTTP status.
///
/// Other errors, such as failures reading the request body, are propagated.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonErrorMapper;

#[async_trait]
impl<RB> ErrorMapper<RB> for JsonErrorMapper
where
    RB: From<Bytes> + Send + 'static,
{
    async fn map_error(self, e: BoxError) -> Result<Response<RB>, BoxError> {
        match e.downcast::<SignatureError>() {
            Ok(e) => {
                let document = json!({
                    "error": {
                        "code": e.error_code(),
                        "message": e.to_string(),
                    }
                });
                let mut body = serde_json::to_vec(&document)?;
                body.push(b'\n');

                Response::builder()
                    .status(e.http_status())
                    .header(CONTENT_TYPE, APPLICATION_JSON)
                    .body(RB::from(Bytes::from(body)))
                    .map_err(Into::into)
            }
            Err(any) => Err(any),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{AuthSignatureLayer, AuthSignatureVerifierService, ErrorMapper, JsonErrorMapper},
        crate::{
            signer::tests::test_config, AuthHeaders, AuthenticatedClient, SignatureError, SignatureGenerator,
            SignedRequestContext,
        },
        bytes::Bytes,
        chrono::Utc,
        http::{Request, Response, StatusCode},
        serde_json::{json, Value},
        tower::{service_fn, BoxError, Layer, ServiceExt},
    };

    async fn hello(req: Request<Bytes>) -> Result<Response<Bytes>, BoxError> {
        let client = req.extensions().get::<AuthenticatedClient>().expect("client extension missing");
        let body = format!("hello {} {}", client.client_id(), String::from_utf8_lossy(req.body()));
        Ok(Response::new(Bytes::from(body)))
    }

    fn signed_request(method: &str, path_and_query: &str, params: Value, body: &'static str) -> Request<&'static str> {
        let context = SignedRequestContext::builder()
            .method(method)
            .path(path_and_query.split('?').next().unwrap())
            .timestamp(Utc::now().timestamp())
            .client_id("test-client")
            .auth_version(1)
            .params(params.as_object().unwrap().iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .build()
            .unwrap();
        let headers = SignatureGenerator::new(test_config()).sign(&context).unwrap();

        let mut req = Request::builder()
            .method(method)
            .uri(path_and_query)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .unwrap();
        headers.apply_to(req.headers_mut()).unwrap();
        req
    }

    fn error_body(body: &Bytes) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_forwards_valid_request() {
        let svc = AuthSignatureVerifierService::new(test_config(), service_fn(hello), JsonErrorMapper);
        // Make sure we can debug print the verifier service.
        let _ = format!("{:?}", svc);

        let req = signed_request("POST", "/api/users?page=2", json!({"page": "2", "name": "x"}), "name=x");
        let response = svc.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "hello test-client name=x");
    }

    #[test_log::test(tokio::test)]
    async fn test_blocks_tampered_request() {
        let svc = AuthSignatureVerifierService::new(test_config(), service_fn(hello), JsonErrorMapper);
        let req = signed_request("POST", "/api/users", json!({"amount": "1"}), "amount=1000");
        let response = svc.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get("content-type").unwrap(), "application/json");
        assert_eq!(
            error_body(response.body()),
            json!({"error": {"code": "SignatureMismatch", "message": "Invalid signature."}})
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_blocks_unsigned_request() {
        let layer = AuthSignatureLayer::new(test_config(), JsonErrorMapper);
        let _ = format!("{:?}", layer);
        let svc = layer.layer(service_fn(hello));

        let req = Request::builder().uri("/api/users").body(()).unwrap();
        let response = svc.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_body(response.body()),
            json!({"error": {"code": "MissingHeader", "message": "Invalid or missing X-Auth-Version header."}})
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_stale_request() {
        let svc = AuthSignatureVerifierService::new(test_config(), service_fn(hello), JsonErrorMapper);
        let mut req = Request::builder().uri("/api/users").body(()).unwrap();
        AuthHeaders {
            auth_version: 1,
            timestamp: Utc::now().timestamp() - 3600,
            client_id: "test-client".to_string(),
            signature: "0".repeat(64),
        }
        .apply_to(req.headers_mut())
        .unwrap();

        let response = svc.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(error_body(response.body())["error"]["code"], "TimestampExpired");
    }

    #[test_log::test(tokio::test)]
    async fn test_mapper_propagates_other_errors() {
        let e: BoxError = Box::new(std::fmt::Error);
        let result: Result<Response<Bytes>, BoxError> = JsonErrorMapper.map_error(e).await;
        assert!(result.unwrap_err().is::<std::fmt::Error>());

        let e: BoxError = Box::new(SignatureError::UpgradeRequired("upgrade".to_string()));
        let response: Response<Bytes> = JsonErrorMapper.map_error(e).await.unwrap();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
        assert_eq!(error_body(response.body())["error"]["message"], "upgrade");
    }
}
