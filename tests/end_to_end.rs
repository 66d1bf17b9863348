use {
    bytes::Bytes,
    chrono::{DateTime, Utc},
    http::{Method, Request, Response, StatusCode},
    scratchstack_auth_signature::{
        parse_form_parameters, AuthSignatureConfig, AuthSignatureLayer, AuthenticatedClient, Parameters,
        RequestValidator, SignatureError, SignatureGenerator, SignedRequestContext, JsonErrorMapper,
    },
    scratchstack_errors::ServiceError,
    serde_json::{json, Value},
    std::{path::PathBuf, sync::Arc},
    tower::{service_fn, BoxError, Layer, ServiceExt},
};

const TIMESTAMP: i64 = 1726669826;

fn config() -> Arc<AuthSignatureConfig> {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("data");
    path.push("auth_config.json");
    Arc::new(AuthSignatureConfig::from_json_file(path).unwrap())
}

fn server_time() -> DateTime<Utc> {
    DateTime::from_timestamp(TIMESTAMP, 0).unwrap()
}

fn request(
    method: Method,
    uri: &str,
    content_type: Option<&str>,
    auth_version: i64,
    signature: &str,
    body: &'static str,
) -> Request<&'static str> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Auth-Version", auth_version.to_string())
        .header("X-Auth-Timestamp", TIMESTAMP.to_string())
        .header("X-Auth-Client-ID", "test-client")
        .header("X-Auth-Signature", signature);
    if let Some(content_type) = content_type {
        builder = builder.header("Content-Type", content_type);
    }
    builder.body(body).unwrap()
}

async fn validate(req: Request<&'static str>) -> Result<AuthenticatedClient, Box<SignatureError>> {
    let validator = RequestValidator::new(config());
    match validator.validate_request(req, server_time()).await {
        Ok((_, _, client)) => Ok(client),
        Err(e) => Err(e.downcast::<SignatureError>().unwrap()),
    }
}

#[test_log::test(tokio::test)]
async fn test_known_requests() {
    let req = request(
        Method::GET,
        "/api/users?page=2&filter=active",
        None,
        1,
        "8e765128c8e080d5091be50598af9614ec4d6d1ca6f9960fff4681044113ed64",
        "",
    );
    let client = validate(req).await.unwrap();
    assert_eq!(client.client_id(), "test-client");
    assert_eq!(client.auth_version(), 1);

    // An empty JSON object body is signed like any other request.
    let req = request(
        Method::POST,
        "/api/users",
        Some("application/json"),
        2,
        "c448dc17d80cdc85c5e99cee1f04cddf15c58d7e487da266f3a658842fa95692",
        "{}",
    );
    assert_eq!(validate(req).await.unwrap().auth_version(), 2);

    let req = request(
        Method::PUT,
        "/api/users/1",
        Some("application/json"),
        1,
        "113e083bbe4a6afb3fadcc7665b92e823103851393bfa1b87d743d6541d9a4ee",
        r#"{"user": {"name": "John Doe", "role": "admin"}}"#,
    );
    validate(req).await.unwrap();

    let req = request(
        Method::GET,
        "/api/path%20with%20spaces?email=test%2Buser%40example.com",
        None,
        1,
        "02350719245ee2b2027ab4abfbb25ee91e3df0317793f6b30b2b274d464b9d69",
        "",
    );
    validate(req).await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_empty_post_is_not_exempt() {
    // The signature for an empty POST is still checked.
    let req = request(Method::POST, "/api/users", Some("application/json"), 2, &"0".repeat(64), "{}");
    let e = validate(req).await.unwrap_err();
    assert_eq!(e.error_code(), "SignatureMismatch");
    assert_eq!(e.http_status(), 401);
}

#[test_log::test(tokio::test)]
async fn test_tampered_body() {
    let req = request(
        Method::PUT,
        "/api/users/1",
        Some("application/json"),
        1,
        "113e083bbe4a6afb3fadcc7665b92e823103851393bfa1b87d743d6541d9a4ee",
        r#"{"user": {"name": "John Doe", "role": "root"}}"#,
    );
    let e = validate(req).await.unwrap_err();
    assert_eq!(e.to_string(), "Invalid signature.");
}

async fn echo(req: Request<Bytes>) -> Result<Response<Bytes>, BoxError> {
    let client = req.extensions().get::<AuthenticatedClient>().cloned().ok_or("not authenticated")?;
    let body = json!({"client_id": client.client_id(), "bundle_id": client.bundle_id()});
    Ok(Response::new(Bytes::from(serde_json::to_vec(&body)?)))
}

#[test_log::test(tokio::test)]
async fn test_client_and_server() {
    let config = config();
    let svc = AuthSignatureLayer::new(config.clone(), JsonErrorMapper).layer(service_fn(echo));

    let form_body = "tags[]=a&tags[]=b&user[name]=Jane+Doe&user[roles][]=admin&note=caf%C3%A9";
    let mut params = Parameters::new();
    parse_form_parameters("page=1", &mut params).unwrap();
    parse_form_parameters(form_body, &mut params).unwrap();
    assert_eq!(params["tags"], json!(["a", "b"]));
    assert_eq!(params["user"], json!({"name": "Jane Doe", "roles": ["admin"]}));

    let context = SignedRequestContext::builder()
        .method("POST")
        .path("/api/profiles")
        .client_id("test-client")
        .auth_version(2)
        .params(params)
        .build()
        .unwrap();
    let auth_headers = SignatureGenerator::new(config).sign(&context).unwrap();

    let mut req = Request::builder()
        .method(Method::POST)
        .uri("/api/profiles?page=1")
        .header("Content-Type", "application/x-www-form-urlencoded; charset=utf-8")
        .body(form_body)
        .unwrap();
    auth_headers.apply_to(req.headers_mut()).unwrap();

    let response = svc.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body, json!({"client_id": "test-client", "bundle_id": "com.example.app"}));
}

#[test_log::test(tokio::test)]
async fn test_retired_version() {
    let config = config();
    let svc = AuthSignatureLayer::new(config.clone(), JsonErrorMapper).layer(service_fn(echo));

    let context = SignedRequestContext::builder()
        .method("GET")
        .path("/api/users")
        .client_id("legacy-client")
        .auth_version(1)
        .build()
        .unwrap();
    let auth_headers = SignatureGenerator::new(config).sign(&context).unwrap();

    let mut req = Request::get("/api/users").body(()).unwrap();
    auth_headers.apply_to(req.headers_mut()).unwrap();

    let response = svc.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(
        body,
        json!({"error": {"code": "UpgradeRequired", "message": "A newer application version is required to proceed."}})
    );
}
