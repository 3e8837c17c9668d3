use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;
use tracing_subscriber::fmt::MakeWriter;
use visual_search_gateway::api::error::{NOT_FOUND_MESSAGE, too_large_message};
use visual_search_gateway::config::GatewayConfig;
use visual_search_gateway::{AppState, create_app};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOUNDARY: &str = "---------------------------123456789012345678901234567";
const UPSTREAM_PATH: &str = "/bing/v7.0/images/visualsearch";
const UPSTREAM_JSON: &str = r#"{"_type": "ImageKnowledge", "instrumentation": {"_type": "ResponseInstrumentation"}, "tags": [{"displayName": "", "actions": []}]}"#;
const TINY_JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xD9,
];

struct TestGateway {
    app: Router,
    staging: TempDir,
}

impl TestGateway {
    async fn new(upstream_base: &str) -> Self {
        let staging = tempfile::tempdir().unwrap();
        let config = GatewayConfig::development(
            Url::parse(upstream_base).unwrap(),
            staging.path().to_path_buf(),
        );
        let state = AppState::from_config(config).unwrap();
        state.staging.prepare().await.unwrap();

        Self {
            app: create_app(state),
            staging,
        }
    }

    fn staged_files(&self) -> usize {
        staged_files(self.staging.path())
    }

    async fn login(&self) -> String {
        let response = self
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/login")
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(Body::from("userId=admin&password=password"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["auth"], true);
        json["jwtToken"].as_str().unwrap().to_string()
    }

    async fn search(&self, uri: &str, token: Option<&str>, body: Vec<u8>) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(token) = token {
            request = request.header("authkey", token);
        }

        let response = self
            .app
            .clone()
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }
}

fn staged_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn search_form(content_type: &str, image: &[u8], mkt: &str, safesearch: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
            Content-Disposition: form-data; name=\"image\"; filename=\"cat.jpg\"\r\n\
            Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(image);
    body.extend_from_slice(
        format!(
            "\r\n--{BOUNDARY}\r\n\
            Content-Disposition: form-data; name=\"mkt\"\r\n\r\n\
            {mkt}\r\n\
            --{BOUNDARY}\r\n\
            Content-Disposition: form-data; name=\"safesearch\"\r\n\r\n\
            {safesearch}\r\n\
            --{BOUNDARY}--\r\n"
        )
        .as_bytes(),
    );
    body
}

async fn mock_upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPSTREAM_PATH))
        .and(query_param("mkt", "en-US"))
        .and(query_param("safesearch", "moderate"))
        .and(header("Ocp-Apim-Subscription-Key", "dev-subscription-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(UPSTREAM_JSON, "application/json"))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_login_form_and_json() {
    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;
    let token = gateway.login().await;
    assert_eq!(token.split('.').count(), 3);

    let response = gateway
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"userId": "admin", "password": "password"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["auth"], true);
    assert!(json["jwtToken"].is_string());
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;

    for body in [
        "userId=admin&password=wrong",
        "userId=root&password=password",
        "password=password",
        "",
    ] {
        let response = gateway
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/login")
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "body {body:?}");
        let json = body_json(response).await;
        assert_eq!(json["auth"], false);
        assert!(json["jwtToken"].is_null());
    }
}

#[tokio::test]
async fn test_login_accepts_multipart_fields() {
    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;

    for (password, expected) in [
        ("password", StatusCode::OK),
        ("wrong", StatusCode::UNAUTHORIZED),
    ] {
        let body = format!(
            "--{BOUNDARY}\r\n\
            Content-Disposition: form-data; name=\"userId\"\r\n\r\n\
            admin\r\n\
            --{BOUNDARY}\r\n\
            Content-Disposition: form-data; name=\"password\"\r\n\r\n\
            {password}\r\n\
            --{BOUNDARY}--\r\n"
        );
        let response = gateway
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/login")
                    .header(
                        "Content-Type",
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), expected, "password {password:?}");
        let json = body_json(response).await;
        assert_eq!(json["auth"], expected == StatusCode::OK);
    }
}

#[tokio::test]
async fn test_login_without_content_type_is_denied() {
    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;

    for body in ["", "userId=admin&password=password"] {
        let response = gateway
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/login")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "body {body:?}");
        let json = body_json(response).await;
        assert_eq!(json["auth"], false);
        assert!(json["jwtToken"].is_null());
    }
}

#[tokio::test]
async fn test_search_without_token_is_forbidden() {
    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;
    let form = search_form("image/jpeg", TINY_JPEG, "en-US", "moderate");

    let (status, body) = gateway.search("/visualsearch", None, form).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["auth"], false);
    assert_eq!(json["message"], "No token provided.");
    assert_eq!(gateway.staged_files(), 0);
}

#[tokio::test]
async fn test_search_with_malformed_token_fails() {
    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;
    let form = search_form("image/jpeg", TINY_JPEG, "en-US", "moderate");

    let (status, body) = gateway
        .search("/visualsearch", Some("not.a.token"), form)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["auth"], false);
    assert_eq!(json["message"], "Failed to authenticate token.");
    assert_eq!(gateway.staged_files(), 0);
}

#[tokio::test]
async fn test_end_to_end_search_relays_upstream_json() {
    let upstream = mock_upstream().await;
    let gateway = TestGateway::new(&format!("{}{}", upstream.uri(), UPSTREAM_PATH)).await;
    let token = gateway.login().await;

    let form = search_form("image/jpeg", TINY_JPEG, "en-US", "moderate");
    let (status, body) = gateway.search("/visualsearch", Some(&token), form).await;

    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
    assert_eq!(body, UPSTREAM_JSON.as_bytes());
    assert_eq!(gateway.staged_files(), 0);

    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let forwarded = &received[0].body;
    assert!(
        forwarded
            .windows(TINY_JPEG.len())
            .any(|window| window == TINY_JPEG)
    );
}

#[tokio::test]
async fn test_legacy_route_needs_no_token() {
    let upstream = mock_upstream().await;
    let gateway = TestGateway::new(&format!("{}{}", upstream.uri(), UPSTREAM_PATH)).await;

    let form = search_form("image/jpeg", TINY_JPEG, "en-US", "moderate");
    let (status, body) = gateway.search("/api/v1/visualsearch", None, form).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, UPSTREAM_JSON.as_bytes());
    assert_eq!(gateway.staged_files(), 0);
}

#[tokio::test]
async fn test_non_image_rejected_and_nothing_staged() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;
    let gateway = TestGateway::new(&format!("{}{}", upstream.uri(), UPSTREAM_PATH)).await;
    let token = gateway.login().await;

    let form = search_form("text/plain", b"just some text", "en-US", "moderate");
    let (status, body) = gateway.search("/visualsearch", Some(&token), form).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).contains("not an image file"));
    assert_eq!(gateway.staged_files(), 0);
}

#[tokio::test]
async fn test_invalid_parameters_release_staged_file() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;
    let gateway = TestGateway::new(&format!("{}{}", upstream.uri(), UPSTREAM_PATH)).await;
    let token = gateway.login().await;

    for (mkt, safesearch) in [("en-us", "moderate"), ("en-US", "MODERATE"), ("xx-XX", "off")] {
        let form = search_form("image/jpeg", TINY_JPEG, mkt, safesearch);
        let (status, body) = gateway.search("/visualsearch", Some(&token), form).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).contains("'mkt' and 'safesearch'"));
        assert_eq!(gateway.staged_files(), 0);
    }
}

#[tokio::test]
async fn test_upstream_failure_releases_staged_file() {
    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;
    let token = gateway.login().await;

    let form = search_form("image/png", TINY_JPEG, "en-US", "moderate");
    let (status, body) = gateway.search("/visualsearch", Some(&token), form).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        String::from_utf8_lossy(&body),
        "An error occured while processing your request."
    );
    assert_eq!(gateway.staged_files(), 0);
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;
    let token = gateway.login().await;

    let image = vec![0xAB_u8; 1024 * 1024 + 1];
    let form = search_form("image/jpeg", &image, "en-US", "moderate");
    let (status, body) = gateway.search("/visualsearch", Some(&token), form).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body, too_large_message(1024 * 1024).into_bytes());
    assert_eq!(gateway.staged_files(), 0);
}

#[tokio::test]
async fn test_missing_image_field_rejected() {
    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;
    let token = gateway.login().await;

    let form = format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"mkt\"\r\n\r\n\
        en-US\r\n\
        --{BOUNDARY}--\r\n"
    );
    let (status, _) = gateway
        .search("/visualsearch", Some(&token), form.into_bytes())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;

    let response = gateway
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/does/not/exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-request-id"));
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, NOT_FOUND_MESSAGE);
}

#[tokio::test]
async fn test_wrong_method_on_known_path_is_not_found() {
    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;

    for uri in ["/visualsearch", "/api/v1/visualsearch", "/login"] {
        let response = gateway
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND, "GET {uri}");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, NOT_FOUND_MESSAGE, "GET {uri}");
    }
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn test_request_span_carries_minted_request_id() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;
    let response = gateway
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let request_id = response.headers()["x-request-id"]
        .to_str()
        .unwrap()
        .to_string();
    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();

    assert!(
        output.contains(&format!("request_id={request_id}")),
        "{output}"
    );
    assert!(!output.contains("request_id=unknown"), "{output}");
}

#[tokio::test]
async fn test_health_reports_staging() {
    let gateway = TestGateway::new("http://127.0.0.1:1/visualsearch").await;

    let response = gateway
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["staging"], "ready");
}
