//! MCP server validation tests.
//!
//! Drives the HTTP router in-process with a fake browser and fake site so
//! protocol compliance, error channels and session lifecycle can be checked
//! without Chrome.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::time::timeout;
use tower::ServiceExt;

use xiaohongshu_mcp::config::{CallPolicy, Config};
use xiaohongshu_mcp::operations::{
    DomainOperations, FeedDetail, FeedsList, LoginStatus, PostCommentResponse, PublishRequest,
    PublishResponse, UserProfile,
};
use xiaohongshu_mcp::{
    router, ActionOrchestrator, AppState, AutomationSession, Error, McpServer, Result,
    SessionFactory, ToolRegistry,
};

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Counters {
    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

struct FakeSession {
    counters: Arc<Counters>,
}

#[async_trait::async_trait]
impl AutomationSession for FakeSession {
    fn id(&self) -> &str {
        "fake"
    }

    async fn navigate(&self, _url: &str) -> Result<()> {
        Ok(())
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value> {
        Ok(json!([{"id": "n1", "xsecToken": "t1"}, {"id": "n2", "xsecToken": "t2"}]))
    }

    async fn exists(&self, _selector: &str) -> Result<bool> {
        Ok(true)
    }

    async fn click(&self, _selector: &str) -> Result<()> {
        Ok(())
    }

    async fn type_text(&self, _selector: &str, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn set_files(&self, _selector: &str, _paths: &[PathBuf]) -> Result<()> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeFactory {
    counters: Arc<Counters>,
    fail: bool,
}

#[async_trait::async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self) -> Result<Box<dyn AutomationSession>> {
        if self.fail {
            return Err(Error::Setup("browser binary not found".into()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_active.fetch_max(active, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            counters: self.counters.clone(),
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Succeed,
    Slow,
    Fail,
    Panic,
    Hang,
}

struct FakeSite {
    behavior: Behavior,
}

impl FakeSite {
    async fn step(&self) -> Result<()> {
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Slow => {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            }
            Behavior::Fail => Err(Error::Operation("captcha required".into())),
            Behavior::Panic => panic!("selector engine exploded"),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }
    }

    async fn feeds(&self, session: &dyn AutomationSession) -> Result<FeedsList> {
        self.step().await?;
        match session.evaluate("feeds").await? {
            Value::Array(feeds) => Ok(FeedsList::new(feeds)),
            _ => Err(Error::Operation("no feeds".into())),
        }
    }
}

#[async_trait::async_trait]
impl DomainOperations for FakeSite {
    async fn check_login_status(&self, session: &dyn AutomationSession) -> Result<LoginStatus> {
        self.step().await?;
        Ok(LoginStatus {
            is_logged_in: session.exists(".user").await?,
            username: Some("ai-report".into()),
        })
    }

    async fn publish_content(
        &self,
        _session: &dyn AutomationSession,
        request: &PublishRequest,
    ) -> Result<PublishResponse> {
        self.step().await?;
        Ok(PublishResponse {
            title: request.title.clone(),
            content: request.content.clone(),
            images: request.images.len(),
            status: "published".into(),
            post_id: None,
        })
    }

    async fn list_feeds(&self, session: &dyn AutomationSession) -> Result<FeedsList> {
        self.feeds(session).await
    }

    async fn search_feeds(
        &self,
        session: &dyn AutomationSession,
        _keyword: &str,
    ) -> Result<FeedsList> {
        self.feeds(session).await
    }

    async fn feed_detail(
        &self,
        _session: &dyn AutomationSession,
        feed_id: &str,
        _xsec_token: &str,
    ) -> Result<FeedDetail> {
        self.step().await?;
        Ok(FeedDetail {
            feed_id: feed_id.to_string(),
            data: json!({"note": {"title": "hello"}}),
        })
    }

    async fn user_profile(
        &self,
        _session: &dyn AutomationSession,
        _user_id: &str,
        _xsec_token: &str,
    ) -> Result<UserProfile> {
        self.step().await?;
        Ok(UserProfile {
            user_basic_info: json!({"nickname": "someone"}),
            interactions: json!([]),
            feeds: vec![],
        })
    }

    async fn post_comment(
        &self,
        _session: &dyn AutomationSession,
        feed_id: &str,
        _xsec_token: &str,
        _content: &str,
    ) -> Result<PostCommentResponse> {
        self.step().await?;
        Ok(PostCommentResponse {
            feed_id: feed_id.to_string(),
            success: true,
            message: "comment posted".into(),
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

struct TestServer {
    app: Router,
    counters: Arc<Counters>,
}

impl TestServer {
    fn new(behavior: Behavior) -> Self {
        Self::with(behavior, Config::default(), false)
    }

    fn with(behavior: Behavior, config: Config, factory_fails: bool) -> Self {
        let counters = Arc::new(Counters::default());
        let orchestrator = ActionOrchestrator::new(
            Arc::new(ToolRegistry::new()),
            Arc::new(FakeFactory {
                counters: counters.clone(),
                fail: factory_fails,
            }),
            Arc::new(FakeSite { behavior }),
            &config,
        );
        let state = Arc::new(AppState::new(
            McpServer::new(Arc::new(orchestrator)),
            Arc::new(config),
        ));
        Self {
            app: router(state),
            counters,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn post_raw(&self, body: impl Into<String>) -> (StatusCode, String) {
        self.send(post_request(body.into(), false)).await
    }

    async fn rpc(&self, body: Value) -> Value {
        let (status, text) = self.post_raw(body.to_string()).await;
        assert_eq!(status, StatusCode::OK, "unexpected status, body: {text}");
        serde_json::from_str(&text).unwrap()
    }

    async fn call_tool(&self, id: i64, name: &str, arguments: Value) -> Value {
        self.rpc(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }))
        .await
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let (status, text) = self.send(request).await;
        (status, serde_json::from_str(&text).unwrap())
    }

    async fn post_json(&self, uri: &str, body: impl Into<String>) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.into()))
            .unwrap();
        let (status, text) = self.send(request).await;
        (status, serde_json::from_str(&text).unwrap())
    }
}

fn post_request(body: String, streaming: bool) -> Request<Body> {
    let accept = if streaming {
        "application/json, text/event-stream"
    } else {
        "application/json"
    };
    Request::post("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, accept)
        .body(Body::from(body))
        .unwrap()
}

fn streaming_config() -> Config {
    Config {
        streamable_methods: vec!["tools/call".into()],
        ..Config::default()
    }
}

fn local_image() -> (tempfile::NamedTempFile, String) {
    let file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
    let path = file.path().display().to_string();
    (file, path)
}

fn tool_text(response: &Value) -> &str {
    response["result"]["content"][0]["text"].as_str().unwrap()
}

fn sse_data(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter_map(|frame| {
            frame
                .lines()
                .find_map(|line| line.strip_prefix("data:"))
                .map(|data| serde_json::from_str(data.trim_start()).unwrap())
        })
        .collect()
}

async fn wait_for_closed(counters: &Counters, expected: usize) {
    for _ in 0..100 {
        if counters.closed() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} released session(s), saw {}",
        counters.closed()
    );
}

// ============================================================================
// Protocol
// ============================================================================

#[tokio::test]
async fn test_ping() {
    let server = TestServer::new(Behavior::Succeed);
    let (status, body) = server
        .post_raw(r#"{"jsonrpc":"2.0","method":"ping","params":{},"id":1}"#)
        .await;

    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response, json!({"jsonrpc": "2.0", "result": {}, "id": 1}));
}

#[tokio::test]
async fn test_initialize_handshake() {
    let server = TestServer::new(Behavior::Succeed);
    let response = server
        .rpc(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "0.1.0"}
            }
        }))
        .await;

    assert_eq!(response["id"], 1);
    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(response["result"]["serverInfo"]["name"], "xiaohongshu-mcp");
    assert!(response["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn test_initialized_notification_is_acknowledged() {
    let server = TestServer::new(Behavior::Succeed);
    for method in ["initialized", "notifications/initialized"] {
        let response = server
            .rpc(json!({"jsonrpc": "2.0", "id": 5, "method": method}))
            .await;
        assert_eq!(response["result"], json!({}));
    }
}

#[tokio::test]
async fn test_list_tools() {
    let server = TestServer::new(Behavior::Succeed);
    let response = server
        .rpc(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .await;

    let tools = response["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert_eq!(
        names,
        [
            "check_login_status",
            "publish_content",
            "list_feeds",
            "search_feeds",
            "get_feed_detail",
            "user_profile",
            "post_comment_to_feed",
        ]
    );
    for tool in tools {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
}

#[tokio::test]
async fn test_unknown_method_error() {
    let server = TestServer::new(Behavior::Succeed);
    let response = server
        .rpc(json!({"jsonrpc": "2.0", "method": "nope", "id": 3}))
        .await;

    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["id"], 3);
    assert!(response.get("result").is_none());
}

#[tokio::test]
async fn test_parse_error_has_null_id() {
    let server = TestServer::new(Behavior::Succeed);
    for body in ["{not json", "[]", r#"[{"jsonrpc":"2.0","method":"ping","id":1}]"#, ""] {
        let (status, text) = server.post_raw(body).await;
        assert_eq!(status, StatusCode::OK);
        let response: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(response["error"]["code"], -32700, "body: {body:?}");
        assert!(response["id"].is_null());
    }
}

#[tokio::test]
async fn test_id_is_echoed_verbatim() {
    let server = TestServer::new(Behavior::Succeed);

    let (_, text) = server
        .post_raw(r#"{"jsonrpc":"2.0","method":"ping","id":"abc-1"}"#)
        .await;
    assert!(text.contains(r#""id":"abc-1""#), "{text}");

    let (_, text) = server
        .post_raw(r#"{"jsonrpc":"2.0","method":"ping","id":null}"#)
        .await;
    assert!(text.contains(r#""id":null"#), "{text}");

    let (_, text) = server
        .post_raw(r#"{"jsonrpc":"2.0","method":"ping","id":1.0}"#)
        .await;
    assert!(text.contains(r#""id":1.0"#), "{text}");
}

#[tokio::test]
async fn test_invalid_tool_call_params_are_protocol_errors() {
    let server = TestServer::new(Behavior::Succeed);

    let response = server
        .rpc(json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": "search_feeds"}))
        .await;
    assert_eq!(response["error"]["code"], -32602);

    let response = server
        .rpc(json!({
            "jsonrpc": "2.0",
            "id": 8,
            "method": "tools/call",
            "params": {"name": "search_feeds", "arguments": ["coffee"]}
        }))
        .await;
    assert_eq!(response["error"]["code"], -32602);
    assert_eq!(server.counters.opened(), 0);
}

// ============================================================================
// Tool calls
// ============================================================================

#[tokio::test]
async fn test_missing_argument_is_a_tool_error() {
    let server = TestServer::new(Behavior::Succeed);
    let response = server.call_tool(2, "search_feeds", json!({})).await;

    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("keyword"));
    assert_eq!(server.counters.opened(), 0);
}

#[tokio::test]
async fn test_unknown_tool_error() {
    let server = TestServer::new(Behavior::Succeed);
    let response = server.call_tool(4, "delete_account", json!({})).await;

    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("unknown tool"));
    assert_eq!(server.counters.opened(), 0);
}

#[tokio::test]
async fn test_arguments_mapping_is_required() {
    let server = TestServer::new(Behavior::Succeed);
    for (id, params) in [
        (9, json!({"name": "list_feeds"})),
        (10, json!({"name": "list_feeds", "arguments": null})),
    ] {
        let response = server
            .rpc(json!({"jsonrpc": "2.0", "id": id, "method": "tools/call", "params": params}))
            .await;
        assert_eq!(response["error"]["code"], -32602);
        assert_eq!(response["id"], id);
    }
    assert_eq!(server.counters.opened(), 0);

    let response = server.call_tool(11, "list_feeds", json!({})).await;
    assert_eq!(response["result"]["isError"], false);
    let payload: Value = serde_json::from_str(tool_text(&response)).unwrap();
    assert_eq!(payload["count"], 2);
    assert_eq!(payload["feeds"][0]["xsecToken"], "t1");
}

#[tokio::test]
async fn test_wide_title_rejected_before_browser_start() {
    let server = TestServer::new(Behavior::Succeed);
    let (_file, image) = local_image();
    let response = server
        .call_tool(
            5,
            "publish_content",
            json!({
                "title": "好".repeat(21),
                "content": "body",
                "images": [image]
            }),
        )
        .await;

    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("title"));
    assert_eq!(server.counters.opened(), 0);
}

#[tokio::test]
async fn test_publish_summary() {
    let server = TestServer::new(Behavior::Succeed);
    let (_a, a) = local_image();
    let (_b, b) = local_image();
    let response = server
        .call_tool(
            6,
            "publish_content",
            json!({
                "title": "好".repeat(20),
                "content": "body",
                "images": [a, b],
                "tags": ["#coffee"]
            }),
        )
        .await;

    assert_eq!(response["result"]["isError"], false);
    assert!(tool_text(&response).contains("2 image(s)"));
    assert_eq!(server.counters.closed(), 1);
}

#[tokio::test]
async fn test_unusable_images_rejected_before_browser_start() {
    let server = TestServer::new(Behavior::Succeed);
    for (id, image) in [
        (12, "https://example.com/a.jpg"),
        (13, "/definitely/not/here.jpg"),
    ] {
        let response = server
            .call_tool(
                id,
                "publish_content",
                json!({"title": "t", "content": "body", "images": [image]}),
            )
            .await;
        assert_eq!(response["result"]["isError"], true);
        assert!(tool_text(&response).contains("images"), "{response}");
    }
    assert_eq!(server.counters.opened(), 0);
}

#[tokio::test]
async fn test_request_without_method_is_invalid() {
    let server = TestServer::new(Behavior::Succeed);
    let response = server.rpc(json!({"jsonrpc": "2.0", "id": 4})).await;

    assert_eq!(response["error"]["code"], -32600);
    assert_eq!(response["id"], 4);
    assert!(response.get("result").is_none());
}

#[tokio::test]
async fn test_comment_summary() {
    let server = TestServer::new(Behavior::Succeed);
    let response = server
        .call_tool(
            7,
            "post_comment_to_feed",
            json!({"feed_id": "f1", "xsec_token": "t1", "content": "nice"}),
        )
        .await;

    assert_eq!(tool_text(&response), "Comment posted - Feed ID: f1");
}

#[tokio::test]
async fn test_login_status_is_stable() {
    let server = TestServer::new(Behavior::Succeed);
    let first = server.call_tool(1, "check_login_status", json!({})).await;
    let second = server.call_tool(2, "check_login_status", json!({})).await;

    let first: Value = serde_json::from_str(tool_text(&first)).unwrap();
    let second: Value = serde_json::from_str(tool_text(&second)).unwrap();
    assert_eq!(first["is_logged_in"], second["is_logged_in"]);
    assert_eq!(server.counters.opened(), 2);
    assert_eq!(server.counters.closed(), 2);
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_failed_operation_releases_once() {
    let server = TestServer::new(Behavior::Fail);
    let response = server
        .call_tool(3, "search_feeds", json!({"keyword": "coffee"}))
        .await;

    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("captcha required"));
    assert_eq!(server.counters.opened(), 1);
    assert_eq!(server.counters.closed(), 1);
}

#[tokio::test]
async fn test_panicking_operation_releases_once() {
    let server = TestServer::new(Behavior::Panic);
    let response = server
        .call_tool(
            4,
            "get_feed_detail",
            json!({"feed_id": "f1", "xsec_token": "t1"}),
        )
        .await;

    assert_eq!(response["error"]["code"], -32603);
    assert_eq!(response["id"], 4);
    assert_eq!(server.counters.closed(), 1);
}

#[tokio::test]
async fn test_setup_failure_is_a_tool_error() {
    let server = TestServer::with(Behavior::Succeed, Config::default(), true);
    let response = server.call_tool(5, "list_feeds", json!({})).await;

    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("automation setup failed"));
    assert_eq!(server.counters.closed(), 0);
}

#[tokio::test]
async fn test_timeout_releases_session() {
    let config = Config {
        call_timeout: Duration::from_millis(100),
        ..Config::default()
    };
    let server = TestServer::with(Behavior::Hang, config, false);
    let response = server
        .call_tool(6, "user_profile", json!({"user_id": "u1", "xsec_token": "t1"}))
        .await;

    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("timed out"));
    assert_eq!(server.counters.closed(), 1);
}

#[tokio::test]
async fn test_serialized_policy_runs_one_session_at_a_time() {
    let config = Config {
        call_policy: CallPolicy::Serialized,
        ..Config::default()
    };
    let server = TestServer::with(Behavior::Slow, config, false);

    let (a, b) = tokio::join!(
        server.call_tool(1, "list_feeds", json!({})),
        server.call_tool(2, "list_feeds", json!({})),
    );

    assert_eq!(a["result"]["isError"], false);
    assert_eq!(b["result"]["isError"], false);
    assert_eq!(server.counters.max_active(), 1);
    assert_eq!(server.counters.closed(), 2);
}

// ============================================================================
// Transport
// ============================================================================

#[tokio::test]
async fn test_options_preflight() {
    let server = TestServer::new(Behavior::Succeed);
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
    for method in ["GET", "POST", "OPTIONS"] {
        assert!(methods.contains(method), "{methods}");
    }
    let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    for name in ["content-type", "accept", "mcp-session-id"] {
        assert!(allowed.contains(name), "{allowed}");
    }

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(body.is_empty());
    assert_eq!(server.counters.opened(), 0);
}

#[tokio::test]
async fn test_options_preflight_on_rest_routes() {
    let server = TestServer::new(Behavior::Succeed);
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/publish")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_cors_headers_on_post() {
    let server = TestServer::new(Behavior::Succeed);
    let response = server
        .app
        .clone()
        .oneshot(post_request(
            r#"{"jsonrpc":"2.0","method":"ping","id":1}"#.into(),
            false,
        ))
        .await
        .unwrap();

    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
}

#[tokio::test]
async fn test_unsupported_verb() {
    let server = TestServer::new(Behavior::Succeed);
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();
    let (status, _) = server.send(request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_push_channel_requires_event_stream() {
    let server = TestServer::new(Behavior::Succeed);
    let request = Request::get("/mcp").body(Body::empty()).unwrap();
    let (status, _) = server.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_push_channel_opens() {
    let server = TestServer::new(Behavior::Succeed);
    let request = Request::get("/mcp")
        .header(header::ACCEPT, "text/event-stream")
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let mut frames = response.into_body().into_data_stream();
    let first = timeout(Duration::from_secs(2), frames.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let first = String::from_utf8(first.to_vec()).unwrap();
    assert!(first.contains("event: open") || first.contains("event:open"), "{first}");
    assert!(first.contains(r#""status":"connected""#), "{first}");
}

#[tokio::test]
async fn test_buffered_when_method_not_streamable() {
    let server = TestServer::new(Behavior::Succeed);
    let response = server
        .app
        .clone()
        .oneshot(post_request(
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                   "params": {"name": "list_feeds", "arguments": {}}})
            .to_string(),
            true,
        ))
        .await
        .unwrap();

    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
}

#[tokio::test]
async fn test_streamed_call_ends_with_the_response() {
    let server = TestServer::with(Behavior::Succeed, streaming_config(), false);
    let response = server
        .app
        .clone()
        .oneshot(post_request(
            json!({"jsonrpc": "2.0", "id": 11, "method": "tools/call",
                   "params": {"name": "list_feeds", "arguments": {}}})
            .to_string(),
            true,
        ))
        .await
        .unwrap();

    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let frames = sse_data(std::str::from_utf8(&body).unwrap());

    let (last, progress) = frames.split_last().unwrap();
    assert_eq!(last["id"], 11);
    assert_eq!(last["result"]["isError"], false);
    assert!(!progress.is_empty());
    for frame in progress {
        assert_eq!(frame["method"], "notifications/progress");
        assert_eq!(frame["params"]["progressToken"], 11);
    }
    assert_eq!(server.counters.closed(), 1);
}

#[tokio::test]
async fn test_stream_disconnect_releases_session() {
    let server = TestServer::with(Behavior::Hang, streaming_config(), false);
    let response = server
        .app
        .clone()
        .oneshot(post_request(
            json!({"jsonrpc": "2.0", "id": 12, "method": "tools/call",
                   "params": {"name": "list_feeds", "arguments": {}}})
            .to_string(),
            true,
        ))
        .await
        .unwrap();

    let mut frames = response.into_body().into_data_stream();
    let mut seen = String::new();
    while !seen.contains("running") {
        let chunk = timeout(Duration::from_secs(2), frames.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        seen.push_str(std::str::from_utf8(&chunk).unwrap());
    }
    assert_eq!(server.counters.opened(), 1);
    assert_eq!(server.counters.closed(), 0);

    drop(frames);
    wait_for_closed(&server.counters, 1).await;
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::new(Behavior::Succeed);
    let (status, body) = server.get_json("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["service"], "xiaohongshu-mcp");
    assert_eq!(body["data"]["account"], "ai-report");
    assert!(body["data"]["timestamp"].is_string());
    assert_eq!(server.counters.opened(), 0);
}

#[test]
fn test_ping_from_blocking_context() {
    tokio_test::block_on(async {
        let server = TestServer::new(Behavior::Succeed);
        let response = server
            .rpc(json!({"jsonrpc": "2.0", "id": "sync", "method": "ping"}))
            .await;
        assert_eq!(response["id"], "sync");
    });
}

// ============================================================================
// REST mirror
// ============================================================================

#[tokio::test]
async fn test_rest_login_status() {
    let server = TestServer::new(Behavior::Succeed);
    let (status, body) = server.get_json("/api/v1/login/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["is_logged_in"], true);
    assert_eq!(body["message"], "login status checked");
}

#[tokio::test]
async fn test_rest_search_requires_keyword() {
    let server = TestServer::new(Behavior::Succeed);
    let (status, body) = server.get_json("/api/v1/feeds/search").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["details"].as_str().unwrap().contains("keyword"));
    assert_eq!(server.counters.opened(), 0);
}

#[tokio::test]
async fn test_rest_search_failure() {
    let server = TestServer::new(Behavior::Fail);
    let (status, body) = server.get_json("/api/v1/feeds/search?keyword=coffee").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "SEARCH_FEEDS_FAILED");
    assert!(body["details"].as_str().unwrap().contains("captcha"));
    assert_eq!(server.counters.closed(), 1);
}

#[tokio::test]
async fn test_rest_feed_detail() {
    let server = TestServer::new(Behavior::Succeed);
    let (status, body) = server
        .post_json(
            "/api/v1/feeds/detail",
            json!({"feed_id": "f1", "xsec_token": "t1"}).to_string(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["feed_id"], "f1");
    assert_eq!(body["data"]["data"]["note"]["title"], "hello");
}

#[tokio::test]
async fn test_rest_publish_rejects_malformed_body() {
    let server = TestServer::new(Behavior::Succeed);
    let (status, body) = server.post_json("/api/v1/publish", "{oops").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert_eq!(server.counters.opened(), 0);
}

#[tokio::test]
async fn test_rest_comment_setup_failure() {
    let server = TestServer::with(Behavior::Succeed, Config::default(), true);
    let (status, body) = server
        .post_json(
            "/api/v1/feeds/comment",
            json!({"feed_id": "f1", "xsec_token": "t1", "content": "nice"}).to_string(),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "POST_COMMENT_FAILED");
}
