//! Streamable HTTP transport.
//!
//! One endpoint, routed by verb:
//!
//! - `POST` carries exactly one JSON-RPC request and gets one response,
//!   buffered as JSON or, when negotiated, as an event stream.
//! - `GET` with `Accept: text/event-stream` opens the push channel.
//! - `OPTIONS` is answered with 204 before any routing.
//!
//! Every response carries permissive CORS headers, and a panic anywhere below
//! the router is turned into a JSON-RPC internal error.

use std::any::Any;
use std::convert::Infallible;
use std::future::{Future, IntoFuture};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::codes;
use crate::orchestrator::ProgressSink;
use crate::protocol::{DecodeError, JsonRpcId, JsonRpcRequest, JsonRpcResponse};
use crate::rest;
use crate::server::{McpServer, SERVER_NAME};

/// Largest request body read before the request is treated as unparsable.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

const EVENT_STREAM: &str = "text/event-stream";
const MCP_SESSION_ID: HeaderName = HeaderName::from_static("mcp-session-id");
const CONNECTED: &str = r#"{"type":"connection","status":"connected"}"#;

/// Shared, read-only state for all handlers.
pub struct AppState {
    /// Protocol dispatcher.
    pub server: McpServer,
    /// Start-up configuration.
    pub config: Arc<Config>,
    /// Cancelled when the server begins shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create the state.
    pub fn new(server: McpServer, config: Arc<Config>) -> Self {
        Self {
            server,
            config,
            shutdown: CancellationToken::new(),
        }
    }
}

/// How a `POST` response is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// A single `application/json` body.
    Buffered,
    /// An event stream: zero or more notifications, then the response.
    Streamed,
}

impl TransportMode {
    /// Streamed only if the client accepts it and the method is streamable.
    pub fn negotiate(headers: &HeaderMap, method: &str, config: &Config) -> Self {
        if accepts_event_stream(headers) && config.is_streamable(method) {
            TransportMode::Streamed
        } else {
            TransportMode::Buffered
        }
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mcp", any(mcp_endpoint))
        .route("/mcp/*path", any(mcp_endpoint))
        .route("/health", get(health))
        .nest("/api/v1", rest::routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(preflight_no_content))
                .layer(cors_layer())
                .layer(CatchPanicLayer::custom(panic_response)),
        )
}

/// Serve until `signal` resolves, then drain for the configured window.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    signal: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let drain = state.config.shutdown_timeout;

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signal.await;
        tracing::info!("shutdown requested; no longer accepting connections");
        trigger.cancel();
    });

    let server = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();

    tokio::select! {
        result = server => result,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(drain).await;
        } => {
            tracing::warn!(drain_secs = drain.as_secs(), "drain window elapsed; forcing close");
            Ok(())
        }
    }
}

async fn mcp_endpoint(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match method {
        Method::GET => open_push_channel(&state, &headers),
        Method::POST => handle_post(&state, &headers, body).await,
        _ => (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response(),
    }
}

fn open_push_channel(state: &AppState, headers: &HeaderMap) -> Response {
    if !accepts_event_stream(headers) {
        return (StatusCode::BAD_REQUEST, "SSE not requested").into_response();
    }
    tracing::info!("push channel opened");

    let open = Event::default().event("open").data(CONNECTED);
    let shutdown = state.shutdown.clone().cancelled_owned();
    let events = stream::once(async move { Ok::<_, Infallible>(open) }).chain(
        stream::once(shutdown).filter_map(|_| async { None::<Result<Event, Infallible>> }),
    );
    Sse::new(events).into_response()
}

async fn handle_post(state: &AppState, headers: &HeaderMap, body: Body) -> Response {
    let request = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => JsonRpcRequest::parse(&bytes),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request body");
            Err(DecodeError::Parse(e.to_string()))
        }
    };
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "rejected request body");
            return Json(e.into_response()).into_response();
        }
    };

    match TransportMode::negotiate(headers, &request.method, &state.config) {
        TransportMode::Buffered => Json(state.server.handle_request(request, None).await).into_response(),
        TransportMode::Streamed => stream_response(state.server.clone(), request),
    }
}

fn stream_response(server: McpServer, request: JsonRpcRequest) -> Response {
    let (tx, rx) = mpsc::channel(16);
    let (done_tx, done_rx) = oneshot::channel::<JsonRpcResponse>();
    let token = serde_json::to_value(&request.id).unwrap_or_default();

    tokio::spawn(async move {
        let sink = ProgressSink::new(tx.clone(), token);
        tokio::select! {
            response = server.handle_request(request, Some(&sink)) => {
                let _ = done_tx.send(response);
            }
            _ = tx.closed() => {
                tracing::info!("stream consumer disconnected; call cancelled");
            }
        }
    });

    let notifications = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|notification| (frame(&notification), rx))
    });
    let response = stream::once(done_rx).filter_map(|done| async move { done.ok().map(|r| frame(&r)) });

    Sse::new(notifications.chain(response).map(Ok::<_, Infallible>)).into_response()
}

fn frame(message: &impl Serialize) -> Event {
    match serde_json::to_string(message) {
        Ok(data) => Event::default().data(data),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode stream frame");
            Event::default().data(
                json!({"jsonrpc": "2.0", "error": {"code": codes::INTERNAL_ERROR, "message": "encoding failed"}, "id": null})
                    .to_string(),
            )
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "data": {
            "status": "healthy",
            "service": SERVER_NAME,
            "account": state.config.account,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        },
        "message": "service is healthy",
    }))
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains(EVENT_STREAM))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, MCP_SESSION_ID])
}

/// Preflights are answered by [`CorsLayer`]; clients expect 204 for them.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    let preflight = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if preflight {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "request handler panicked");

    let body = JsonRpcResponse::error(JsonRpcId::Null, codes::INTERNAL_ERROR, "Internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
