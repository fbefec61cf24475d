//! Plain HTTP/JSON mirror of the tools under `/api/v1`.
//!
//! Each endpoint goes through the same validation and orchestration as the
//! matching tool; only the envelope differs.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, ErrorKind};
use crate::formatter;
use crate::transport::AppState;

/// Error code for malformed or invalid parameters.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

/// One REST endpoint bound to a tool.
#[derive(Debug, Clone, Copy)]
struct Endpoint {
    tool: &'static str,
    code: &'static str,
    failure: &'static str,
}

const LOGIN_STATUS: Endpoint = Endpoint {
    tool: "check_login_status",
    code: "STATUS_CHECK_FAILED",
    failure: "failed to check login status",
};
const PUBLISH: Endpoint = Endpoint {
    tool: "publish_content",
    code: "PUBLISH_FAILED",
    failure: "failed to publish",
};
const LIST_FEEDS: Endpoint = Endpoint {
    tool: "list_feeds",
    code: "LIST_FEEDS_FAILED",
    failure: "failed to list feeds",
};
const SEARCH_FEEDS: Endpoint = Endpoint {
    tool: "search_feeds",
    code: "SEARCH_FEEDS_FAILED",
    failure: "failed to search feeds",
};
const FEED_DETAIL: Endpoint = Endpoint {
    tool: "get_feed_detail",
    code: "GET_FEED_DETAIL_FAILED",
    failure: "failed to get feed detail",
};
const USER_PROFILE: Endpoint = Endpoint {
    tool: "user_profile",
    code: "GET_USER_PROFILE_FAILED",
    failure: "failed to get user profile",
};
const POST_COMMENT: Endpoint = Endpoint {
    tool: "post_comment_to_feed",
    code: "POST_COMMENT_FAILED",
    failure: "failed to post comment",
};

#[derive(Debug, Serialize)]
struct SuccessBody {
    success: bool,
    data: Value,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: String,
    details: String,
}

/// Routes, relative to the mount point.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login/status", get(login_status))
        .route("/publish", post(publish))
        .route("/feeds/list", get(list_feeds))
        .route("/feeds/search", get(search_feeds))
        .route("/feeds/detail", post(feed_detail))
        .route("/user/profile", post(user_profile))
        .route("/feeds/comment", post(post_comment))
}

async fn login_status(State(state): State<Arc<AppState>>) -> Response {
    run(&state, LOGIN_STATUS, Map::new()).await
}

async fn publish(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    with_body(&state, PUBLISH, &body).await
}

async fn list_feeds(State(state): State<Arc<AppState>>) -> Response {
    run(&state, LIST_FEEDS, Map::new()).await
}

async fn search_feeds(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let arguments = query
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    run(&state, SEARCH_FEEDS, arguments).await
}

async fn feed_detail(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    with_body(&state, FEED_DETAIL, &body).await
}

async fn user_profile(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    with_body(&state, USER_PROFILE, &body).await
}

async fn post_comment(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    with_body(&state, POST_COMMENT, &body).await
}

async fn with_body(state: &AppState, endpoint: Endpoint, body: &[u8]) -> Response {
    match serde_json::from_slice::<Map<String, Value>>(body) {
        Ok(arguments) => run(state, endpoint, arguments).await,
        Err(e) => error_response(
            StatusCode::BAD_REQUEST,
            INVALID_REQUEST,
            "invalid request parameters",
            e.to_string(),
        ),
    }
}

async fn run(state: &AppState, endpoint: Endpoint, arguments: Map<String, Value>) -> Response {
    let orchestrator = state.server.orchestrator();
    let request = match orchestrator.registry().prepare(endpoint.tool, &arguments) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(tool = endpoint.tool, error = %e, "rejected REST request");
            return error_response(
                StatusCode::BAD_REQUEST,
                INVALID_REQUEST,
                "invalid request parameters",
                e.to_string(),
            );
        }
    };

    let outcome = orchestrator.perform(request, None).await;
    let payload = outcome.and_then(|outcome| {
        let data = outcome.to_value()?;
        Ok((data, formatter::success_message(&outcome)))
    });
    match payload {
        Ok((data, message)) => Json(SuccessBody {
            success: true,
            data,
            message: message.to_string(),
        })
        .into_response(),
        Err(e) => failure(endpoint, &e),
    }
}

fn failure(endpoint: Endpoint, error: &Error) -> Response {
    let (status, code, message) = match error.kind() {
        ErrorKind::Usage => (StatusCode::BAD_REQUEST, INVALID_REQUEST, "invalid request parameters"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, endpoint.code, endpoint.failure),
    };
    error_response(status, code, message, error.to_string())
}

fn error_response(status: StatusCode, code: &str, message: &str, details: String) -> Response {
    let body = ErrorBody {
        error: message.to_string(),
        code: code.to_string(),
        details,
    };
    (status, Json(body)).into_response()
}
