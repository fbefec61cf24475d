//! # xiaohongshu-mcp
//!
//! MCP (Model Context Protocol) server that lets AI agents drive a logged-in
//! Xiaohongshu account through a real browser.
//!
//! The server speaks JSON-RPC 2.0 over streamable HTTP on a single endpoint
//! and mirrors the same operations as a plain REST API.
//!
//! ## Available Tools
//!
//! - `check_login_status`: whether the persisted cookies are still logged in
//! - `publish_content`: publish an image note
//! - `list_feeds`: home page recommendations
//! - `search_feeds`: keyword search
//! - `get_feed_detail`: one note with its comments
//! - `user_profile`: a user's profile page
//! - `post_comment_to_feed`: comment on a note
//!
//! ## Usage with an MCP client
//!
//! ```json
//! {
//!   "servers": {
//!     "xiaohongshu": {
//!       "type": "http",
//!       "url": "http://localhost:18060/mcp"
//!     }
//!   }
//! }
//! ```
//!
//! ## Execution model
//!
//! Every tool call gets its own browser session, which is released on every
//! exit path: success, failure, timeout, panic, or client disconnect.
//! Validation failures are reported before any browser is started.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arguments;
pub mod browser;
pub mod config;
pub mod error;
pub mod formatter;
pub mod operations;
pub mod orchestrator;
pub mod protocol;
pub mod rest;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;
pub mod xiaohongshu;

pub use config::{BrowserConfig, CallPolicy, Config};
pub use error::{Error, ErrorKind, Result};
pub use orchestrator::ActionOrchestrator;
pub use protocol::{JsonRpcId, JsonRpcRequest, JsonRpcResponse};
pub use server::McpServer;
pub use session::{AutomationSession, SessionFactory};
pub use tools::{Tool, ToolRegistry};
pub use transport::{router, serve, AppState};
