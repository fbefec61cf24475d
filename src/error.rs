//! Error types for the MCP server.

use std::time::Duration;

use thiserror::Error;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// MCP server errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Tool not found.
    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    /// A required tool argument is absent or empty.
    #[error("missing required argument `{0}`")]
    MissingArgument(String),

    /// A tool argument is present but unusable.
    #[error("invalid argument `{field}`: {reason}")]
    InvalidArgument {
        /// Argument name.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Invalid protocol parameters (shape of the envelope, not tool arguments).
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The automation engine could not be started.
    #[error("automation setup failed: {0}")]
    Setup(String),

    /// A browser protocol command failed.
    #[error("browser error: {0}")]
    Browser(String),

    /// The site rejected the action or the page did not look as expected.
    #[error("{0}")]
    Operation(String),

    /// The domain operation did not finish in time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used to pick the response channel for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed envelope or parameters; reported as a JSON-RPC error.
    Protocol,
    /// Bad tool arguments; reported inside a tool result.
    Usage,
    /// The automation session could not be acquired.
    Setup,
    /// The automation ran and failed.
    Operation,
    /// Unexpected fault inside the server.
    Internal,
}

impl Error {
    /// Which failure class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidParams(_) => ErrorKind::Protocol,
            Error::ToolNotFound(_) | Error::MissingArgument(_) | Error::InvalidArgument { .. } => {
                ErrorKind::Usage
            }
            Error::Setup(_) | Error::Io(_) => ErrorKind::Setup,
            Error::Browser(_) | Error::Operation(_) | Error::Timeout(_) => ErrorKind::Operation,
            Error::Serialization(_) => ErrorKind::Operation,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for an [`Error::InvalidArgument`].
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Standard JSON-RPC error codes.
pub mod codes {
    /// Parse error.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i32 = -32603;
}
