//! Error types for the review tool
//!
//! Library code returns these `thiserror` enums; the CLI wraps them in
//! `anyhow` with context. Nothing here is fatal: callers recover at the
//! nearest boundary and turn failures into a status string or a default.

use reqwest::StatusCode;
use thiserror::Error;

/// Maximum number of response-body characters kept in a status error.
const BODY_EXCERPT_CHARS: usize = 200;

/// Failures talking to the conversation backend
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: StatusCode,
        body: String,
    },

    #[error("Failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl ApiError {
    pub fn status(endpoint: impl Into<String>, status: StatusCode, body: &str) -> Self {
        ApiError::Status {
            endpoint: endpoint.into(),
            status,
            body: body.chars().take(BODY_EXCERPT_CHARS).collect(),
        }
    }

    /// HTTP status when the backend answered with a non-success code.
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failures of the key-value persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
