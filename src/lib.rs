//! PCS Review - conversation review and live-test client
//!
//! Library behind the `pcs-review` tool. It talks to the Places
//! Conversational Search backend, turns its UI-component payloads into a
//! readable message list, polls running turns until they finish, and
//! shapes traces and evaluation results for review.
//!
//! ## Layout
//! Backend -> `api` (ChatApi seam) -> `extract` / `transform` -> `merge`
//! -> `session` (live chat) and `review` (annotate tab)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pcs_review::{ApiConfig, ChatConfig, ChatSession, HttpChatApi, PollOptions};
//!
//! # async fn run() -> Result<(), pcs_review::ApiError> {
//! let config = ApiConfig::from_env();
//! let api = Arc::new(HttpChatApi::new(config.clone())?);
//! let session = ChatSession::new(api, ChatConfig::from_api_config(&config), PollOptions::default());
//! session.send_message("tacos near me").await?;
//! let status = session.finish_turn().await;
//! println!("{:?}: {} messages", status.state, session.messages().len());
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Injected configuration
pub mod config;

// View model
pub mod model;

// Backend seam, wire types and HTTP client
pub mod api;

// Payload processing
pub mod extract;
pub mod merge;
pub mod transform;

// Live polling of running turns
pub mod poll;

// Best-effort client state
pub mod store;

pub mod users;

// Controllers
pub mod review;
pub mod session;

pub use api::{ChatApi, HttpChatApi};
pub use config::{ApiConfig, ChatConfig, CicHash, UserLocation};
pub use error::{ApiError, ApiResult, StoreError};
pub use extract::{extract, extract_value, Extracted};
pub use model::{Conversation, EvaluationData, Message, Role};
pub use poll::{ChatPoller, PollHandler, PollOptions, PollState, PollStatus, PollTarget};
pub use review::ReviewBoard;
pub use session::{ChatSession, ChatView};
pub use store::{ChatStateStore, JsonFileStore, KeyValueStore, MemoryStore, ReviewStateStore};
