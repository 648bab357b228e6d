//! ChatApi trait: the only seam between the review tool and the backend.
//! Controllers hold an `Arc<dyn ChatApi>`. `http::HttpChatApi` talks to the
//! real service and tests substitute scripted implementations.

pub mod http;
pub mod wire;

use async_trait::async_trait;

use crate::config::CicHash;
use crate::error::ApiResult;
use wire::{
    ChatRequest, ChatResponse, ConversationSummary, EvalRunResponse, FullConversationResponse,
    RecentConversationsRequest,
};

pub use http::HttpChatApi;

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `POST /chat`: send a turn, take a snapshot or poll (see [`ChatRequest`]).
    async fn chat(&self, request: &ChatRequest) -> ApiResult<ChatResponse>;

    /// `POST /conversations/recent`
    async fn recent_conversations(
        &self,
        request: &RecentConversationsRequest,
    ) -> ApiResult<Vec<ConversationSummary>>;

    /// `GET /conversation/:id`, messages plus trace and evaluation data.
    async fn conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
        cic_hash: &CicHash,
    ) -> ApiResult<FullConversationResponse>;

    /// `POST /eval/:id`, runs the evaluation or returns the cached one.
    async fn run_evaluation(&self, conversation_id: &str) -> ApiResult<EvalRunResponse>;
}
