//! Shared fixtures for integration tests: a scripted in-memory backend and
//! a recording poll handler.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use pcs_review::api::wire::{
    ChatRequest, ChatResponse, ConversationSummary, EvalRunResponse, FullConversationResponse,
    RecentConversationsRequest,
};
use pcs_review::config::CicHash;
use pcs_review::{ApiError, ApiResult, ChatApi, PollHandler};

/// One scripted `/chat` answer
pub struct Step {
    pub delay: Duration,
    pub result: Result<ChatResponse, String>,
}

impl Step {
    pub fn ok(response: ChatResponse) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(response),
        }
    }

    pub fn fail(message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(message.to_string()),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// In-memory backend. Sends (requests with a message) and polls (without)
/// are answered from separate scripts; an exhausted poll script answers
/// with an empty, non-terminal response.
#[derive(Default)]
pub struct ScriptedApi {
    sends: Mutex<VecDeque<Step>>,
    polls: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<(Instant, ChatRequest)>>,
    conversations: Mutex<HashMap<String, FullConversationResponse>>,
    conversation_fetches: Mutex<Vec<String>>,
    recent: Mutex<Vec<ConversationSummary>>,
    recent_requests: Mutex<Vec<RecentConversationsRequest>>,
    evaluations: Mutex<HashMap<String, EvalRunResponse>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_send(self, step: Step) -> Self {
        self.sends.lock().unwrap().push_back(step);
        self
    }

    pub fn on_poll(self, step: Step) -> Self {
        self.polls.lock().unwrap().push_back(step);
        self
    }

    pub fn with_conversation(self, response: FullConversationResponse) -> Self {
        self.conversations
            .lock()
            .unwrap()
            .insert(response.conversation_id.clone(), response);
        self
    }

    pub fn with_recent(self, summaries: Vec<ConversationSummary>) -> Self {
        *self.recent.lock().unwrap() = summaries;
        self
    }

    pub fn with_evaluation(self, conversation_id: &str, eval_result: Value) -> Self {
        self.evaluations.lock().unwrap().insert(
            conversation_id.to_string(),
            EvalRunResponse {
                conversation_id: conversation_id.to_string(),
                eval_result,
                cached: false,
                cache_age: None,
            },
        );
        self
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn poll_requests(&self) -> Vec<(Instant, ChatRequest)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| r.is_poll())
            .cloned()
            .collect()
    }

    pub fn conversation_fetches(&self) -> Vec<String> {
        self.conversation_fetches.lock().unwrap().clone()
    }

    pub fn recent_requests(&self) -> Vec<RecentConversationsRequest> {
        self.recent_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatApi for ScriptedApi {
    async fn chat(&self, request: &ChatRequest) -> ApiResult<ChatResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));

        let step = if request.is_poll() {
            self.polls.lock().unwrap().pop_front()
        } else {
            self.sends.lock().unwrap().pop_front()
        };
        let Some(step) = step else {
            return Ok(ChatResponse::default());
        };

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.result.map_err(ApiError::Client)
    }

    async fn recent_conversations(
        &self,
        request: &RecentConversationsRequest,
    ) -> ApiResult<Vec<ConversationSummary>> {
        self.recent_requests.lock().unwrap().push(request.clone());
        Ok(self.recent.lock().unwrap().clone())
    }

    async fn conversation(
        &self,
        conversation_id: &str,
        _user_id: &str,
        _cic_hash: &CicHash,
    ) -> ApiResult<FullConversationResponse> {
        self.conversation_fetches
            .lock()
            .unwrap()
            .push(conversation_id.to_string());
        self.conversations
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| ApiError::Client(format!("no conversation {}", conversation_id)))
    }

    async fn run_evaluation(&self, conversation_id: &str) -> ApiResult<EvalRunResponse> {
        self.evaluations
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| ApiError::Client(format!("no evaluation for {}", conversation_id)))
    }
}

/// Records every callback
#[derive(Default)]
pub struct RecordingHandler {
    pub updates: Mutex<Vec<ChatResponse>>,
    pub completions: Mutex<Vec<ChatResponse>>,
}

impl RecordingHandler {
    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn completion_count(&self) -> usize {
        self.completions.lock().unwrap().len()
    }
}

impl PollHandler for RecordingHandler {
    fn on_update(&self, response: &ChatResponse) {
        self.updates.lock().unwrap().push(response.clone());
    }

    fn on_complete(&self, response: &ChatResponse) {
        self.completions.lock().unwrap().push(response.clone());
    }
}

// ---------------------------------------------------------------------------
// Payload builders
// ---------------------------------------------------------------------------

pub fn response(value: Value) -> ChatResponse {
    serde_json::from_value(value).unwrap()
}

/// Assistant message still working: a loading component only
pub fn working(conversation_id: &str, message_id: &str, status: &str) -> ChatResponse {
    response(json!({
        "conversation_id": conversation_id,
        "state": "RUNNING",
        "messages": [
            {"role": "USER", "message_id": "u-1", "ui_components": [
                {"body": {"component": {"mutableContent": "tacos near me"}}}
            ]},
            {"role": "ASSISTANT", "message_id": message_id, "ui_components": [
                {"loading": {"component": {"mutableStatusTextsList": [format!("Loading: {}", status)]}}}
            ]}
        ]
    }))
}

/// Assistant message with real content, terminal
pub fn finished(conversation_id: &str, message_id: &str, text: &str) -> ChatResponse {
    response(json!({
        "conversation_id": conversation_id,
        "state": "COMPLETE",
        "messages": [
            {"role": "ASSISTANT", "message_id": message_id, "ui_components": [
                {"body": {"component": {"mutableContent": text}}},
                {"placeList": {"component": {
                    "mutableHeading1": "Top picks",
                    "mutablePlacesList": [{"placeId": "p1"}, {"placeId": "p2"}]
                }}}
            ]}
        ]
    }))
}

pub fn full_conversation(conversation_id: &str, title: &str) -> FullConversationResponse {
    serde_json::from_value(json!({
        "conversation_id": conversation_id,
        "conversation_title": title,
        "messages": [
            {"role": "USER", "message_id": "u-1", "ui_components": [
                {"body": {"component": {"mutableContent": "tacos near me"}}}
            ]},
            {"role": "ASSISTANT", "message_id": "a-1", "ui_components": [
                {"body": {"component": {"mutableContent": "Here are three spots"}}}
            ]}
        ],
        "trace": {"messages": [
            {"role": "assistant", "content": [
                {"type": "text", "text": "Searching"},
                {"type": "tool_use", "id": "t1", "name": "search_places", "input": {"q": "tacos"}}
            ]},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "t1", "content": "{\"count\": 3}"}
            ]}
        ]},
        "metadata": {"model": "pcs-large", "tokensIn": 1200, "tokensOut": 300, "latencyMs": 2100}
    }))
    .unwrap()
}
