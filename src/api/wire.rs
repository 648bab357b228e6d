//! Request and response bodies of the conversation backend
//!
//! Field names follow the backend exactly (snake_case envelopes, camelCase
//! evaluation payloads). Sub-trees whose shape varies between backend
//! versions (`trace`, `evalResult`, `metadata`, `ui_components`) are kept as
//! raw JSON here and decoded leniently by the transform layer.

use crate::config::{stringify_cic_hash, ApiConfig, ChatConfig, CicHash, UserLocation, UsernameHash};
use crate::model::{JudgeResult, ToolTraceEntry, ValidationResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// POST /chat
// ---------------------------------------------------------------------------

/// Body of `POST /chat`.
///
/// The presence of a non-empty `message` starts or continues a turn. A
/// request without `message` (see [`ChatRequest::refresh`]) asks for the
/// current state of an existing conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Stringified JSON object
    pub cic_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_hash: Option<UsernameHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_conversation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_location: Option<UserLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    /// A new user turn
    pub fn send(config: &ChatConfig, message: &str, conversation_id: Option<&str>) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::with_context(config, conversation_id)
        }
    }

    /// Snapshot of a conversation with the full context and an empty message
    pub fn snapshot(config: &ChatConfig, conversation_id: Option<&str>) -> Self {
        Self {
            message: Some(String::new()),
            ..Self::with_context(config, conversation_id)
        }
    }

    /// Poll request: user, conversation and CIC hash only
    pub fn refresh(user_id: &str, conversation_id: &str, cic_hash: &CicHash) -> Self {
        Self {
            user_id: user_id.to_string(),
            message: None,
            cic_hash: stringify_cic_hash(cic_hash),
            username_hash: None,
            refresh_conversation: None,
            grpc_port: None,
            user_location: None,
            conversation_id: Some(conversation_id.to_string()),
        }
    }

    /// Connectivity probe built from the configured defaults
    pub fn probe(api: &ApiConfig) -> Self {
        Self::snapshot(&ChatConfig::from_api_config(api), None)
    }

    fn with_context(config: &ChatConfig, conversation_id: Option<&str>) -> Self {
        Self {
            user_id: config.user_id.clone(),
            message: None,
            cic_hash: config.cic_hash_json(),
            username_hash: Some(config.username_hash.clone()),
            refresh_conversation: Some(true),
            grpc_port: Some(config.grpc_port),
            user_location: Some(config.user_location),
            conversation_id: conversation_id
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        }
    }

    pub fn is_poll(&self) -> bool {
        self.message.is_none()
    }
}

/// One message of a `/chat` or `/conversation` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub ui_components: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// RFC 3339 string or epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
}

impl WireMessage {
    pub fn is_assistant(&self) -> bool {
        self.role == "ASSISTANT"
    }

    /// Backend id, preferring `message_id`
    pub fn backend_id(&self) -> Option<&str> {
        self.message_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// Response of `POST /chat`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default, alias = "conversationId", skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<WireMessage>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub is_terminal_response: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,
    #[serde(rename = "evalResult", default, skip_serializing_if = "Option::is_none")]
    pub eval_result: Option<Value>,
    /// Anything else the backend sent (title, timestamp, tags, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ChatResponse {
    /// The backend has finished producing output for the current turn.
    pub fn is_terminal(&self) -> bool {
        is_truthy(&self.is_terminal_response)
            || matches!(self.state.as_deref(), Some("COMPLETE") | Some("ERROR"))
    }

    pub fn last_assistant_message(&self) -> Option<&WireMessage> {
        self.messages.iter().rev().find(|m| m.is_assistant())
    }

    pub fn carries_evaluation(&self) -> bool {
        self.metadata.is_some() || self.trace.is_some() || self.eval_result.is_some()
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

/// `null` decodes like an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// JavaScript-style truthiness of a JSON value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ---------------------------------------------------------------------------
// POST /conversations/recent
// ---------------------------------------------------------------------------

pub const DEFAULT_RECENT_LIMIT: u32 = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentConversationsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_port: Option<u16>,
}

impl RecentConversationsRequest {
    /// First page for `user_id`, with empty filters dropped
    pub fn first_page(
        user_id: &str,
        grpc_port: u16,
        for_user_id: Option<&str>,
        conversation_id: Option<&str>,
    ) -> Self {
        let non_empty = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            user_id: Some(user_id.to_string()),
            for_user_id: non_empty(for_user_id),
            conversation_id: non_empty(conversation_id),
            limit: Some(DEFAULT_RECENT_LIMIT),
            offset: Some(0),
            grpc_port: Some(grpc_port),
        }
    }
}

/// One row of the recent-conversations list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conversation_title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentConversationsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub conversations: Vec<ConversationSummary>,
}

// ---------------------------------------------------------------------------
// GET /conversation/:id
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullConversationResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<WireMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,
    #[serde(rename = "evalResult", default, skip_serializing_if = "Option::is_none")]
    pub eval_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

// ---------------------------------------------------------------------------
// POST /eval/:id
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalRunResponse {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub eval_result: Value,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_age: Option<u64>,
}

// ---------------------------------------------------------------------------
// Loosely-shaped payloads
// ---------------------------------------------------------------------------

/// `trace` object of a conversation payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTrace {
    #[serde(default)]
    pub messages: Vec<RawTraceMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTraceMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

/// Typed content block inside an array-valued trace message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: Value,
    },
    #[serde(other)]
    Other,
}

/// Token/latency/model fields; shared by `metadata` and `evalResult.meta`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRunStats {
    #[serde(default)]
    pub tokens_in: Option<f64>,
    #[serde(default)]
    pub tokens_out: Option<f64>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub model: Option<String>,
}

/// `evalResult` object; every field may be absent
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvalResult {
    #[serde(default)]
    pub pass: Option<bool>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub validation_results: Option<Vec<ValidationResult>>,
    #[serde(default)]
    pub judge_results: Option<Vec<JudgeResult>>,
    #[serde(default)]
    pub tool_trace: Option<Vec<ToolTraceEntry>>,
    #[serde(default)]
    pub meta: Option<RawRunStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_refresh_request_has_no_message_field() {
        let cic: CicHash = [("1804860".to_string(), 0)].into_iter().collect();
        let req = ChatRequest::refresh("42", "conv-1", &cic);
        let body = serde_json::to_value(&req).unwrap();

        assert!(req.is_poll());
        assert!(body.get("message").is_none());
        assert_eq!(body["conversation_id"], "conv-1");
        assert_eq!(body["cic_hash"], "{\"1804860\":0}");
        assert_eq!(body.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_send_request_carries_full_context() {
        let config = ChatConfig::default();
        let body = serde_json::to_value(ChatRequest::send(&config, "tacos?", None)).unwrap();

        assert_eq!(body["message"], "tacos?");
        assert_eq!(body["refresh_conversation"], true);
        assert_eq!(body["grpc_port"], 50051);
        assert_eq!(body["user_location"]["latitude"], 40.7128);
        assert!(body.get("conversation_id").is_none());
        assert!(body["cic_hash"].is_string());
    }

    #[test]
    fn test_terminal_detection() {
        let parse = |v: Value| serde_json::from_value::<ChatResponse>(v).unwrap();

        assert!(parse(json!({"is_terminal_response": true})).is_terminal());
        assert!(parse(json!({"state": "COMPLETE"})).is_terminal());
        assert!(parse(json!({"state": "ERROR"})).is_terminal());
        assert!(!parse(json!({"state": "RUNNING"})).is_terminal());
        assert!(!parse(json!({"is_terminal_response": false})).is_terminal());
        assert!(!parse(json!({})).is_terminal());
    }

    #[test]
    fn test_chat_response_accepts_camel_case_id_and_keeps_extra() {
        let resp: ChatResponse = serde_json::from_value(json!({
            "conversationId": "c-9",
            "title": "Dinner",
            "messages": [{"role": "USER"}, {"role": "ASSISTANT", "message_id": "m2"}]
        }))
        .unwrap();

        assert_eq!(resp.conversation_id.as_deref(), Some("c-9"));
        assert_eq!(resp.extra_str("title"), Some("Dinner"));
        assert_eq!(resp.last_assistant_message().unwrap().backend_id(), Some("m2"));
    }

    #[test]
    fn test_null_messages_and_role_decode_as_empty() {
        let resp: ChatResponse = serde_json::from_value(json!({
            "conversation_id": "c-1",
            "messages": null,
            "state": "RUNNING"
        }))
        .unwrap();
        assert!(resp.messages.is_empty());
        assert!(!resp.is_terminal());

        let full: FullConversationResponse = serde_json::from_value(json!({
            "conversation_id": null,
            "messages": [{"role": null, "message_id": "m1"}]
        }))
        .unwrap();
        assert_eq!(full.conversation_id, "");
        assert_eq!(full.messages[0].role, "");
        assert!(!full.messages[0].is_assistant());

        let empty: FullConversationResponse =
            serde_json::from_value(json!({"conversation_id": "c-2", "messages": null})).unwrap();
        assert!(empty.messages.is_empty());

        let recent: RecentConversationsResponse =
            serde_json::from_value(json!({"conversations": null})).unwrap();
        assert!(recent.conversations.is_empty());
    }

    #[test]
    fn test_message_timestamps_accept_numbers_and_strings() {
        let resp: ChatResponse = serde_json::from_value(json!({
            "messages": [
                {"role": "USER", "created_at": 1700000000000u64},
                {"role": "ASSISTANT", "timestamp": "2024-05-01T12:00:00Z", "created_at": null}
            ]
        }))
        .unwrap();

        assert_eq!(resp.messages[0].created_at, Some(json!(1700000000000u64)));
        assert_eq!(resp.messages[1].timestamp, Some(json!("2024-05-01T12:00:00Z")));
        assert_eq!(resp.messages[1].created_at, None);
    }

    #[test]
    fn test_content_block_other_types() {
        let block: ContentBlock = serde_json::from_value(json!({"type": "image", "url": "x"})).unwrap();
        assert_eq!(block, ContentBlock::Other);
    }

    #[test]
    fn test_recent_request_drops_blank_filters() {
        let req = RecentConversationsRequest::first_page("7", 50051, Some("  "), Some("c1"));
        assert_eq!(req.for_user_id, None);
        assert_eq!(req.conversation_id.as_deref(), Some("c1"));
        assert_eq!(req.limit, Some(50));
        assert_eq!(req.offset, Some(0));
    }
}
