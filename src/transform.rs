//! Backend payload → view model
//!
//! Every function here is total: missing or oddly shaped fields fall back to
//! empty lists, `0`, `"unknown"` or `pass = true` instead of failing.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::api::wire::{
    ChatResponse, ContentBlock, ConversationSummary, FullConversationResponse, RawEvalResult,
    RawRunStats, RawTrace, RawTraceMessage, WireMessage,
};
use crate::api::ChatApi;
use crate::config::CicHash;
use crate::error::ApiResult;
use crate::extract::{extract_value, Extracted};
use crate::model::{
    Conversation, EvalMeta, EvaluationData, Message, Role, ToolCall, ToolTraceEntry, TraceContent,
    TraceMessage, UNTITLED,
};

const TITLE_MAX_CHARS: usize = 60;

// ---------------------------------------------------------------------------
// Full conversation
// ---------------------------------------------------------------------------

/// Fetch a conversation with its trace and evaluation, ready for display.
pub async fn fetch_full(
    api: &dyn ChatApi,
    conversation_id: &str,
    user_id: &str,
    cic_hash: &CicHash,
) -> ApiResult<Conversation> {
    let response = api.conversation(conversation_id, user_id, cic_hash).await?;
    let conversation = transform_full_conversation(response);

    tracing::info!(
        conversation_id = %conversation.id,
        messages = conversation.messages.len(),
        has_evaluation = conversation.evaluation.is_some(),
        "Loaded full conversation"
    );
    Ok(conversation)
}

pub fn transform_full_conversation(response: FullConversationResponse) -> Conversation {
    let now = Utc::now();
    let messages = response
        .messages
        .iter()
        .enumerate()
        .filter_map(|(index, wire)| message_from_wire(wire, || format!("msg-{}", index), now))
        .collect();

    let evaluation = build_evaluation(
        response.trace.as_ref(),
        response.eval_result.as_ref(),
        response.metadata.as_ref(),
    );
    let trace = response
        .trace
        .as_ref()
        .map(|trace| transform_trace_messages(&lenient::<RawTrace>(Some(trace), "trace").messages));

    Conversation {
        messages,
        evaluation,
        trace,
        metadata: response.metadata,
        ..Conversation::new(
            response.conversation_id,
            response
                .conversation_title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
        )
    }
}

/// Convert one backend message, or `None` when it has neither body text nor
/// a place list (loading-only or empty).
fn message_from_wire(
    wire: &WireMessage,
    fallback_id: impl FnOnce() -> String,
    default_timestamp: DateTime<Utc>,
) -> Option<Message> {
    let extracted = if wire.ui_components.is_null() {
        let content = wire
            .content
            .as_deref()
            .or(wire.message.as_deref())
            .or(wire.text.as_deref())
            .unwrap_or_default()
            .to_string();
        Extracted {
            has_body: !content.trim().is_empty(),
            content,
            ..Extracted::default()
        }
    } else {
        extract_value(&wire.ui_components)
    };

    // status text alone is a leftover loading indicator
    if !extracted.has_body && extracted.place_list.is_none() {
        return None;
    }

    let timestamp = wire
        .timestamp
        .as_ref()
        .and_then(parse_timestamp)
        .or_else(|| wire.created_at.as_ref().and_then(parse_timestamp))
        .unwrap_or(default_timestamp);

    Some(Message {
        id: wire
            .backend_id()
            .map(str::to_string)
            .unwrap_or_else(fallback_id),
        role: Role::from_wire(&wire.role),
        content: extracted.content,
        timestamp,
        is_status_message: false,
        place_list: extracted.place_list,
        quick_responses: extracted.quick_responses,
    })
}

/// RFC 3339 text or epoch milliseconds (as a number or a numeric string)
fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(text) => parse_timestamp_str(text),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            raw.trim()
                .parse::<i64>()
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
        })
}

/// Decode `value` into `T`, falling back to `T::default()` on absence or
/// shape mismatch.
fn lenient<T: DeserializeOwned + Default>(value: Option<&Value>, what: &str) -> T {
    match value {
        None | Some(Value::Null) => T::default(),
        Some(value) => T::deserialize(value).unwrap_or_else(|e| {
            tracing::debug!(payload = what, error = %e, "Ignoring malformed payload");
            T::default()
        }),
    }
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

fn content_blocks(content: &Value) -> Option<Vec<ContentBlock>> {
    let items = content.as_array()?;
    Some(
        items
            .iter()
            .map(|item| ContentBlock::deserialize(item).unwrap_or(ContentBlock::Other))
            .collect(),
    )
}

/// Shape raw trace messages for the trace view: the first text block becomes
/// the content and tool-use blocks become `tool_calls`.
pub fn transform_trace_messages(messages: &[RawTraceMessage]) -> Vec<TraceMessage> {
    messages
        .iter()
        .map(|raw| {
            let mut tool_calls = Vec::new();
            let content = match (&raw.content, content_blocks(&raw.content)) {
                (Value::String(text), _) => TraceContent::Text(text.clone()),
                (original, Some(blocks)) => {
                    let mut first_text = None;
                    for block in blocks {
                        match block {
                            ContentBlock::Text { text } if first_text.is_none() => {
                                first_text = Some(text)
                            }
                            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                                id,
                                name,
                                arguments: input,
                            }),
                            _ => {}
                        }
                    }
                    match first_text {
                        Some(text) => TraceContent::Text(text),
                        None => TraceContent::Structured(original.clone()),
                    }
                }
                (other, None) => TraceContent::Structured(other.clone()),
            };

            TraceMessage {
                role: raw.role.clone(),
                content,
                name: raw.name.clone().filter(|n| !n.is_empty()),
                tool_calls,
                tool_call_id: raw.tool_call_id.clone(),
            }
        })
        .collect()
}

/// Rebuild the flat tool-call list from trace messages.
///
/// Each tool-result block (in a `user` message) is paired with the pending
/// call whose id equals its `tool_use_id`; results without a usable id go to
/// the first call still waiting for a result.
pub fn extract_tool_trace(messages: &[RawTraceMessage]) -> Vec<ToolTraceEntry> {
    let mut trace: Vec<ToolTraceEntry> = Vec::new();

    for message in messages {
        let Some(blocks) = content_blocks(&message.content) else {
            continue;
        };

        for block in &blocks {
            if let ContentBlock::ToolUse { id, name, input } = block {
                trace.push(ToolTraceEntry {
                    call_id: id.clone(),
                    tool_name: name.clone(),
                    arguments: input.clone(),
                    result: None,
                    execution_time_ms: 0,
                });
            }
        }

        if message.role != "user" {
            continue;
        }

        for block in blocks {
            let ContentBlock::ToolResult {
                tool_use_id,
                content,
            } = block
            else {
                continue;
            };

            let pending = |entry: &ToolTraceEntry| entry.result.is_none();
            let by_id = tool_use_id.as_deref().and_then(|wanted| {
                trace
                    .iter()
                    .position(|e| pending(e) && e.call_id.as_deref() == Some(wanted))
            });

            match by_id.or_else(|| trace.iter().position(pending)) {
                Some(index) => trace[index].result = Some(parse_tool_result(content)),
                None => {
                    tracing::debug!(tool_use_id = ?tool_use_id, "Tool result without a pending call")
                }
            }
        }
    }

    trace
}

/// String results are usually JSON documents; keep the raw text when not.
fn parse_tool_result(content: Value) -> Value {
    match content {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// First strictly positive value. Zero counts as absent.
fn first_positive(candidates: &[Option<f64>]) -> u64 {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|v| *v > 0.0)
        .map(|v| v.round() as u64)
        .unwrap_or(0)
}

fn first_model<'a>(candidates: &[Option<&'a str>]) -> &'a str {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|m| !m.is_empty())
        .unwrap_or("unknown")
}

impl From<&RawRunStats> for EvalMeta {
    fn from(stats: &RawRunStats) -> Self {
        Self {
            tokens_in: first_positive(&[stats.tokens_in]),
            tokens_out: first_positive(&[stats.tokens_out]),
            latency_ms: first_positive(&[stats.latency_ms]),
            model: first_model(&[stats.model.as_deref()]).to_string(),
        }
    }
}

/// Build evaluation data from a conversation payload.
///
/// `None` when none of the three sources is present. Per field, `metadata`
/// beats `evalResult`, which beats `evalResult.meta`.
pub fn build_evaluation(
    trace: Option<&Value>,
    eval_result: Option<&Value>,
    metadata: Option<&Value>,
) -> Option<EvaluationData> {
    if trace.is_none() && eval_result.is_none() && metadata.is_none() {
        return None;
    }

    let raw_trace: RawTrace = lenient(trace, "trace");
    let eval: RawEvalResult = lenient(eval_result, "evalResult");
    let stats: RawRunStats = lenient(metadata, "metadata");
    let eval_meta = eval.meta.clone().unwrap_or_default();

    let latency_ms = first_positive(&[stats.latency_ms, eval.latency_ms, eval_meta.latency_ms]);

    Some(EvaluationData {
        pass: eval.pass.unwrap_or(true),
        latency_ms,
        validation_results: eval.validation_results.unwrap_or_default(),
        judge_results: eval.judge_results.unwrap_or_default(),
        tool_trace: extract_tool_trace(&raw_trace.messages),
        full_messages: transform_trace_messages(&raw_trace.messages),
        meta: EvalMeta {
            tokens_in: first_positive(&[stats.tokens_in, eval_meta.tokens_in]),
            tokens_out: first_positive(&[stats.tokens_out, eval_meta.tokens_out]),
            latency_ms,
            model: first_model(&[stats.model.as_deref(), eval_meta.model.as_deref()]).to_string(),
        },
    })
}

/// Apply a fresh `evalResult` onto previously held evaluation data.
///
/// Judge and validation lists are replaced. Tool trace and meta are kept
/// when the new result has none; full messages always come from `previous`.
pub fn apply_eval_result(previous: Option<&EvaluationData>, eval_result: &Value) -> EvaluationData {
    let raw: RawEvalResult = lenient(Some(eval_result), "evalResult");
    let latency_ms = raw
        .latency_ms
        .map(|ms| first_positive(&[Some(ms)]))
        .or(previous.map(|p| p.latency_ms))
        .unwrap_or(0);

    let meta = match (&raw.meta, previous) {
        (Some(stats), _) => EvalMeta::from(stats),
        (None, Some(previous)) => previous.meta.clone(),
        (None, None) => EvalMeta {
            latency_ms,
            ..EvalMeta::default()
        },
    };

    EvaluationData {
        pass: raw
            .pass
            .or(previous.map(|p| p.pass))
            .unwrap_or(true),
        latency_ms,
        validation_results: raw.validation_results.unwrap_or_default(),
        judge_results: raw.judge_results.unwrap_or_default(),
        tool_trace: raw
            .tool_trace
            .or_else(|| previous.map(|p| p.tool_trace.clone()))
            .unwrap_or_default(),
        full_messages: previous.map(|p| p.full_messages.clone()).unwrap_or_default(),
        meta,
    }
}

/// Fold the trace/evaluation parts of a poll tick into a loaded conversation.
/// Returns `true` if anything changed.
pub fn apply_poll_update(conversation: &mut Conversation, response: &ChatResponse) -> bool {
    if !response.carries_evaluation() {
        return false;
    }

    if let Some(trace) = response.trace.as_ref() {
        let raw: RawTrace = lenient(Some(trace), "trace");
        conversation.trace = Some(transform_trace_messages(&raw.messages));
    }
    if let Some(eval_result) = response.eval_result.as_ref() {
        conversation.evaluation = Some(apply_eval_result(conversation.evaluation.as_ref(), eval_result));
    }
    if let Some(metadata) = response.metadata.as_ref() {
        conversation.metadata = Some(metadata.clone());
    }
    true
}

// ---------------------------------------------------------------------------
// /chat response → conversation
// ---------------------------------------------------------------------------

/// `conv-<millis>-<7 hex chars>`
pub fn generate_conversation_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("conv-{}-{}", Utc::now().timestamp_millis(), &suffix[..7])
}

/// Trimmed message, cut to 60 characters plus `...` when longer.
pub fn generate_title(message: &str) -> String {
    let cleaned = message.trim();
    if cleaned.chars().count() <= TITLE_MAX_CHARS {
        return cleaned.to_string();
    }
    let cut: String = cleaned.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}...", cut)
}

pub fn extract_tags(response: &ChatResponse, messages: &[Message]) -> Vec<String> {
    let mut tags: Vec<String> = response
        .extra
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let top_level_suggestions = response
        .extra
        .get("quickResponses")
        .and_then(Value::as_array)
        .is_some_and(|list| !list.is_empty());
    let message_suggestions = messages.iter().any(|m| m.quick_responses.is_some());

    if top_level_suggestions || message_suggestions {
        tags.push("has-suggestions".to_string());
    }
    tags
}

/// Build a conversation from a `/chat` response and the user text that
/// produced it.
pub fn conversation_from_chat(response: &ChatResponse, user_message: &str, user_id: &str) -> Conversation {
    let conversation_id = response
        .conversation_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(generate_conversation_id);
    let date = response
        .extra
        .get("timestamp")
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    let assistant_text = response
        .extra_str("message")
        .or(response.extra_str("response"))
        .or(response.extra_str("reply"));

    let messages: Vec<Message> = if response.messages.is_empty() {
        let mut pair = Vec::new();
        if !user_message.is_empty() {
            pair.push(Message {
                id: format!("{}-user-{}", conversation_id, date.timestamp_millis()),
                ..Message::new("", Role::User, user_message).with_timestamp(date)
            });
        }
        if let Some(text) = assistant_text {
            let at = date + chrono::Duration::seconds(1);
            pair.push(Message {
                id: format!("{}-assistant-{}", conversation_id, at.timestamp_millis()),
                ..Message::new("", Role::Assistant, text).with_timestamp(at)
            });
        }
        pair
    } else {
        response
            .messages
            .iter()
            .enumerate()
            .filter_map(|(index, wire)| {
                message_from_wire(wire, || format!("{}-msg-{}", conversation_id, index), date)
            })
            .collect()
    };

    let title = if let Some(first_user) = messages.iter().find(|m| m.role == Role::User) {
        generate_title(&first_user.content)
    } else if let Some(title) = response
        .extra_str("title")
        .or(response.extra_str("conversation_title"))
    {
        title.to_string()
    } else if !user_message.is_empty() {
        generate_title(user_message)
    } else if let Some(text) = assistant_text {
        generate_title(text)
    } else {
        UNTITLED.to_string()
    };

    let tags = extract_tags(response, &messages);
    Conversation {
        date,
        messages,
        tags,
        user_id: Some(user_id.to_string()).filter(|id| !id.is_empty()),
        ..Conversation::new(conversation_id, title)
    }
}

/// Engagement score in `1..=5`: base 3, +1 for more than four messages,
/// +1 for a note.
pub fn score_conversation(conversation: &Conversation) -> u8 {
    let mut score = 3u8;
    if conversation.messages.len() > 4 {
        score += 1;
    }
    if !conversation.note.is_empty() {
        score += 1;
    }
    score.min(5)
}

/// Placeholder conversation for a recent-list row; messages load on select.
pub fn conversation_from_summary(summary: &ConversationSummary) -> Conversation {
    let created_at = summary.created_at.as_deref().and_then(parse_timestamp_str);
    let title = if summary.conversation_title.is_empty() {
        UNTITLED.to_string()
    } else {
        summary.conversation_title.clone()
    };

    Conversation {
        date: created_at.unwrap_or_else(Utc::now),
        created_at,
        user_id: Some(summary.user_id.clone()).filter(|id| !id.is_empty()),
        message_count: summary.message_count,
        ..Conversation::new(summary.conversation_id.clone(), title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_messages(value: Value) -> Vec<RawTraceMessage> {
        serde_json::from_value::<RawTrace>(json!({ "messages": value }))
            .unwrap()
            .messages
    }

    #[test]
    fn test_trace_messages_promote_text_and_tool_calls() {
        let messages = raw_messages(json!([
            {"role": "system", "content": "be helpful"},
            {"role": "assistant", "content": [
                {"type": "text", "text": "Let me look"},
                {"type": "tool_use", "id": "t1", "name": "search", "input": {"q": "tacos"}}
            ]},
            {"role": "assistant", "name": "planner", "content": [
                {"type": "tool_use", "id": "t2", "name": "rank", "input": {}}
            ]}
        ]));

        let out = transform_trace_messages(&messages);
        assert_eq!(out[0].content, TraceContent::Text("be helpful".into()));
        assert_eq!(out[1].content.as_text(), Some("Let me look"));
        assert_eq!(out[1].tool_calls.len(), 1);
        assert_eq!(out[1].tool_calls[0].id.as_deref(), Some("t1"));
        assert_eq!(out[1].tool_calls[0].arguments, json!({"q": "tacos"}));
        assert!(matches!(out[2].content, TraceContent::Structured(Value::Array(_))));
        assert_eq!(out[2].name.as_deref(), Some("planner"));
    }

    #[test]
    fn test_tool_trace_correlates_by_id() {
        let messages = raw_messages(json!([
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "a", "name": "search", "input": {"q": 1}},
                {"type": "tool_use", "id": "b", "name": "weather", "input": {}}
            ]},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "b", "content": "{\"temp\": 20}"},
                {"type": "tool_result", "tool_use_id": "a", "content": "not json"}
            ]}
        ]));

        let trace = extract_tool_trace(&messages);
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].tool_name, "search");
        assert_eq!(trace[0].result, Some(json!("not json")));
        assert_eq!(trace[1].result, Some(json!({"temp": 20})));
    }

    #[test]
    fn test_tool_trace_falls_back_to_first_pending() {
        let messages = raw_messages(json!([
            {"role": "assistant", "content": [
                {"type": "tool_use", "name": "search", "input": {}},
                {"type": "tool_use", "name": "rank", "input": {}}
            ]},
            {"role": "user", "content": [{"type": "tool_result", "content": [1, 2]}]},
            {"role": "assistant", "content": [{"type": "tool_result", "content": "ignored"}]}
        ]));

        let trace = extract_tool_trace(&messages);
        assert_eq!(trace[0].result, Some(json!([1, 2])));
        assert_eq!(trace[1].result, None);
    }

    #[test]
    fn test_evaluation_priority_per_field() {
        let eval = build_evaluation(
            None,
            Some(&json!({
                "pass": false,
                "latencyMs": 900,
                "meta": {"tokensIn": 10, "tokensOut": 20, "latencyMs": 500, "model": "m-eval"}
            })),
            Some(&json!({"tokensIn": 1, "tokensOut": 0, "model": ""})),
        )
        .unwrap();

        assert!(!eval.pass);
        assert_eq!(eval.latency_ms, 900);
        assert_eq!(eval.meta.tokens_in, 1);
        // zero in metadata counts as absent
        assert_eq!(eval.meta.tokens_out, 20);
        assert_eq!(eval.meta.latency_ms, 900);
        assert_eq!(eval.meta.model, "m-eval");
    }

    #[test]
    fn test_evaluation_defaults() {
        assert!(build_evaluation(None, None, None).is_none());

        let eval = build_evaluation(Some(&json!({"messages": []})), None, None).unwrap();
        assert!(eval.pass);
        assert_eq!(eval.latency_ms, 0);
        assert_eq!(eval.meta, EvalMeta::default());
        assert_eq!(eval.meta.model, "unknown");

        let eval = build_evaluation(None, Some(&json!("garbage")), None).unwrap();
        assert!(eval.pass);
    }

    #[test]
    fn test_full_conversation_drops_loading_only_messages() {
        let response: FullConversationResponse = serde_json::from_value(json!({
            "conversation_id": "c1",
            "conversation_title": "",
            "messages": [
                {"role": "USER", "message_id": "u1", "ui_components": [
                    {"body": {"component": {"mutableContent": "tacos near me"}}}
                ]},
                {"role": "ASSISTANT", "message_id": "s1", "ui_components": [
                    {"loading": {"component": {"mutableStatusTextsList": ["Loading: Searching"]}}}
                ]},
                {"role": "ASSISTANT", "ui_components": [
                    {"placeList": {"component": {"mutablePlacesList": [{"placeId": "p1"}]}}}
                ]}
            ]
        }))
        .unwrap();

        let conversation = transform_full_conversation(response);
        assert_eq!(conversation.title, UNTITLED);
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[1].id, "msg-2");
        assert!(conversation.messages[1].place_list.is_some());
        assert!(conversation.evaluation.is_none());
    }

    #[test]
    fn test_full_conversation_keeps_body_with_trailing_loading() {
        let response: FullConversationResponse = serde_json::from_value(json!({
            "conversation_id": "c1",
            "messages": [
                {"role": "ASSISTANT", "message_id": "a1", "ui_components": [
                    {"body": {"component": {"mutableContent": "Here are three taco spots."}}},
                    {"loading": {"component": {"mutableStatusTextsList": ["Loading: Ranking"]}}}
                ]}
            ]
        }))
        .unwrap();

        let conversation = transform_full_conversation(response);
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].id, "a1");
        assert_eq!(conversation.messages[0].content, "Here are three taco spots.");
        assert!(!conversation.messages[0].is_status_message);
    }

    #[test]
    fn test_chat_response_keeps_body_with_trailing_loading() {
        let response: ChatResponse = serde_json::from_value(json!({
            "conversation_id": "c2",
            "messages": [
                {"role": "USER", "content": "tacos"},
                {"role": "ASSISTANT", "ui_components": [
                    {"loading": {"component": {"mutableStatusTextsList": ["Loading: Searching"]}}},
                    {"body": {"component": {"mutableContent": "Found some."}}}
                ]},
                {"role": "ASSISTANT", "ui_components": [
                    {"loading": {"component": {"mutableStatusTextsList": ["Loading: Ranking"]}}}
                ]}
            ]
        }))
        .unwrap();

        let conversation = conversation_from_chat(&response, "tacos", "42");
        let contents: Vec<&str> = conversation.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["tacos", "Found some."]);
    }

    #[test]
    fn test_message_timestamps_from_epoch_millis_and_text() {
        let response: FullConversationResponse = serde_json::from_value(json!({
            "conversation_id": "c1",
            "messages": [
                {"role": "USER", "content": "hi", "created_at": 1700000000000i64},
                {"role": "ASSISTANT", "content": "hello", "timestamp": "1700000005000"},
                {"role": "ASSISTANT", "content": "later", "timestamp": "2024-05-01T12:00:00Z"}
            ]
        }))
        .unwrap();

        let conversation = transform_full_conversation(response);
        let millis: Vec<i64> = conversation
            .messages
            .iter()
            .map(|m| m.timestamp.timestamp_millis())
            .collect();
        assert_eq!(millis[0], 1_700_000_000_000);
        assert_eq!(millis[1], 1_700_000_005_000);
        assert_eq!(conversation.messages[2].timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");

        assert!(parse_timestamp(&json!(true)).is_none());
        assert!(parse_timestamp(&json!("yesterday")).is_none());
    }

    #[test]
    fn test_apply_eval_result_keeps_previous_parts() {
        let mut previous = build_evaluation(
            Some(&json!({"messages": [
                {"role": "assistant", "content": [{"type": "tool_use", "id": "a", "name": "search", "input": {}}]}
            ]})),
            None,
            Some(&json!({"model": "m1", "tokensIn": 5})),
        )
        .unwrap();
        previous.pass = false;

        let applied = apply_eval_result(
            Some(&previous),
            &json!({"judgeResults": [{"judgeId": "tone", "score": 0.8, "rationale": "ok", "pass": true}]}),
        );

        assert!(!applied.pass);
        assert_eq!(applied.judge_results.len(), 1);
        assert_eq!(applied.tool_trace.len(), 1);
        assert_eq!(applied.full_messages.len(), 1);
        assert_eq!(applied.meta.model, "m1");

        let fresh = apply_eval_result(None, &json!({"pass": true, "latencyMs": 42}));
        assert_eq!(fresh.meta.latency_ms, 42);
        assert_eq!(fresh.meta.model, "unknown");
    }

    #[test]
    fn test_apply_poll_update_only_touches_present_parts() {
        let mut conversation = Conversation::new("c1", "x");
        let plain = ChatResponse::default();
        assert!(!apply_poll_update(&mut conversation, &plain));

        let tick: ChatResponse = serde_json::from_value(json!({
            "trace": {"messages": [{"role": "user", "content": "hi"}]},
            "evalResult": {"pass": true}
        }))
        .unwrap();
        assert!(apply_poll_update(&mut conversation, &tick));
        assert_eq!(conversation.trace.as_ref().unwrap().len(), 1);
        assert!(conversation.evaluation.as_ref().unwrap().pass);
        assert!(conversation.metadata.is_none());
    }

    #[test]
    fn test_conversation_from_chat_messages() {
        let response: ChatResponse = serde_json::from_value(json!({
            "conversation_id": "c7",
            "tags": ["dinner"],
            "messages": [
                {"role": "USER", "content": "   Where should we eat tonight in the West Village with a group of eight people?  "},
                {"role": "ASSISTANT", "ui_components": [
                    {"body": {"component": {"mutableContent": "Try these"}}},
                    {"quickResponses": {"component": {"quickResponsesList": [{"displayText": "More", "messageText": "more"}]}}}
                ]},
                {"role": "ASSISTANT", "content": ""}
            ]
        }))
        .unwrap();

        let conversation = conversation_from_chat(&response, "ignored", "42");
        assert_eq!(conversation.id, "c7");
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].id, "c7-msg-0");
        assert_eq!(
            conversation.title,
            "Where should we eat tonight in the West Village with a group..."
        );
        assert_eq!(conversation.tags, vec!["dinner", "has-suggestions"]);
        assert_eq!(conversation.user_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_conversation_from_chat_single_pair() {
        let response: ChatResponse =
            serde_json::from_value(json!({"message": "Here you go", "title": "Lunch"})).unwrap();

        let conversation = conversation_from_chat(&response, "lunch?", "42");
        assert!(conversation.id.starts_with("conv-"));
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[1].content, "Here you go");
        assert!(conversation.messages[0].timestamp < conversation.messages[1].timestamp);
        assert_eq!(conversation.title, "lunch?");

        let untitled = conversation_from_chat(&ChatResponse::default(), "", "");
        assert_eq!(untitled.title, UNTITLED);
        assert!(untitled.messages.is_empty());
    }

    #[test]
    fn test_generated_ids_have_expected_shape() {
        let id = generate_conversation_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "conv");
        assert_eq!(parts[2].len(), 7);
    }

    #[test]
    fn test_score_is_capped() {
        let mut conversation = Conversation::new("c", "t");
        assert_eq!(score_conversation(&conversation), 3);
        conversation.messages = (0..5)
            .map(|i| Message::new(format!("m{}", i), Role::User, "x"))
            .collect();
        conversation.note = "worth a look".into();
        assert_eq!(score_conversation(&conversation), 5);
    }

    #[test]
    fn test_summary_conversion() {
        let summary = ConversationSummary {
            conversation_id: "c1".into(),
            conversation_title: String::new(),
            user_id: "7".into(),
            created_at: Some("2024-05-01T12:00:00Z".into()),
            message_count: Some(6),
        };
        let conversation = conversation_from_summary(&summary);
        assert_eq!(conversation.title, UNTITLED);
        assert_eq!(conversation.date.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(conversation.message_count, Some(6));
        assert!(!conversation.is_loaded());
    }
}
