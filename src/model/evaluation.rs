//! Evaluation and execution-trace view model

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one named validation check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pass: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Automated quality score with rationale
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeResult {
    #[serde(default)]
    pub judge_id: String,
    /// 0.0 - 1.0
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub pass: bool,
    #[serde(default)]
    pub cached: bool,
}

/// One tool invocation reconstructed from the trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolTraceEntry {
    /// Id of the tool-use block, when the trace carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    /// `None` until a tool-result block has been paired with this call
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub execution_time_ms: u64,
}

/// Tool call promoted out of a trace message's content blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Trace message content: plain text or the raw structured payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceContent {
    Text(String),
    Structured(Value),
}

impl TraceContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TraceContent::Text(text) => Some(text),
            TraceContent::Structured(_) => None,
        }
    }
}

/// One raw model/tool message as shown in the trace tab.
///
/// `role` is kept as the backend sent it (`system`, `user`, `assistant`,
/// `tool`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMessage {
    pub role: String,
    pub content: TraceContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Token counts, latency and model name of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalMeta {
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default = "unknown_model")]
    pub model: String,
}

fn unknown_model() -> String {
    "unknown".to_string()
}

impl Default for EvalMeta {
    fn default() -> Self {
        Self {
            tokens_in: 0,
            tokens_out: 0,
            latency_ms: 0,
            model: unknown_model(),
        }
    }
}

impl EvalMeta {
    pub fn total_tokens(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }
}

/// Evaluation state of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationData {
    pub pass: bool,
    pub latency_ms: u64,
    #[serde(default)]
    pub validation_results: Vec<ValidationResult>,
    #[serde(default)]
    pub judge_results: Vec<JudgeResult>,
    #[serde(default)]
    pub tool_trace: Vec<ToolTraceEntry>,
    #[serde(default)]
    pub full_messages: Vec<TraceMessage>,
    #[serde(default)]
    pub meta: EvalMeta,
}

impl Default for EvaluationData {
    fn default() -> Self {
        Self {
            pass: true,
            latency_ms: 0,
            validation_results: Vec::new(),
            judge_results: Vec::new(),
            tool_trace: Vec::new(),
            full_messages: Vec::new(),
            meta: EvalMeta::default(),
        }
    }
}

impl EvaluationData {
    pub fn failed_validations(&self) -> impl Iterator<Item = &ValidationResult> {
        self.validation_results.iter().filter(|v| !v.pass)
    }

    pub fn failed_judges(&self) -> impl Iterator<Item = &JudgeResult> {
        self.judge_results.iter().filter(|j| !j.pass)
    }
}
