//! Conversation aggregate

use super::{EvaluationData, Message, TraceMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNTITLED: &str = "Untitled Conversation";

/// Messages plus evaluation/trace state for one backend conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TraceMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u32>,
}

impl Conversation {
    /// Empty conversation dated now
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            date: Utc::now(),
            messages: Vec::new(),
            note: String::new(),
            score: None,
            tags: Vec::new(),
            evaluation: None,
            trace: None,
            metadata: None,
            user_id: None,
            created_at: None,
            message_count: None,
        }
    }

    pub fn has_generic_title(&self) -> bool {
        self.title == UNTITLED
    }

    pub fn is_loaded(&self) -> bool {
        !self.messages.is_empty()
    }
}
