//! Chat messages and the structured payloads that ride along with them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Speaker of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Map a backend role (`USER`, `ASSISTANT`, `user`, ...) onto a view role.
    /// Anything that is not recognisably the user is treated as the assistant.
    pub fn from_wire(role: &str) -> Self {
        if role.eq_ignore_ascii_case("user") {
            Role::User
        } else {
            Role::Assistant
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggested reply chip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickResponse {
    #[serde(default)]
    pub display_text: String,
    #[serde(default)]
    pub message_text: String,
}

/// A user who saved a place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedBy {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Descriptive fields of a place; unknown keys are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub establishment_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_level: Option<u8>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolatilePlaceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<PlaceDetails>,
    #[serde(default)]
    pub users_added_list: Vec<AddedBy>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One recommended place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    #[serde(default)]
    pub place_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatile_place_data: Option<VolatilePlaceData>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Place {
    pub fn details(&self) -> Option<&PlaceDetails> {
        self.volatile_place_data.as_ref()?.place.as_ref()
    }

    /// "Name · Neighborhood, City · Category" with missing parts left out
    pub fn summary_line(&self) -> String {
        let Some(details) = self.details() else {
            return self.place_id.clone();
        };

        let name = details
            .establishment_name
            .clone()
            .unwrap_or_else(|| self.place_id.clone());
        let location = match (&details.neighborhood, &details.city) {
            (Some(n), Some(c)) => format!("{}, {}", n, c),
            (None, Some(c)) => c.clone(),
            _ => String::new(),
        };

        [Some(name), Some(location), details.primary_category.clone()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" · ")
    }
}

/// Structured recommendation payload attached to an assistant reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub places: Vec<Place>,
}

/// One turn in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Transient "assistant is working" placeholder
    #[serde(default)]
    pub is_status_message: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_list: Option<PlaceList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_responses: Option<Vec<QuickResponse>>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_status_message: false,
            place_list: None,
            quick_responses: None,
        }
    }

    /// Message with an id synthesized as `role-<millis>`.
    pub fn observed(role: Role, content: impl Into<String>) -> Self {
        let timestamp = Utc::now();
        Self {
            id: synthesize_id(role.as_str(), timestamp),
            timestamp,
            ..Self::new(String::new(), role, content)
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn as_status(mut self) -> Self {
        self.is_status_message = true;
        self
    }
}

/// `<prefix>-<unix millis>`, used wherever the backend omits an id.
pub fn synthesize_id(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", prefix, at.timestamp_millis())
}
