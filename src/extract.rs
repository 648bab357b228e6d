//! UI-component extraction
//!
//! The backend describes each assistant reply as a list of UI components
//! (body text, loading indicator, place list, quick replies). This module
//! flattens that list into the content the chat view shows.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

use crate::model::{Place, PlaceList, QuickResponse};

/// `{ "component": { ... } }` wrapper used by every UI component kind
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Wrapped<T> {
    #[serde(default)]
    pub component: Option<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyComponent {
    #[serde(default)]
    pub mutable_content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingComponent {
    #[serde(default)]
    pub mutable_status_texts_list: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceListComponent {
    #[serde(default)]
    pub mutable_heading1: Option<String>,
    #[serde(default)]
    pub mutable_body: Option<String>,
    #[serde(default)]
    pub mutable_places_list: Option<Vec<Place>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickResponsesComponent {
    #[serde(default)]
    pub quick_responses_list: Option<Vec<QuickResponse>>,
}

/// One UI component record. Normally exactly one field is set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiComponent {
    #[serde(default)]
    pub body: Option<Wrapped<BodyComponent>>,
    #[serde(default)]
    pub loading: Option<Wrapped<LoadingComponent>>,
    #[serde(default)]
    pub place_list: Option<Wrapped<PlaceListComponent>>,
    #[serde(default)]
    pub quick_responses: Option<Wrapped<QuickResponsesComponent>>,
}

impl UiComponent {
    fn body_text(&self) -> Option<&str> {
        self.body
            .as_ref()?
            .component
            .as_ref()?
            .mutable_content
            .as_deref()
            .filter(|text| !text.is_empty())
    }

    fn status_texts(&self) -> Option<&[String]> {
        self.loading
            .as_ref()?
            .component
            .as_ref()?
            .mutable_status_texts_list
            .as_deref()
            .filter(|texts| !texts.is_empty())
    }

    fn place_list(&self) -> Option<PlaceList> {
        let component = self.place_list.as_ref()?.component.as_ref()?;
        Some(PlaceList {
            heading: component.mutable_heading1.clone(),
            body: component.mutable_body.clone(),
            places: component.mutable_places_list.clone().unwrap_or_default(),
        })
    }

    fn quick_responses(&self) -> Option<&[QuickResponse]> {
        self.quick_responses
            .as_ref()?
            .component
            .as_ref()?
            .quick_responses_list
            .as_deref()
    }
}

/// Flat projection of a reply's UI components
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub content: String,
    pub place_list: Option<PlaceList>,
    pub quick_responses: Option<Vec<QuickResponse>>,
    pub is_status_message: bool,
    /// At least one body fragment was present; `content` is not just status text
    pub has_body: bool,
}

fn loading_prefix() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"(?i)^Loading:\s*").expect("static regex is valid"))
}

/// Strip a leading `Loading:` (any case) and surrounding whitespace.
pub fn clean_status_text(text: &str) -> String {
    loading_prefix().replace(text, "").trim().to_string()
}

/// Extract content, place list, quick replies and the status flag.
///
/// Body fragments are joined by a blank line. Only the most recent loading
/// status survives, and only when there is no body text. Place list and
/// quick replies are last-one-wins.
pub fn extract(components: &[UiComponent]) -> Extracted {
    let mut fragments: Vec<String> = Vec::new();
    let mut place_list: Option<PlaceList> = None;
    let mut quick_responses: Vec<QuickResponse> = Vec::new();
    let mut has_loading_component = false;
    let mut latest_status_text = String::new();

    for component in components {
        if let Some(text) = component.body_text() {
            fragments.push(text.to_string());
        }

        if let Some(texts) = component.status_texts() {
            has_loading_component = true;
            if let Some(last) = texts.last() {
                latest_status_text = clean_status_text(last);
            }
        }

        if let Some(list) = component.place_list() {
            place_list = Some(list);
        }

        if let Some(list) = component.quick_responses() {
            quick_responses = list.to_vec();
        }
    }

    let has_body = !fragments.is_empty();
    if has_loading_component && !latest_status_text.is_empty() && !has_body {
        fragments.push(latest_status_text);
    }

    let is_status_message = has_loading_component && place_list.is_none() && fragments.len() <= 1;

    Extracted {
        content: fragments.join("\n\n").trim().to_string(),
        place_list,
        quick_responses: (!quick_responses.is_empty()).then_some(quick_responses),
        is_status_message,
        has_body,
    }
}

/// [`extract`] over raw JSON. Anything other than an array yields empty
/// content; array entries that do not look like UI components are skipped.
pub fn extract_value(value: &Value) -> Extracted {
    let Some(items) = value.as_array() else {
        return Extracted::default();
    };

    let components: Vec<UiComponent> = items
        .iter()
        .filter_map(|item| match UiComponent::deserialize(item) {
            Ok(component) => Some(component),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed UI component");
                None
            }
        })
        .collect();

    extract(&components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_only() {
        let out = extract_value(&json!([{"body": {"component": {"mutableContent": "Hello"}}}]));
        assert_eq!(out.content, "Hello");
        assert!(!out.is_status_message);
        assert!(out.place_list.is_none());
        assert!(out.quick_responses.is_none());
    }

    #[test]
    fn test_loading_keeps_only_last_status() {
        let out = extract_value(&json!([{
            "loading": {"component": {"mutableStatusTextsList": ["Loading: Searching", "Loading: Ranking"]}}
        }]));
        assert_eq!(out.content, "Ranking");
        assert!(out.is_status_message);
        assert!(!out.has_body);
    }

    #[test]
    fn test_loading_prefix_is_case_insensitive() {
        assert_eq!(clean_status_text("LOADING:   Finding spots  "), "Finding spots");
        assert_eq!(clean_status_text("loading:x"), "x");
        assert_eq!(clean_status_text("Still Loading: x"), "Still Loading: x");
    }

    #[test]
    fn test_latest_loading_component_wins_across_components() {
        let out = extract_value(&json!([
            {"loading": {"component": {"mutableStatusTextsList": ["Loading: one"]}}},
            {"loading": {"component": {"mutableStatusTextsList": ["Loading: two"]}}}
        ]));
        assert_eq!(out.content, "two");
        assert!(out.is_status_message);
    }

    #[test]
    fn test_body_suppresses_status_text() {
        let out = extract_value(&json!([
            {"loading": {"component": {"mutableStatusTextsList": ["Loading: Ranking"]}}},
            {"body": {"component": {"mutableContent": "Here are three spots."}}}
        ]));
        assert_eq!(out.content, "Here are three spots.");
        // one fragment and a loading component, no place list
        assert!(out.is_status_message);
        assert!(out.has_body);
    }

    #[test]
    fn test_two_bodies_are_real_content() {
        let out = extract_value(&json!([
            {"loading": {"component": {"mutableStatusTextsList": ["Loading: Ranking"]}}},
            {"body": {"component": {"mutableContent": "First."}}},
            {"body": {"component": {"mutableContent": "Second."}}}
        ]));
        assert_eq!(out.content, "First.\n\nSecond.");
        assert!(!out.is_status_message);
    }

    #[test]
    fn test_place_list_is_not_status() {
        let out = extract_value(&json!([
            {"loading": {"component": {"mutableStatusTextsList": ["Loading: Ranking"]}}},
            {"placeList": {"component": {
                "mutableHeading1": "Top picks",
                "mutableBody": "Near you",
                "mutablePlacesList": [{"placeId": "a"}, {"placeId": "b"}]
            }}}
        ]));
        let list = out.place_list.unwrap();
        assert_eq!(list.heading.as_deref(), Some("Top picks"));
        assert_eq!(list.places.len(), 2);
        assert!(!out.is_status_message);
    }

    #[test]
    fn test_place_list_and_quick_responses_last_one_wins() {
        let out = extract_value(&json!([
            {"placeList": {"component": {"mutableHeading1": "old"}}},
            {"quickResponses": {"component": {"quickResponsesList": [{"displayText": "A", "messageText": "a"}]}}},
            {"placeList": {"component": {"mutableHeading1": "new"}}},
            {"quickResponses": {"component": {"quickResponsesList": [
                {"displayText": "B", "messageText": "b"},
                {"displayText": "C", "messageText": "c"}
            ]}}}
        ]));
        let list = out.place_list.unwrap();
        assert_eq!(list.heading.as_deref(), Some("new"));
        assert!(list.places.is_empty());
        let quick = out.quick_responses.unwrap();
        assert_eq!(quick.len(), 2);
        assert_eq!(quick[0].message_text, "b");
    }

    #[test]
    fn test_empty_quick_response_list_is_absent() {
        let out = extract_value(&json!([
            {"quickResponses": {"component": {"quickResponsesList": [{"displayText": "A", "messageText": "a"}]}}},
            {"quickResponses": {"component": {"quickResponsesList": []}}}
        ]));
        assert!(out.quick_responses.is_none());
    }

    #[test]
    fn test_unrecognised_and_non_list_input() {
        assert_eq!(extract_value(&json!(null)), Extracted::default());
        assert_eq!(extract_value(&json!({"body": {}})), Extracted::default());
        assert_eq!(extract_value(&json!([])), Extracted::default());

        let out = extract_value(&json!([{"divider": {}}, 7, {"body": {"component": {"mutableContent": ""}}}]));
        assert_eq!(out, Extracted::default());
    }

    #[test]
    fn test_empty_status_list_is_not_loading() {
        let out = extract_value(&json!([{"loading": {"component": {"mutableStatusTextsList": []}}}]));
        assert_eq!(out.content, "");
        assert!(!out.is_status_message);
    }
}
