//! Message and conversation merging
//!
//! Invariant kept by every function here: a message list holds at most one
//! status (placeholder) message, and it is replaced in place rather than
//! appended next to a stale one.

use std::collections::HashMap;

use crate::model::{Conversation, Message};

/// Fold an incoming assistant message into `existing`.
///
/// A status message drops every other status message (except one with the
/// same id, which it replaces). A real message drops all status messages.
/// Either way the incoming message is then upserted by id.
pub fn merge_incoming(existing: &[Message], incoming: Message) -> Vec<Message> {
    let mut merged: Vec<Message> = existing
        .iter()
        .filter(|m| !m.is_status_message || (incoming.is_status_message && m.id == incoming.id))
        .cloned()
        .collect();

    upsert(&mut merged, incoming);
    merged
}

/// Append a user message. User turns are never deduplicated.
pub fn push_user_message(existing: &mut Vec<Message>, message: Message) {
    existing.push(message);
}

fn upsert(messages: &mut Vec<Message>, message: Message) {
    match messages.iter_mut().find(|m| m.id == message.id) {
        Some(slot) => *slot = message,
        None => messages.push(message),
    }
}

/// Union two message lists by id (incoming wins), sorted by timestamp.
///
/// Messages with equal timestamps keep first-seen order.
pub fn merge_messages(existing: &[Message], incoming: &[Message]) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for message in existing.iter().chain(incoming) {
        match index.get(&message.id) {
            Some(&i) => merged[i] = message.clone(),
            None => {
                index.insert(message.id.clone(), merged.len());
                merged.push(message.clone());
            }
        }
    }

    merged.sort_by_key(|m| m.timestamp);
    merged
}

/// Combine a freshly fetched conversation list with a previously held one.
///
/// Matching ids take the incoming conversation, keep the existing note when
/// the incoming one is empty, and union their messages. The result is
/// newest first.
pub fn merge_conversations(existing: &[Conversation], incoming: &[Conversation]) -> Vec<Conversation> {
    let mut merged: Vec<Conversation> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for conversation in existing {
        match index.get(&conversation.id) {
            Some(&i) => merged[i] = conversation.clone(),
            None => {
                index.insert(conversation.id.clone(), merged.len());
                merged.push(conversation.clone());
            }
        }
    }

    for conversation in incoming {
        match index.get(&conversation.id) {
            Some(&i) => {
                let held = &merged[i];
                let note = if held.note.is_empty() {
                    conversation.note.clone()
                } else {
                    held.note.clone()
                };
                let messages = merge_messages(&held.messages, &conversation.messages);
                merged[i] = Conversation {
                    note,
                    messages,
                    ..conversation.clone()
                };
            }
            None => {
                index.insert(conversation.id.clone(), merged.len());
                merged.push(conversation.clone());
            }
        }
    }

    merged.sort_by(|a, b| b.date.cmp(&a.date));
    merged
}
