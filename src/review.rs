//! ReviewBoard: the annotate tab.
//!
//! Holds the recent-conversation list, the selected conversation and the
//! reviewer's notes. Selecting a conversation lazily fetches its messages,
//! trace and evaluation.

use std::collections::HashSet;
use std::sync::Arc;

use crate::api::wire::{EvalRunResponse, RecentConversationsRequest};
use crate::api::ChatApi;
use crate::config::ApiConfig;
use crate::error::ApiResult;
use crate::merge::merge_conversations;
use crate::model::Conversation;
use crate::store::{ActiveView, ReviewStateStore, TraceViewState};
use crate::transform::{apply_eval_result, conversation_from_summary, fetch_full, score_conversation};

pub struct ReviewBoard {
    api: Arc<dyn ChatApi>,
    config: ApiConfig,
    conversations: Vec<Conversation>,
    selected: Option<String>,
    active_view: ActiveView,
    state: Option<ReviewStateStore>,
}

impl ReviewBoard {
    pub fn new(api: Arc<dyn ChatApi>, config: ApiConfig) -> Self {
        Self {
            api,
            config,
            conversations: Vec::new(),
            selected: None,
            active_view: ActiveView::default(),
            state: None,
        }
    }

    /// Restore the saved selection and view, and persist changes from now on.
    pub fn with_state_store(mut self, store: ReviewStateStore) -> Self {
        let saved = store.load_view_state();
        self.selected = saved.selected_conversation_id;
        self.active_view = saved.active_view;
        self.state = Some(store);
        self
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected(&self) -> Option<&Conversation> {
        self.conversation(self.selected.as_deref()?)
    }

    pub fn active_view(&self) -> ActiveView {
        self.active_view
    }

    pub fn set_active_view(&mut self, view: ActiveView) {
        self.active_view = view;
        self.persist_view();
    }

    /// Load the recent list, then reselect whatever was selected before.
    pub async fn initialize(&mut self) -> ApiResult<()> {
        let saved = self.selected.clone();
        self.load_recent(None, None).await?;
        if let Some(conversation_id) = saved {
            self.select(&conversation_id).await?;
        }
        Ok(())
    }

    /// Fetch the first page of recent conversations, optionally filtered by
    /// user or conversation id. Clears the selection. Entries already held
    /// keep their notes, messages and evaluation.
    pub async fn load_recent(
        &mut self,
        for_user_id: Option<&str>,
        conversation_id: Option<&str>,
    ) -> ApiResult<usize> {
        self.selected = None;
        self.persist_view();

        let request = RecentConversationsRequest::first_page(
            &self.config.default_user_id,
            self.config.grpc_port,
            for_user_id,
            conversation_id,
        );
        let summaries = match self.api.recent_conversations(&request).await {
            Ok(summaries) => summaries,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load recent conversations");
                self.conversations.clear();
                return Err(e);
            }
        };

        let incoming: Vec<Conversation> = summaries.iter().map(conversation_from_summary).collect();
        let ids: HashSet<&str> = incoming.iter().map(|c| c.id.as_str()).collect();
        let held: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| ids.contains(c.id.as_str()))
            .cloned()
            .collect();

        let mut merged = merge_conversations(&held, &incoming);
        for conversation in &mut merged {
            if let Some(previous) = held.iter().find(|h| h.id == conversation.id) {
                if conversation.evaluation.is_none() {
                    conversation.evaluation = previous.evaluation.clone();
                }
                if conversation.trace.is_none() {
                    conversation.trace = previous.trace.clone();
                }
            }
        }

        if let Some(store) = &self.state {
            let notes = store.notes();
            for conversation in merged.iter_mut().filter(|c| c.note.is_empty()) {
                if let Some(note) = notes.get(&conversation.id) {
                    conversation.note = note.clone();
                    conversation.score = Some(score_conversation(conversation));
                }
            }
        }

        tracing::info!(count = merged.len(), "Loaded recent conversations");
        self.conversations = merged;
        Ok(self.conversations.len())
    }

    /// Select a conversation, fetching its details unless already loaded.
    pub async fn select(&mut self, conversation_id: &str) -> ApiResult<()> {
        self.selected = Some(conversation_id.to_string());
        self.persist_view();

        if self.conversation(conversation_id).is_some_and(Conversation::is_loaded) {
            return Ok(());
        }
        self.fetch_details(conversation_id).await
    }

    /// Refetch a conversation's details even if already loaded.
    pub async fn refresh(&mut self, conversation_id: &str) -> ApiResult<()> {
        self.fetch_details(conversation_id).await
    }

    async fn fetch_details(&mut self, conversation_id: &str) -> ApiResult<()> {
        let full = fetch_full(
            self.api.as_ref(),
            conversation_id,
            &self.config.default_user_id,
            &self.config.default_cic_hash,
        )
        .await
        .inspect_err(|e| {
            tracing::warn!(conversation_id = %conversation_id, error = %e, "Failed to fetch conversation details");
        })?;

        match self.conversations.iter_mut().find(|c| c.id == conversation_id) {
            Some(listed) => *listed = with_details(listed, full),
            None => self.conversations.push(full),
        }
        Ok(())
    }

    /// Attach a reviewer note. Persisted best-effort.
    pub fn save_note(&mut self, conversation_id: &str, note: &str) {
        if let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == conversation_id) {
            conversation.note = note.to_string();
            conversation.score = Some(score_conversation(conversation));
        }
        if let Some(store) = &self.state {
            store.save_note(conversation_id, note);
        }
    }

    /// Run (or fetch the cached) evaluation and fold it into the held
    /// conversation.
    pub async fn run_evaluation(&mut self, conversation_id: &str) -> ApiResult<EvalRunResponse> {
        let result = self.api.run_evaluation(conversation_id).await?;
        tracing::info!(
            conversation_id = %conversation_id,
            cached = result.cached,
            "Evaluation finished"
        );

        if let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == conversation_id) {
            conversation.evaluation = Some(apply_eval_result(
                conversation.evaluation.as_ref(),
                &result.eval_result,
            ));
        }
        Ok(result)
    }

    fn persist_view(&self) {
        if let Some(store) = &self.state {
            store.save_view_state(&TraceViewState {
                selected_conversation_id: self.selected.clone(),
                active_view: self.active_view,
            });
        }
    }
}

/// Fetched details applied onto a list entry: the list keeps its date,
/// note and summary fields, and its title when the fetched one is generic.
fn with_details(listed: &Conversation, full: Conversation) -> Conversation {
    let title = if full.has_generic_title() {
        listed.title.clone()
    } else {
        full.title.clone()
    };

    Conversation {
        title,
        date: listed.date,
        note: listed.note.clone(),
        score: listed.score,
        user_id: listed.user_id.clone(),
        created_at: listed.created_at,
        message_count: listed.message_count,
        ..full
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, Role, UNTITLED};

    #[test]
    fn test_with_details_keeps_list_fields() {
        let mut listed = Conversation::new("c1", "Friday dinner");
        listed.note = "check ranking".into();
        listed.message_count = Some(4);

        let mut full = Conversation::new("c1", UNTITLED);
        full.messages = vec![Message::new("m1", Role::User, "hi")];

        let merged = with_details(&listed, full);
        assert_eq!(merged.title, "Friday dinner");
        assert_eq!(merged.note, "check ranking");
        assert_eq!(merged.message_count, Some(4));
        assert_eq!(merged.date, listed.date);
        assert!(merged.is_loaded());

        let renamed = with_details(&listed, Conversation::new("c1", "Dinner for 8"));
        assert_eq!(renamed.title, "Dinner for 8");
    }
}
