//! ChatSession: the live chat tab.
//!
//! Owns the message list and the loaded conversation (trace + evaluation)
//! behind one mutex shared with the poll handler. Every mutation of the
//! message list goes through the merge functions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::api::wire::{ChatRequest, ChatResponse, WireMessage};
use crate::api::ChatApi;
use crate::config::ChatConfig;
use crate::error::ApiResult;
use crate::extract::extract_value;
use crate::merge::{merge_incoming, push_user_message};
use crate::model::{synthesize_id, Conversation, Message, Role};
use crate::poll::{ChatPoller, PollHandler, PollOptions, PollState, PollStatus, PollTarget};
use crate::store::{ActiveTab, ChatState, ChatStateStore};
use crate::transform::{apply_poll_update, fetch_full};

pub const SEND_ERROR_MESSAGE: &str =
    "Sorry, there was an error processing your message. Please try again.";

/// What the chat tab renders
#[derive(Debug, Clone, Default)]
pub struct ChatView {
    pub messages: Vec<Message>,
    pub current_conversation_id: Option<String>,
    /// Full conversation, once fetched; feeds the trace and evaluation tabs
    pub loaded_conversation: Option<Conversation>,
    pub active_tab: ActiveTab,
    /// A turn is in flight
    pub is_loading: bool,
    pub status_line: String,
}

fn lock(view: &Mutex<ChatView>) -> MutexGuard<'_, ChatView> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Assistant message shown for the last `ASSISTANT` entry of a response,
/// or `None` when it has no content yet.
fn assistant_message(wire: &WireMessage) -> Option<Message> {
    let extracted = extract_value(&wire.ui_components);
    if extracted.content.is_empty() {
        return None;
    }

    let timestamp = Utc::now();
    Some(Message {
        id: wire
            .backend_id()
            .map(str::to_string)
            .unwrap_or_else(|| synthesize_id("assistant", timestamp)),
        role: Role::Assistant,
        content: extracted.content,
        timestamp,
        is_status_message: extracted.is_status_message,
        place_list: extracted.place_list,
        quick_responses: extracted.quick_responses,
    })
}

fn merge_assistant_reply(view: &mut ChatView, response: &ChatResponse) {
    if let Some(message) = response.last_assistant_message().and_then(assistant_message) {
        view.messages = merge_incoming(&view.messages, message);
    }
}

struct SessionPollHandler {
    view: Arc<Mutex<ChatView>>,
}

impl PollHandler for SessionPollHandler {
    fn on_update(&self, response: &ChatResponse) {
        let mut view = lock(&self.view);
        merge_assistant_reply(&mut view, response);
        if let Some(conversation) = view.loaded_conversation.as_mut() {
            apply_poll_update(conversation, response);
        }
    }

    fn on_complete(&self, response: &ChatResponse) {
        let mut view = lock(&self.view);
        view.is_loading = false;
        view.status_line = format!(
            "Conversation completed: {}",
            response.conversation_id.as_deref().unwrap_or("N/A")
        );
    }
}

// ---------------------------------------------------------------------------
// ChatSession
// ---------------------------------------------------------------------------

pub struct ChatSession {
    api: Arc<dyn ChatApi>,
    config: ChatConfig,
    view: Arc<Mutex<ChatView>>,
    poller: ChatPoller,
    state: Option<ChatStateStore>,
}

impl ChatSession {
    pub fn new(api: Arc<dyn ChatApi>, config: ChatConfig, options: PollOptions) -> Self {
        let view = Arc::new(Mutex::new(ChatView {
            status_line: "Ready".to_string(),
            ..ChatView::default()
        }));
        let handler = Arc::new(SessionPollHandler { view: view.clone() });
        let poller = ChatPoller::new(api.clone(), handler, options);

        Self {
            api,
            config,
            view,
            poller,
            state: None,
        }
    }

    /// Persist current conversation, active tab and config to `store` on
    /// every change.
    pub fn with_state_store(mut self, store: ChatStateStore) -> Self {
        self.state = Some(store);
        self
    }

    /// Session from saved state, falling back to `config` when nothing was
    /// saved. A saved conversation is reloaded; failure to do so is logged
    /// and leaves an empty session.
    pub async fn restore(
        api: Arc<dyn ChatApi>,
        store: ChatStateStore,
        config: ChatConfig,
        options: PollOptions,
    ) -> Self {
        let saved = store.load();
        let config = saved.as_ref().map(|s| s.config.clone()).unwrap_or(config);
        let session = Self::new(api, config, options).with_state_store(store);

        let Some(saved) = saved else {
            return session;
        };
        lock(&session.view).active_tab = saved.active_tab;

        if let Some(conversation_id) = saved.current_conversation_id {
            tracing::info!(conversation_id = %conversation_id, "Restoring saved conversation");
            if let Err(e) = session.load_conversation(&conversation_id).await {
                tracing::warn!(conversation_id = %conversation_id, error = %e, "Failed to restore conversation");
                lock(&session.view).current_conversation_id = Some(conversation_id);
            }
        }
        session
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Saved state is only updated once a turn or load has written one.
    pub fn set_config(&mut self, config: ChatConfig) {
        if let Some(store) = &self.state {
            store.save_chat_config(&config);
        }
        self.config = config;
    }

    pub fn view(&self) -> ChatView {
        lock(&self.view).clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.view).messages.clone()
    }

    pub fn current_conversation_id(&self) -> Option<String> {
        lock(&self.view).current_conversation_id.clone()
    }

    pub fn set_active_tab(&self, tab: ActiveTab) {
        lock(&self.view).active_tab = tab;
        if let Some(store) = &self.state {
            store.save_active_tab(tab);
        }
    }

    pub fn poll_status(&self) -> PollStatus {
        self.poller.status()
    }

    pub fn subscribe_poll(&self) -> tokio::sync::watch::Receiver<PollStatus> {
        self.poller.subscribe()
    }

    /// Send a user turn and start polling for the reply.
    ///
    /// Blank input, or input while a turn is still running, is ignored. On
    /// transport failure an apology message is appended, polling is
    /// disabled and the error is returned.
    pub async fn send_message(&self, text: &str) -> ApiResult<()> {
        if text.trim().is_empty() {
            return Ok(());
        }

        let conversation_id = {
            let mut view = lock(&self.view);
            if view.is_loading {
                tracing::debug!("Ignoring message while a turn is in flight");
                return Ok(());
            }
            push_user_message(&mut view.messages, Message::observed(Role::User, text));
            view.is_loading = true;
            view.status_line = format!("Sending message: \"{}\"", text.chars().take(50).collect::<String>());
            view.current_conversation_id.clone()
        };

        let request = ChatRequest::send(&self.config, text, conversation_id.as_deref());
        let response = match self.api.chat(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Send failed");
                {
                    let mut view = lock(&self.view);
                    view.messages.push(Message {
                        id: synthesize_id("error", Utc::now()),
                        ..Message::new("", Role::Assistant, SEND_ERROR_MESSAGE)
                    });
                    view.is_loading = false;
                    view.status_line = format!("Error: {}", e);
                }
                self.poller.disable();
                return Err(e);
            }
        };

        let target_id = response
            .conversation_id
            .clone()
            .filter(|id| !id.is_empty())
            .or(conversation_id.clone());

        {
            let mut view = lock(&self.view);
            if conversation_id.is_none() && target_id.is_some() {
                view.current_conversation_id = target_id.clone();
            }
            view.status_line = format!(
                "Received response for conversation: {}",
                target_id.as_deref().unwrap_or("N/A")
            );
            merge_assistant_reply(&mut view, &response);
        }
        self.persist();

        match target_id {
            Some(id) => {
                tracing::info!(conversation_id = %id, "Message sent, polling for reply");
                self.poller.arm(PollTarget {
                    conversation_id: id,
                    user_id: self.config.user_id.clone(),
                    cic_hash: self.config.cic_hash.clone(),
                });
            }
            None => {
                tracing::warn!("Backend returned no conversation id; not polling");
                lock(&self.view).is_loading = false;
            }
        }
        Ok(())
    }

    /// Wait for the current turn to settle. On completion the full
    /// conversation (trace and evaluation) is fetched into the view.
    pub async fn finish_turn(&self) -> PollStatus {
        let status = self.poller.settled().await;

        let status_line = match status.state {
            PollState::Complete => Some(format!(
                "Conversation complete ({})",
                status.conversation_id.as_deref().unwrap_or("N/A")
            )),
            PollState::Errored => Some(format!(
                "Polling failed: {}",
                status.error.as_deref().unwrap_or("unknown error")
            )),
            PollState::Stopped if status.budget_exhausted => {
                Some("Stopped polling without a final response".to_string())
            }
            _ => None,
        };
        {
            let mut view = lock(&self.view);
            view.is_loading = false;
            if let Some(line) = status_line {
                view.status_line = line;
            }
        }

        if let (PollState::Complete, Some(conversation_id)) =
            (status.state, status.conversation_id.as_deref())
        {
            match fetch_full(
                self.api.as_ref(),
                conversation_id,
                &self.config.user_id,
                &self.config.cic_hash,
            )
            .await
            {
                Ok(conversation) => lock(&self.view).loaded_conversation = Some(conversation),
                Err(e) => {
                    tracing::warn!(conversation_id = %conversation_id, error = %e, "Failed to load conversation after completion")
                }
            }
        }

        status
    }

    /// Replace the session with a stored conversation. Stops polling first.
    pub async fn load_conversation(&self, conversation_id: &str) -> ApiResult<()> {
        self.poller.disable();
        lock(&self.view).status_line = format!("Loading conversation: {}", conversation_id);

        let conversation = match fetch_full(
            self.api.as_ref(),
            conversation_id,
            &self.config.user_id,
            &self.config.cic_hash,
        )
        .await
        {
            Ok(conversation) => conversation,
            Err(e) => {
                lock(&self.view).status_line = format!("Error loading: {}", e);
                return Err(e);
            }
        };

        {
            let mut view = lock(&self.view);
            view.messages = conversation.messages.clone();
            view.status_line = format!(
                "Loaded {} messages from conversation {}",
                conversation.messages.len(),
                conversation_id
            );
            view.loaded_conversation = Some(conversation);
            view.current_conversation_id = Some(conversation_id.to_string());
            view.is_loading = false;
        }
        self.persist();
        Ok(())
    }

    /// Forget the current conversation and stop polling.
    pub fn new_conversation(&self) {
        self.poller.disable();
        *lock(&self.view) = ChatView {
            status_line: "Ready for new conversation".to_string(),
            ..ChatView::default()
        };
        self.persist();
    }

    fn persist(&self) {
        let Some(store) = &self.state else {
            return;
        };
        let (current_conversation_id, active_tab) = {
            let view = lock(&self.view);
            (view.current_conversation_id.clone(), view.active_tab)
        };
        store.save(&ChatState {
            current_conversation_id,
            config: self.config.clone(),
            active_tab,
        });
    }
}
