//! Persisted client state
//!
//! [`KeyValueStore`] is the injected persistence capability: JSON values
//! under string keys, no transactions, last writer wins. The typed wrappers
//! on top ([`ChatStateStore`], [`ReviewStateStore`]) are best-effort: a
//! failing or corrupt store is logged and treated as "nothing saved", never
//! returned to the caller.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ChatConfig;
use crate::error::StoreError;

pub const CHAT_STATE_KEY: &str = "conversation-evaluator-chat-state";
pub const TRACE_VIEW_STATE_KEY: &str = "conversation-evaluator-trace-view-state";
pub const NOTES_KEY: &str = "conversation-evaluator-notes";

pub type StoreResult<T> = Result<T, StoreError>;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;
    fn set(&self, key: &str, value: &Value) -> StoreResult<()>;
    fn remove(&self, key: &str) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// All keys in one JSON object on disk. Every call re-reads the file, so
/// concurrent processes overwrite each other's changes.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> StoreResult<serde_json::Map<String, Value>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Default::default()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Default::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_all(&self, entries: &serde_json::Map<String, Value>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(entries)?)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &Value) -> StoreResult<()> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.clone());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Typed, best-effort access
// ---------------------------------------------------------------------------

fn load_typed<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let value = match store.get(key) {
        Ok(Some(value)) => value,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read saved state");
            return None;
        }
    };

    match serde_json::from_value(value) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!(key, error = %e, "Ignoring unreadable saved state");
            None
        }
    }
}

fn save_typed<T: Serialize>(store: &dyn KeyValueStore, key: &str, state: &T) {
    let result = serde_json::to_value(state)
        .map_err(StoreError::from)
        .and_then(|value| store.set(key, &value));
    if let Err(e) = result {
        tracing::warn!(key, error = %e, "Failed to save state");
    }
}

fn remove_key(store: &dyn KeyValueStore, key: &str) {
    if let Err(e) = store.remove(key) {
        tracing::warn!(key, error = %e, "Failed to clear saved state");
    }
}

/// Tab shown in the chat view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveTab {
    #[default]
    Conversation,
    Trace,
    Evaluation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    pub current_conversation_id: Option<String>,
    pub config: ChatConfig,
    #[serde(default)]
    pub active_tab: ActiveTab,
}

#[derive(Clone)]
pub struct ChatStateStore {
    store: Arc<dyn KeyValueStore>,
}

impl ChatStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Option<ChatState> {
        load_typed(self.store.as_ref(), CHAT_STATE_KEY)
    }

    pub fn save(&self, state: &ChatState) {
        save_typed(self.store.as_ref(), CHAT_STATE_KEY, state);
    }

    pub fn clear(&self) {
        remove_key(self.store.as_ref(), CHAT_STATE_KEY);
    }

    // Partial saves only touch an existing state.

    pub fn save_current_conversation(&self, conversation_id: Option<&str>) {
        if let Some(mut state) = self.load() {
            state.current_conversation_id = conversation_id.map(str::to_string);
            self.save(&state);
        }
    }

    pub fn save_chat_config(&self, config: &ChatConfig) {
        if let Some(mut state) = self.load() {
            state.config = config.clone();
            self.save(&state);
        }
    }

    pub fn save_active_tab(&self, active_tab: ActiveTab) {
        if let Some(mut state) = self.load() {
            state.active_tab = active_tab;
            self.save(&state);
        }
    }
}

/// View shown on the review side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveView {
    #[default]
    Individual,
    Chat,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceViewState {
    #[serde(default)]
    pub selected_conversation_id: Option<String>,
    #[serde(default)]
    pub active_view: ActiveView,
}

#[derive(Clone)]
pub struct ReviewStateStore {
    store: Arc<dyn KeyValueStore>,
}

impl ReviewStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load_view_state(&self) -> TraceViewState {
        load_typed(self.store.as_ref(), TRACE_VIEW_STATE_KEY).unwrap_or_default()
    }

    pub fn save_view_state(&self, state: &TraceViewState) {
        save_typed(self.store.as_ref(), TRACE_VIEW_STATE_KEY, state);
    }

    pub fn notes(&self) -> BTreeMap<String, String> {
        load_typed(self.store.as_ref(), NOTES_KEY).unwrap_or_default()
    }

    pub fn note(&self, conversation_id: &str) -> Option<String> {
        self.notes().remove(conversation_id)
    }

    /// Store `note` for a conversation; an empty note removes the entry.
    pub fn save_note(&self, conversation_id: &str, note: &str) {
        let mut notes = self.notes();
        if note.is_empty() {
            notes.remove(conversation_id);
        } else {
            notes.insert(conversation_id.to_string(), note.to_string());
        }
        save_typed(self.store.as_ref(), NOTES_KEY, &notes);
    }
}
