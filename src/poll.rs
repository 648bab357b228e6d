//! ChatPoller: refresh loop for a conversation whose turn is still running.
//!
//! One spawned task per armed session. Each tick sends a refresh request
//! (no `message` field), hands the raw response to the [`PollHandler`], and
//! either stops (terminal response, transport error, attempt budget spent)
//! or sleeps for the poll interval and goes again. Ticks never overlap.
//!
//! ## Cancellation
//!
//! Every arm bumps a generation counter held behind `gate`. A tick only
//! publishes status or invokes callbacks while holding the gate and seeing
//! its own generation, so once [`ChatPoller::disable`] or a re-arm returns,
//! no callback from the previous session can fire, even if its request was
//! already in flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::wire::{ChatRequest, ChatResponse};
use crate::api::ChatApi;
use crate::config::CicHash;
use crate::error::ApiResult;

/// Delay between the end of one tick and the next request.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Requests per armed session before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    #[default]
    Idle,
    /// Armed, first request not sent yet
    Armed,
    /// Request in flight or waiting out the interval
    Polling,
    Complete,
    Errored,
    Stopped,
}

impl PollState {
    pub fn is_active(&self) -> bool {
        matches!(self, PollState::Armed | PollState::Polling)
    }
}

/// Snapshot broadcast on every transition
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollStatus {
    pub conversation_id: Option<String>,
    pub state: PollState,
    pub attempts: u32,
    pub error: Option<String>,
    /// Set when the session stopped because `max_attempts` ran out
    pub budget_exhausted: bool,
}

impl PollStatus {
    pub fn is_polling(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_complete(&self) -> bool {
        self.state == PollState::Complete
    }
}

/// What to poll
#[derive(Debug, Clone, PartialEq)]
pub struct PollTarget {
    pub conversation_id: String,
    pub user_id: String,
    pub cic_hash: CicHash,
}

/// Receives poll results. Both methods run with the poller's gate held and
/// must not call back into the [`ChatPoller`].
pub trait PollHandler: Send + Sync {
    /// Every successful response, terminal or not, before any merging.
    fn on_update(&self, response: &ChatResponse);

    /// The terminal response, exactly once per session.
    fn on_complete(&self, response: &ChatResponse);
}

// ---------------------------------------------------------------------------
// ChatPoller
// ---------------------------------------------------------------------------

pub struct ChatPoller {
    api: Arc<dyn ChatApi>,
    handler: Arc<dyn PollHandler>,
    options: PollOptions,
    /// Current session generation
    gate: Arc<Mutex<u64>>,
    status: Arc<watch::Sender<PollStatus>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatPoller {
    pub fn new(api: Arc<dyn ChatApi>, handler: Arc<dyn PollHandler>, options: PollOptions) -> Self {
        let (status, _) = watch::channel(PollStatus::default());
        Self {
            api,
            handler,
            options,
            gate: Arc::new(Mutex::new(0)),
            status: Arc::new(status),
            task: Mutex::new(None),
        }
    }

    pub fn options(&self) -> PollOptions {
        self.options
    }

    pub fn subscribe(&self) -> watch::Receiver<PollStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    /// Start polling `target`, cancelling any current session first.
    ///
    /// An empty conversation id behaves like [`disable`](Self::disable).
    /// Must be called from within a tokio runtime.
    pub fn arm(&self, target: PollTarget) {
        if target.conversation_id.is_empty() {
            self.disable();
            return;
        }

        let mut generation = lock(&self.gate);
        *generation += 1;
        self.abort_task();

        self.status.send_replace(PollStatus {
            conversation_id: Some(target.conversation_id.clone()),
            state: PollState::Armed,
            attempts: 0,
            error: None,
            budget_exhausted: false,
        });

        tracing::info!(
            conversation_id = %target.conversation_id,
            generation = *generation,
            max_attempts = self.options.max_attempts,
            "Polling armed"
        );

        let session = PollSession {
            api: self.api.clone(),
            handler: self.handler.clone(),
            options: self.options,
            gate: self.gate.clone(),
            status: self.status.clone(),
            generation: *generation,
            target,
        };
        *lock(&self.task) = Some(tokio::spawn(session.run()));
    }

    /// Stop the current session. An armed or polling session ends in
    /// `Stopped`; finished sessions keep their final state.
    pub fn disable(&self) {
        let mut generation = lock(&self.gate);
        *generation += 1;
        self.abort_task();

        self.status.send_if_modified(|status| {
            if !status.state.is_active() {
                return false;
            }
            tracing::info!(
                conversation_id = ?status.conversation_id,
                attempts = status.attempts,
                "Polling disabled"
            );
            status.state = PollState::Stopped;
            true
        });
    }

    /// Wait until the current session leaves `Armed`/`Polling`.
    pub async fn settled(&self) -> PollStatus {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(|status| !status.state.is_active()).await {
            Ok(status) => status.clone(),
            // sender lives in self, so this only happens mid-drop
            Err(_) => self.status(),
        };
        settled
    }

    fn abort_task(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

impl Drop for ChatPoller {
    fn drop(&mut self) {
        *lock(&self.gate) += 1;
        self.abort_task();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// PollSession (the spawned loop)
// ---------------------------------------------------------------------------

enum Flow {
    Continue,
    Finished,
}

struct PollSession {
    api: Arc<dyn ChatApi>,
    handler: Arc<dyn PollHandler>,
    options: PollOptions,
    gate: Arc<Mutex<u64>>,
    status: Arc<watch::Sender<PollStatus>>,
    generation: u64,
    target: PollTarget,
}

impl PollSession {
    async fn run(self) {
        if self.options.max_attempts == 0 {
            self.guarded(|status| {
                status.state = PollState::Stopped;
                status.budget_exhausted = true;
            });
            return;
        }

        let request = ChatRequest::refresh(
            &self.target.user_id,
            &self.target.conversation_id,
            &self.target.cic_hash,
        );
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let live = self.guarded(|status| {
                status.state = PollState::Polling;
                status.attempts = attempts;
            });
            if !live {
                return;
            }

            tracing::debug!(
                conversation_id = %self.target.conversation_id,
                attempt = attempts,
                "Poll tick"
            );
            let result = self.api.chat(&request).await;

            match self.settle_tick(attempts, result) {
                Flow::Continue => tokio::time::sleep(self.options.poll_interval).await,
                Flow::Finished => return,
            }
        }
    }

    /// Apply `update` to the published status if this session is still
    /// current. Returns whether it was.
    fn guarded(&self, update: impl FnOnce(&mut PollStatus)) -> bool {
        let generation = lock(&self.gate);
        if *generation != self.generation {
            return false;
        }
        self.status.send_modify(update);
        true
    }

    fn settle_tick(&self, attempts: u32, result: ApiResult<ChatResponse>) -> Flow {
        let generation = lock(&self.gate);
        if *generation != self.generation {
            tracing::debug!(
                conversation_id = %self.target.conversation_id,
                "Discarding response from a cancelled poll session"
            );
            return Flow::Finished;
        }

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    conversation_id = %self.target.conversation_id,
                    attempt = attempts,
                    error = %e,
                    "Poll request failed"
                );
                self.status.send_modify(|status| {
                    status.state = PollState::Errored;
                    status.error = Some(e.to_string());
                });
                return Flow::Finished;
            }
        };

        self.handler.on_update(&response);

        if response.is_terminal() {
            self.handler.on_complete(&response);
            self.status.send_modify(|status| status.state = PollState::Complete);
            tracing::info!(
                conversation_id = %self.target.conversation_id,
                attempts,
                "Conversation turn complete"
            );
            return Flow::Finished;
        }

        if attempts >= self.options.max_attempts {
            self.status.send_modify(|status| {
                status.state = PollState::Stopped;
                status.budget_exhausted = true;
            });
            tracing::warn!(
                conversation_id = %self.target.conversation_id,
                attempts,
                "Poll attempt budget exhausted before a terminal response"
            );
            return Flow::Finished;
        }

        Flow::Continue
    }
}
