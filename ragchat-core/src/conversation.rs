//! Per-session conversation history.
//!
//! [`ConversationStore`] keeps an append-only log of messages for each
//! session. The session map lock is only held to look up or create a
//! session; each session then has its own message lock, so traffic on one
//! session never waits on another.
//!
//! Turn locks live apart from the session map. Taking one neither creates
//! nor evicts a session, and a session with a turn in flight is never
//! chosen for eviction.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::config::RagConfig;

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person chatting.
    User,
    /// The language model.
    Assistant,
}

impl Role {
    /// Lowercase role name.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in a session's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    /// Author of the message.
    pub role: Role,
    /// Message content.
    pub text: String,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// The session the message belongs to.
    pub session_id: String,
}

impl ConversationMessage {
    /// Create a message stamped with the current time.
    pub fn new(session_id: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self { role, text: text.into(), timestamp: Utc::now(), session_id: session_id.into() }
    }

    /// Create a user message stamped with the current time.
    pub fn user(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(session_id, Role::User, text)
    }

    /// Create an assistant message stamped with the current time.
    pub fn assistant(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(session_id, Role::Assistant, text)
    }
}

/// Held for the duration of one chat turn on a session.
pub type SessionTurnGuard = OwnedMutexGuard<()>;

#[derive(Debug)]
struct SessionState {
    messages: Mutex<VecDeque<ConversationMessage>>,
    last_touched: AtomicU64,
}

impl SessionState {
    fn new(tick: u64) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            last_touched: AtomicU64::new(tick),
        }
    }
}

/// In-memory store of conversation sessions.
///
/// Cloning the store yields another handle to the same sessions.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    sessions: Arc<RwLock<HashMap<String, Arc<SessionState>>>>,
    turns: Arc<std::sync::Mutex<HashMap<String, Weak<Mutex<()>>>>>,
    clock: Arc<AtomicU64>,
    retention: usize,
    max_sessions: Option<usize>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

impl ConversationStore {
    /// Create a store that keeps the last `retention` messages per session.
    pub fn new(retention: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            turns: Arc::new(std::sync::Mutex::new(HashMap::new())),
            clock: Arc::new(AtomicU64::new(0)),
            retention: retention.max(1),
            max_sessions: None,
        }
    }

    /// Create a store with the retention and session bound from `config`.
    pub fn from_config(config: &RagConfig) -> Self {
        let store = Self::new(config.effective_history_retention());
        match config.max_sessions {
            Some(limit) => store.with_max_sessions(limit),
            None => store,
        }
    }

    /// Evict the least recently used session when more than `limit` would exist.
    ///
    /// Sessions with a turn in flight are skipped, so the bound can be
    /// exceeded while every session is busy.
    pub fn with_max_sessions(mut self, limit: usize) -> Self {
        self.max_sessions = Some(limit.max(1));
        self
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn existing(&self, session_id: &str) -> Option<Arc<SessionState>> {
        let state = self.sessions.read().await.get(session_id).cloned()?;
        state.last_touched.store(self.tick(), Ordering::Relaxed);
        Some(state)
    }

    async fn get_or_create(&self, session_id: &str) -> Arc<SessionState> {
        if let Some(state) = self.existing(session_id).await {
            return state;
        }

        let mut sessions = self.sessions.write().await;
        if let Some(state) = sessions.get(session_id) {
            return Arc::clone(state);
        }

        if let Some(limit) = self.max_sessions {
            let busy = self.busy_sessions();
            while sessions.len() >= limit {
                let Some(stalest) = sessions
                    .iter()
                    .filter(|(id, _)| !busy.contains(id.as_str()))
                    .min_by_key(|(_, s)| s.last_touched.load(Ordering::Relaxed))
                    .map(|(id, _)| id.clone())
                else {
                    debug!(limit, "every session is busy, exceeding session limit");
                    break;
                };
                sessions.remove(&stalest);
                debug!(session.id = %stalest, "evicted least recently used session");
            }
        }

        let state = Arc::new(SessionState::new(self.tick()));
        sessions.insert(session_id.to_string(), Arc::clone(&state));
        state
    }

    fn turn_registry(&self) -> MutexGuard<'_, HashMap<String, Weak<Mutex<()>>>> {
        self.turns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sessions whose turn lock is held or awaited.
    fn busy_sessions(&self) -> HashSet<String> {
        self.turn_registry()
            .iter()
            .filter(|(_, turn)| turn.strong_count() > 0)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ensure a session exists, generating a UUID when no id is given.
    pub async fn create_session(&self, session_id: Option<&str>) -> String {
        let session_id = resolve_session_id(session_id);
        self.get_or_create(&session_id).await;
        session_id
    }

    /// Append a message to a session, creating the session if absent.
    pub async fn append(&self, session_id: &str, message: ConversationMessage) {
        self.append_all(session_id, [message]).await;
    }

    /// Append a user message and its reply as one unit.
    ///
    /// Readers see either neither message or both.
    pub async fn append_turn(
        &self,
        session_id: &str,
        user: ConversationMessage,
        assistant: ConversationMessage,
    ) {
        self.append_all(session_id, [user, assistant]).await;
    }

    async fn append_all<const N: usize>(
        &self,
        session_id: &str,
        messages: [ConversationMessage; N],
    ) {
        let state = self.get_or_create(session_id).await;
        let mut log = state.messages.lock().await;
        for mut message in messages {
            message.session_id = session_id.to_string();
            log.push_back(message);
        }
        while log.len() > self.retention {
            log.pop_front();
        }
    }

    /// The last `min(window, len)` messages of a session, oldest first.
    ///
    /// An unknown session yields an empty list.
    pub async fn recent_window(&self, session_id: &str, window: usize) -> Vec<ConversationMessage> {
        let Some(state) = self.existing(session_id).await else {
            return Vec::new();
        };
        let log = state.messages.lock().await;
        let skip = log.len().saturating_sub(window);
        log.iter().skip(skip).cloned().collect()
    }

    /// Every retained message of a session, oldest first.
    pub async fn history(&self, session_id: &str) -> Vec<ConversationMessage> {
        self.recent_window(session_id, usize::MAX).await
    }

    /// Number of retained messages in a session.
    pub async fn message_count(&self, session_id: &str) -> usize {
        let state = self.sessions.read().await.get(session_id).cloned();
        match state {
            Some(state) => state.messages.lock().await.len(),
            None => 0,
        }
    }

    /// Whether the session exists.
    pub async fn session_exists(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Drop a session and its history. Returns `false` if it did not exist.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// IDs of all live sessions, sorted.
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Acquire the turn lock of a session.
    ///
    /// Turns on the same session are serialised by this lock; turns on other
    /// sessions proceed independently. The session itself is not created, so
    /// a turn that never appends leaves no trace. Dropping the guard
    /// releases it.
    pub async fn lock_session(&self, session_id: &str) -> SessionTurnGuard {
        let turn = {
            let mut turns = self.turn_registry();
            turns.retain(|_, turn| turn.strong_count() > 0);
            match turns.get(session_id).and_then(Weak::upgrade) {
                Some(turn) => turn,
                None => {
                    let turn = Arc::new(Mutex::new(()));
                    turns.insert(session_id.to_string(), Arc::downgrade(&turn));
                    turn
                }
            }
        };
        turn.lock_owned().await
    }
}

/// The given session id, or a fresh UUID when it is absent or empty.
pub(crate) fn resolve_session_id(session_id: Option<&str>) -> String {
    match session_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}
