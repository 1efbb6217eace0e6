//! Session Manager (§4.7): bounds how many concurrent conversations the
//! engine tracks, evicts idle ones, and keeps each session's turn
//! history within a fixed window. Grounded on the distilled original's
//! `instability_mcp/session_manager.py`, whose numeric defaults (ten
//! sessions, one-hour idle timeout, a five-minute sweep) are kept as-is.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::orchestrator::{ChatMessage, Orchestrator, TurnOutcome};

/// Sessions evicted beyond this count are the least-recently-active
/// (§4.7 "capacity N=10 default").
const DEFAULT_MAX_SESSIONS: usize = 10;
/// Idle time after which a session is eligible for the cleanup sweep.
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(3600);
/// Interval between cleanup sweeps.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
/// Conversation turns kept per session; older turns are dropped once a
/// session exceeds this, mirroring the original's flat 20-entry cap
/// (both user and assistant turns count toward it).
const MAX_HISTORY_TURNS: usize = 20;

/// Corrective note injected in place of a recorded reply when the model
/// answered a network-related question without calling a tool (§4.8
/// step 3: "do not record it, inject a corrective system note, and end
/// the turn").
const PROTOCOL_VIOLATION_NOTE: &str =
    "That looked like a network-diagnostics question, but no tool was called. \
     Tool calls MUST be used for network questions — never fabricate results.";

#[derive(Debug, Clone, serde::Serialize)]
pub struct HistoryTurn {
    pub role: &'static str,
    pub content: String,
    pub timestamp: String,
}

/// A single tracked conversation.
pub struct Session {
    pub id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
    pub history: Vec<HistoryTurn>,
}

impl Session {
    fn new(id: String) -> Self {
        let now = chrono::Utc::now();
        Self { id, created_at: now, last_activity: now, history: Vec::new() }
    }

    fn push_turn(&mut self, role: &'static str, content: String) {
        self.history.push(HistoryTurn { role, content, timestamp: chrono::Utc::now().to_rfc3339() });
        if self.history.len() > MAX_HISTORY_TURNS {
            let overflow = self.history.len() - MAX_HISTORY_TURNS;
            self.history.drain(0..overflow);
        }
    }

    fn as_chat_messages(&self) -> Vec<ChatMessage> {
        self.history
            .iter()
            .filter(|turn| turn.role == "user" || turn.role == "assistant" || turn.role == "system")
            .map(|turn| ChatMessage { role: turn.role, content: turn.content.clone() })
            .collect()
    }
}

/// Manages the session table: lookup-or-create, LRU eviction at
/// capacity, and a lazily started background sweep of idle sessions.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    max_sessions: usize,
    session_timeout: Duration,
    orchestrator: Arc<Orchestrator>,
    cleanup_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Arc<Self> {
        Self::with_limits(orchestrator, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TIMEOUT)
    }

    pub fn with_limits(orchestrator: Arc<Orchestrator>, max_sessions: usize, session_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            session_timeout,
            orchestrator,
            cleanup_handle: Mutex::new(None),
        })
    }

    /// Starts the cleanup sweep the first time a session is created,
    /// matching the original's "don't start in `__init__`" behavior.
    async fn ensure_cleanup_started(self: &Arc<Self>) {
        let mut handle = self.cleanup_handle.lock().await;
        if handle.is_some() {
            return;
        }
        let manager = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(CLEANUP_INTERVAL).await;
                manager.evict_expired().await;
            }
        }));
    }

    async fn evict_expired(&self) {
        let now = chrono::Utc::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| {
            (now - session.last_activity).num_seconds() <= self.session_timeout.as_secs() as i64
        });
    }

    /// Looks up `session_id` if given and present, otherwise creates a
    /// fresh session. Touches `last_activity` either way.
    pub async fn get_or_create_session(self: &Arc<Self>, session_id: Option<&str>) -> String {
        self.ensure_cleanup_started().await;

        if let Some(id) = session_id {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(id) {
                session.last_activity = chrono::Utc::now();
                return id.to_string();
            }
        }
        self.create_session().await
    }

    /// Creates a new session, evicting the least-recently-active one
    /// first if the table is already at capacity.
    pub async fn create_session(&self) -> String {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            if let Some(oldest_id) = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_activity)
                .map(|(id, _)| id.clone())
            {
                sessions.remove(&oldest_id);
            }
        }
        let id = Uuid::new_v4().to_string();
        sessions.insert(id.clone(), Session::new(id.clone()));
        id
    }

    pub async fn get_session(&self, session_id: Option<&str>) -> Option<String> {
        let Some(id) = session_id else { return None };
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id)?;
        session.last_activity = chrono::Utc::now();
        Some(session.id.clone())
    }

    pub async fn active_session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Runs one user turn against a session's history through the
    /// orchestrator, then records the user prompt and the reply — or,
    /// if the orchestrator flagged a protocol violation, a corrective
    /// system note in place of the unrecorded fabricated reply (§4.8
    /// step 3).
    pub async fn process_message(
        &self,
        session_id: &str,
        prompt: &str,
        include_thinking: bool,
        timeout: Duration,
    ) -> Option<TurnOutcome> {
        let history = {
            let mut sessions = self.sessions.write().await;
            let session = sessions.get_mut(session_id)?;
            session.last_activity = chrono::Utc::now();
            session.push_turn("user", prompt.to_string());
            session.as_chat_messages()
        };

        let mut outcome = self.orchestrator.process_turn(&history, prompt, timeout).await;
        if !include_thinking {
            outcome.thinking = None;
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            if outcome.protocol_violation {
                session.push_turn("system", PROTOCOL_VIOLATION_NOTE.to_string());
            } else {
                session.push_turn("assistant", outcome.content.clone());
            }
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolRegistry;

    fn test_manager(max_sessions: usize) -> Arc<SessionManager> {
        let client = Arc::new(crate::orchestrator::MockLlmClient::new("ack"));
        let orchestrator = Arc::new(Orchestrator::new(client, Arc::new(ToolRegistry::new())));
        SessionManager::with_limits(orchestrator, max_sessions, DEFAULT_SESSION_TIMEOUT)
    }

    #[tokio::test]
    async fn protocol_violation_is_not_recorded_as_an_assistant_turn() {
        let client = Arc::new(crate::orchestrator::MockLlmClient::new(
            "I can help in general terms, no tool needed.",
        ));
        let orchestrator = Arc::new(Orchestrator::new(client, Arc::new(ToolRegistry::new())));
        let manager = SessionManager::with_limits(orchestrator, 10, DEFAULT_SESSION_TIMEOUT);
        let id = manager.get_or_create_session(None).await;

        let outcome = manager
            .process_message(&id, "what's my ping to example.com?", true, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(outcome.protocol_violation);

        let sessions = manager.sessions.read().await;
        let session = sessions.get(&id).unwrap();
        assert!(session.history.iter().all(|t| t.role != "assistant"));
        let note = session.history.iter().find(|t| t.role == "system").unwrap();
        assert_eq!(note.content, PROTOCOL_VIOLATION_NOTE);
    }

    #[tokio::test]
    async fn creates_and_reuses_a_session() {
        let manager = test_manager(10);
        let id = manager.get_or_create_session(None).await;
        let reused = manager.get_or_create_session(Some(&id)).await;
        assert_eq!(id, reused);
        assert_eq!(manager.active_session_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_session_id_creates_a_new_one() {
        let manager = test_manager(10);
        let id = manager.get_or_create_session(Some("does-not-exist")).await;
        assert_ne!(id, "does-not-exist");
    }

    #[tokio::test]
    async fn evicts_least_recently_active_session_at_capacity() {
        let manager = test_manager(2);
        let first = manager.create_session().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _second = manager.create_session().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _third = manager.create_session().await;
        assert_eq!(manager.active_session_count().await, 2);
        assert!(manager.get_session(Some(&first)).await.is_none());
    }

    #[tokio::test]
    async fn history_is_capped_at_max_turns() {
        let manager = test_manager(10);
        let id = manager.get_or_create_session(None).await;
        for i in 0..15 {
            manager.process_message(&id, &format!("message {i}"), true, Duration::from_secs(5)).await;
        }
        let sessions = manager.sessions.read().await;
        let session = sessions.get(&id).unwrap();
        assert!(session.history.len() <= MAX_HISTORY_TURNS);
    }
}
