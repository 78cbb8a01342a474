//! Live session lifecycle
//!
//! One registry owns every running session. Lifecycle transitions travel
//! over a per-session `watch` channel that the session loop observes at
//! poll boundaries: Running and Paused flip back and forth, Removed is
//! terminal. Pause and resume are idempotent; operations on unknown
//! symbols report not-found instead of failing.

use std::collections::HashMap;

use tokio::sync::{watch, RwLock};
use tracing::info;

/// Session lifecycle state, observed by the loop at poll boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Paused,
    Removed,
}

struct SessionHandle {
    status_tx: watch::Sender<SessionState>,
}

/// Owns all live sessions, keyed by trading symbol.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and hand back the status receiver its loop will
    /// watch. Returns `None` when the symbol already has a session.
    pub async fn insert(&self, symbol: &str) -> Option<watch::Receiver<SessionState>> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(symbol) {
            return None;
        }
        let (status_tx, status_rx) = watch::channel(SessionState::Running);
        sessions.insert(symbol.to_string(), SessionHandle { status_tx });
        info!(symbol, "session registered");
        Some(status_rx)
    }

    /// Pause a running session. Returns false for unknown symbols.
    pub async fn pause(&self, symbol: &str) -> bool {
        self.set_state(symbol, SessionState::Paused).await
    }

    /// Resume a paused session. Returns false for unknown symbols.
    pub async fn resume(&self, symbol: &str) -> bool {
        self.set_state(symbol, SessionState::Running).await
    }

    /// Remove a session: signals Removed and drops the registry entry.
    /// The loop exits at its next poll boundary. Returns false for
    /// unknown symbols.
    pub async fn remove(&self, symbol: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(handle) = sessions.remove(symbol) else {
            return false;
        };
        // The loop may already be gone; a closed channel is fine
        let _ = handle.status_tx.send(SessionState::Removed);
        info!(symbol, "session removed");
        true
    }

    pub async fn contains(&self, symbol: &str) -> bool {
        self.sessions.read().await.contains_key(symbol)
    }

    pub async fn symbols(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    async fn set_state(&self, symbol: &str, state: SessionState) -> bool {
        let sessions = self.sessions.read().await;
        let Some(handle) = sessions.get(symbol) else {
            return false;
        };
        let _ = handle.status_tx.send(state);
        info!(symbol, ?state, "session state changed");
        true
    }
}
