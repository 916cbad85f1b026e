//! Watch sessions and their registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Watching,
    /// Source failed; reconnecting with backoff
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Watching => "watching",
            SessionState::Error => "error",
        }
    }
}

/// A live subscription for one project root
#[derive(Debug)]
pub struct WatchSession {
    pub id: String,
    pub root: PathBuf,
    state: Mutex<SessionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WatchSession {
    pub fn new(root: impl Into<PathBuf>, state: SessionState) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            root: root.into(),
            state: Mutex::new(state),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn is_active(&self) -> bool {
        self.state() != SessionState::Idle
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn attach(&self, task: JoinHandle<()>) {
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Cancels outstanding work and hands back the task to await.
    pub fn deactivate(&self) -> Option<JoinHandle<()>> {
        self.cancel.cancel();
        self.set_state(SessionState::Idle);
        self.task.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            root: self.root.clone(),
            state: self.state(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub root: PathBuf,
    pub state: SessionState,
}

/// Sessions by id. At most one active session per root.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<WatchSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `session`, dropping inactive sessions left for its root.
    pub fn register(&self, session: Arc<WatchSession>) {
        let mut sessions = self.lock();
        sessions.retain(|_, s| s.root != session.root || s.is_active());
        sessions.insert(session.id.clone(), session);
    }

    pub fn get(&self, id: &str) -> Option<Arc<WatchSession>> {
        self.lock().get(id).cloned()
    }

    pub fn active_for(&self, root: &Path) -> Option<Arc<WatchSession>> {
        self.lock()
            .values()
            .find(|s| s.root == root && s.is_active())
            .cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<WatchSession>> {
        self.lock().remove(id)
    }

    /// Active sessions, ordered by root.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .lock()
            .values()
            .filter(|s| s.is_active())
            .map(|s| s.info())
            .collect();
        infos.sort_by(|a, b| a.root.cmp(&b.root));
        infos
    }

    pub fn drain(&self) -> Vec<Arc<WatchSession>> {
        self.lock().drain().map(|(_, s)| s).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<WatchSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let session = WatchSession::new("/p", SessionState::Watching);
        assert!(!session.id.is_empty());
        assert!(session.is_active());

        let token = session.cancel_token();
        assert!(session.deactivate().is_none());
        assert!(token.is_cancelled());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_registry_one_active_per_root() {
        let registry = SessionRegistry::new();
        let first = Arc::new(WatchSession::new("/p", SessionState::Watching));
        registry.register(first.clone());
        assert_eq!(registry.active_for(Path::new("/p")).unwrap().id, first.id);

        first.deactivate();
        assert!(registry.active_for(Path::new("/p")).is_none());
        assert!(registry.list().is_empty());

        let second = Arc::new(WatchSession::new("/p", SessionState::Watching));
        registry.register(second.clone());
        // The stale session was dropped on registration
        assert!(registry.get(&first.id).is_none());
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_error_state_counts_as_active() {
        let registry = SessionRegistry::new();
        let session = Arc::new(WatchSession::new("/q", SessionState::Error));
        registry.register(session);
        assert!(registry.active_for(Path::new("/q")).is_some());
    }
}
