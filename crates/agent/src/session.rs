//! Session registry. Each session owns its conversation memory behind its
//! own mutex, so turns in one session never wait on another.

use std::collections::HashMap;
use std::sync::Arc;

use carwise_core::message::SessionId;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::conversation::ConversationMemory;

pub type SharedMemory = Arc<Mutex<ConversationMemory>>;

pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SharedMemory>>,
    window: usize,
}

impl SessionStore {
    /// `window` is the number of exchanges each new session keeps.
    pub fn new(window: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            window,
        }
    }

    /// Start a fresh session and return its id.
    pub async fn create(&self) -> SessionId {
        let id = SessionId::new();
        self.get_or_create(&id).await;
        id
    }

    /// Memory for `id`, created empty on first use.
    pub async fn get_or_create(&self, id: &SessionId) -> SharedMemory {
        if let Some(memory) = self.sessions.read().await.get(id) {
            return memory.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(session_id = %id, "Session created");
                Arc::new(Mutex::new(ConversationMemory::new(self.window)))
            })
            .clone()
    }

    pub async fn get(&self, id: &SessionId) -> Option<SharedMemory> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Clear a session's history. Returns `false` if it does not exist.
    pub async fn reset(&self, id: &SessionId) -> bool {
        let Some(memory) = self.get(id).await else {
            return false;
        };
        memory.lock().await.reset();
        true
    }

    pub async fn remove(&self, id: &SessionId) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(5)
    }
}
