//! In-memory store: useful for testing and ephemeral deployments.

use async_trait::async_trait;
use chatdesk_core::error::StoreError;
use chatdesk_core::session::{Session, SessionId};
use chatdesk_core::store::SessionStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps sessions in a map. Contents are lost when the process exits.
#[derive(Clone)]
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.read().await.len())
    }
}
