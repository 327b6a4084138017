//! SessionStore trait: durable persistence of sessions.
//!
//! The store is called by the chat service before and after an
//! orchestration run; the loop itself never touches it.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::session::{Session, SessionId};

/// Implementations: SQLite, in-memory (for testing).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Load a session by ID. `Ok(None)` when it does not exist.
    async fn load(&self, id: &SessionId) -> std::result::Result<Option<Session>, StoreError>;

    /// Insert or replace a session.
    async fn save(&self, session: &Session) -> std::result::Result<(), StoreError>;

    /// Number of stored sessions.
    async fn count(&self) -> std::result::Result<usize, StoreError>;
}
