//! Session store implementations for chatdesk.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;

use chatdesk_config::StoreConfig;
use chatdesk_core::error::StoreError;
use chatdesk_core::store::SessionStore;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Open the backend named by `[store]`.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn SessionStore>, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteStore::open(&config.resolved_path()).await?)),
        other => Err(StoreError::Storage(format!(
            "store backend '{other}' is not available in this build"
        ))),
    }
}
