//! Chat service: session lifecycle around the orchestrator.
//!
//! Loads the session, runs one message through the orchestrator, saves the
//! result. Runs against the same session are serialized by a per-session
//! mutex held from load to save; distinct sessions proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chatdesk_core::error::Error;
use chatdesk_core::session::{ConversationStatus, Session, SessionId, SessionStatus};
use chatdesk_core::store::SessionStore;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::orchestrator::Orchestrator;
use crate::prompt::CONVERSATION_CLOSED_REPLY;

/// What the caller gets back for one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub session_id: SessionId,
    pub message: String,
    pub status: ConversationStatus,
}

pub struct ChatService {
    store: Arc<dyn SessionStore>,
    orchestrator: Orchestrator,
    idle_timeout: Duration,
    locks: RwLock<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl ChatService {
    pub fn new(store: Arc<dyn SessionStore>, orchestrator: Orchestrator) -> Self {
        Self {
            store,
            orchestrator,
            idle_timeout: Duration::from_secs(900),
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Sessions idle for longer than this are replaced. Zero disables expiry.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Handle one user message.
    ///
    /// Without a session id, or with one that is unknown or expired, a new
    /// session is started under a fresh id.
    pub async fn handle(
        &self,
        message: &str,
        session_id: Option<SessionId>,
    ) -> Result<ChatReply, Error> {
        let Some(id) = session_id else {
            return self.converse(Session::new(SessionId::new()), message).await;
        };

        let lock = self.lock_for(&id).await;
        let result = {
            let _guard = lock.lock().await;
            match self.resume(&id).await {
                Ok(session) => self.converse(session, message).await,
                Err(e) => Err(e),
            }
        };
        self.release(&id, &lock).await;
        result
    }

    /// Read-only view of a stored session.
    pub async fn session(&self, id: &SessionId) -> Result<Option<Session>, Error> {
        Ok(self.store.load(id).await?)
    }

    async fn resume(&self, id: &SessionId) -> Result<Session, Error> {
        match self.store.load(id).await? {
            Some(mut session) if session.is_idle_expired(self.idle_timeout, Utc::now()) => {
                info!(session_id = %id, stage = %session.stage, "Session expired after idle timeout");
                session.status = SessionStatus::Expired;
                session.updated_at = Utc::now();
                self.store.save(&session).await?;
                Ok(Session::new(SessionId::new()))
            }
            Some(session) if session.status == SessionStatus::Expired => {
                debug!(session_id = %id, "Expired session referenced; starting a new one");
                Ok(Session::new(SessionId::new()))
            }
            Some(session) => Ok(session),
            None => {
                debug!(session_id = %id, "Unknown session id; starting a new one");
                Ok(Session::new(SessionId::new()))
            }
        }
    }

    async fn converse(&self, mut session: Session, message: &str) -> Result<ChatReply, Error> {
        match self.orchestrator.run(&mut session, message).await {
            Ok(text) => {
                session.touch();
                self.store.save(&session).await?;
                Ok(ChatReply {
                    session_id: session.id.clone(),
                    message: text,
                    status: session.conversation_status(),
                })
            }
            Err(Error::SessionAlreadyEnded { session_id }) => {
                debug!(session_id = %session_id, "Message for a closed conversation");
                Ok(ChatReply {
                    session_id: session.id.clone(),
                    message: CONVERSATION_CLOSED_REPLY.to_string(),
                    status: ConversationStatus::Ended,
                })
            }
            Err(e) => {
                // Keep whatever the run committed before failing
                session.touch();
                if let Err(store_err) = self.store.save(&session).await {
                    warn!(session_id = %session.id, error = %store_err, "Failed to save session after error");
                }
                Err(e)
            }
        }
    }

    async fn lock_for(&self, id: &SessionId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(id) {
            return lock.clone();
        }
        self.locks
            .write()
            .await
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry once nobody else holds or waits on it.
    async fn release(&self, id: &SessionId, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.write().await;
        let idle = locks
            .get(id)
            .is_some_and(|entry| Arc::ptr_eq(entry, lock) && Arc::strong_count(entry) <= 2);
        if idle {
            locks.remove(id);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatdesk_core::error::ProviderError;
    use chatdesk_core::event::EventBus;
    use chatdesk_core::provider::{ModelRequest, ModelResponse, Provider, RequestedCall};
    use chatdesk_core::session::Stage;
    use chatdesk_store::InMemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers with the number of user turns it has seen, after an optional
    /// delay, tracking how many invocations overlap.
    struct CountingProvider {
        delay: Duration,
        in_flight: AtomicU32,
        max_in_flight: AtomicU32,
        calls: AtomicU32,
    }

    impl CountingProvider {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                in_flight: AtomicU32::new(0),
                max_in_flight: AtomicU32::new(0),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Provider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let users = request
                .turns
                .iter()
                .filter(|t| matches!(t, chatdesk_core::turn::Turn::UserText { .. }))
                .count();
            Ok(ModelResponse::text(format!("reply {users}")))
        }
    }

    struct LoopingProvider;

    #[async_trait]
    impl Provider for LoopingProvider {
        fn name(&self) -> &str {
            "looping"
        }

        async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
            Ok(ModelResponse::tool_calls(vec![RequestedCall::new(
                format!("c{}", request.turns.len()),
                "set_company",
                serde_json::json!({"company": "kossodo"})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            )]))
        }
    }

    fn service(provider: Arc<dyn Provider>, store: Arc<InMemoryStore>) -> ChatService {
        let tools = chatdesk_tools::default_registry(&["kossodo".into(), "kossomet".into()]).unwrap();
        let orchestrator = Orchestrator::new(provider, Arc::new(tools), Arc::new(EventBus::default()));
        ChatService::new(store, orchestrator)
    }

    #[tokio::test]
    async fn new_session_is_created_and_saved() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(CountingProvider::new(Duration::ZERO), store.clone());

        let reply = svc.handle("hello", None).await.unwrap();
        assert_eq!(reply.message, "reply 1");
        assert_eq!(reply.status, ConversationStatus::Active);

        let saved = store.load(&reply.session_id).await.unwrap().unwrap();
        assert_eq!(saved.context.len(), 2);
    }

    #[tokio::test]
    async fn same_session_continues() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(CountingProvider::new(Duration::ZERO), store.clone());

        let first = svc.handle("hello", None).await.unwrap();
        let second = svc
            .handle("again", Some(first.session_id.clone()))
            .await
            .unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.message, "reply 2");
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(svc.tracked_locks().await, 0);
    }

    #[tokio::test]
    async fn unknown_id_gets_fresh_session() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(CountingProvider::new(Duration::ZERO), store);

        let reply = svc
            .handle("hello", Some(SessionId::from("made-up")))
            .await
            .unwrap();
        assert_ne!(reply.session_id.as_str(), "made-up");
    }

    #[tokio::test]
    async fn ended_session_gets_closed_reply() {
        let store = Arc::new(InMemoryStore::new());
        let provider = CountingProvider::new(Duration::ZERO);
        let svc = service(provider.clone(), store.clone());

        let mut ended = Session::new(SessionId::from("done"));
        ended.stage = Stage::Ended;
        ended.status = SessionStatus::Ended;
        store.save(&ended).await.unwrap();

        let reply = svc.handle("hello?", Some(ended.id.clone())).await.unwrap();
        assert_eq!(reply.session_id, ended.id);
        assert_eq!(reply.status, ConversationStatus::Ended);
        assert_eq!(reply.message, CONVERSATION_CLOSED_REPLY);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn idle_session_is_expired_and_replaced() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(CountingProvider::new(Duration::ZERO), store.clone())
            .with_idle_timeout(Duration::from_secs(60));

        let mut stale = Session::new(SessionId::from("stale"));
        stale.updated_at = Utc::now() - chrono::Duration::minutes(10);
        store.save(&stale).await.unwrap();

        let reply = svc.handle("hello", Some(stale.id.clone())).await.unwrap();
        assert_ne!(reply.session_id, stale.id);
        assert_eq!(reply.message, "reply 1");

        let old = store.load(&stale.id).await.unwrap().unwrap();
        assert_eq!(old.status, SessionStatus::Expired);

        // Referencing the expired id again also starts over
        let again = svc.handle("hi", Some(stale.id.clone())).await.unwrap();
        assert_ne!(again.session_id, stale.id);
    }

    #[tokio::test]
    async fn failed_run_is_saved_and_surfaced() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(Arc::new(LoopingProvider), store.clone());

        let mut session = Session::new(SessionId::from("s1"));
        session.context.append(chatdesk_core::turn::Turn::user("earlier")).unwrap();
        session
            .context
            .append(chatdesk_core::turn::Turn::model_text("earlier reply"))
            .unwrap();
        store.save(&session).await.unwrap();

        let err = svc.handle("go", Some(session.id.clone())).await.unwrap_err();
        assert!(matches!(err, Error::OrchestrationExhausted { iterations: 10 }));

        // First call advanced the stage; later ones were rejected as out of stage
        let saved = store.load(&session.id).await.unwrap().unwrap();
        assert_eq!(saved.stage, Stage::Collecting);
        assert_eq!(saved.context.len(), 2 + 1 + 20);
    }

    #[tokio::test(start_paused = true)]
    async fn same_session_runs_are_serialized() {
        let store = Arc::new(InMemoryStore::new());
        let provider = CountingProvider::new(Duration::from_millis(100));
        let svc = Arc::new(service(provider.clone(), store.clone()));

        let first = svc.handle("hello", None).await.unwrap();
        let id = first.session_id.clone();

        let (a, b) = tokio::join!(
            svc.handle("one", Some(id.clone())),
            svc.handle("two", Some(id.clone()))
        );
        let mut replies = vec![a.unwrap().message, b.unwrap().message];
        replies.sort();
        assert_eq!(replies, ["reply 2", "reply 3"]);
        assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 1);

        let saved = store.load(&id).await.unwrap().unwrap();
        assert_eq!(saved.context.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_sessions_run_in_parallel() {
        let store = Arc::new(InMemoryStore::new());
        let provider = CountingProvider::new(Duration::from_millis(100));
        let svc = service(provider.clone(), store);

        let (a, b) = tokio::join!(
            svc.handle("one", Some(SessionId::from("a"))),
            svc.handle("two", Some(SessionId::from("b")))
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 2);
    }
}
