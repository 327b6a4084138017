//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /api/v1/chat`            Send a message, get the assistant's reply
//! - `GET  /api/v1/health`          Liveness and version
//! - `GET  /api/v1/sessions/{id}`   Stage, facts, and turn log of a session

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use chatdesk_core::error::Error;
use chatdesk_core::session::{BusinessFacts, ConversationStatus, SessionId, SessionStatus, Stage};
use chatdesk_core::turn::Turn;

use crate::SharedState;

/// Shown when a run fails for reasons the user can retry.
const RETRY_LATER: &str =
    "The assistant could not complete your request right now. Please try again in a moment.";

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/api/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .route("/sessions/{id}", get(get_session_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub message: String,
    pub conversation_status: ConversationStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub stage: Stage,
    pub status: SessionStatus,
    pub conversation_status: ConversationStatus,
    pub facts: BusinessFacts,
    pub turns: Vec<Turn>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message must not be empty"));
    }
    let chars = payload.message.chars().count();
    if chars > state.max_message_chars {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!(
                "message is too long ({chars} characters, maximum {})",
                state.max_message_chars
            ),
        ));
    }

    let session_id = payload
        .session_id
        .filter(|id| !id.trim().is_empty())
        .map(SessionId::from);
    info!(
        session_id = session_id.as_ref().map(|id| id.as_str()).unwrap_or("new"),
        chars,
        "chat request"
    );

    let reply = state
        .service
        .handle(&payload.message, session_id)
        .await
        .map_err(error_response)?;

    Ok(Json(ChatResponse {
        session_id: reply.session_id.to_string(),
        message: reply.message,
        conversation_status: reply.status,
    }))
}

fn error_response(e: Error) -> ApiError {
    match e {
        Error::OrchestrationExhausted { .. } | Error::ModelTimeout { .. } | Error::Provider(_) => {
            warn!(error = %e, "Chat run failed");
            api_error(StatusCode::SERVICE_UNAVAILABLE, RETRY_LATER)
        }
        other => {
            error!(error = %other, "Chat request failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}

async fn get_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .service
        .session(&SessionId::from(id))
        .await
        .map_err(error_response)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "session not found"))?;

    Ok(Json(SessionResponse {
        session_id: session.id.to_string(),
        stage: session.stage,
        status: session.status,
        conversation_status: session.conversation_status(),
        turns: session.context.snapshot().to_vec(),
        facts: session.facts,
        created_at: session.created_at,
        updated_at: session.updated_at,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::GatewayState;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chatdesk_agent::{ChatService, Orchestrator};
    use chatdesk_core::error::ProviderError;
    use chatdesk_core::event::EventBus;
    use chatdesk_core::provider::{ModelRequest, ModelResponse, Provider, RequestedCall};
    use chatdesk_store::InMemoryStore;
    use http_body_util::BodyExt;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    /// Replays scripted responses, then answers "ok".
    struct MockProvider {
        script: Mutex<Vec<Result<ModelResponse, ProviderError>>>,
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, ProviderError> {
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(ModelResponse::text("ok")))
        }
    }

    pub(crate) fn test_state(mut script: Vec<Result<ModelResponse, ProviderError>>) -> SharedState {
        script.reverse();
        let provider = Arc::new(MockProvider {
            script: Mutex::new(script),
        });
        let tools = chatdesk_tools::default_registry(&["kossodo".into(), "kossomet".into()]).unwrap();
        let orchestrator = Orchestrator::new(provider, Arc::new(tools), Arc::new(EventBus::default()))
            .with_max_iterations(3);
        let service = ChatService::new(Arc::new(InMemoryStore::new()), orchestrator);
        GatewayState::new(Arc::new(service), 50)
    }

    fn chat_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn set_company(unit: &str) -> Result<ModelResponse, ProviderError> {
        Ok(ModelResponse::tool_calls(vec![RequestedCall::new(
            "c1",
            "set_company",
            serde_json::json!({ "company": unit })
                .as_object()
                .cloned()
                .unwrap(),
        )]))
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = v1_router(test_state(vec![]));
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = json(response).await;
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn chat_starts_and_continues_a_session() {
        let state = test_state(vec![
            set_company("kossodo"),
            Ok(ModelResponse::text("What's your name and contact info?")),
        ]);

        let response = v1_router(state.clone())
            .oneshot(chat_request(serde_json::json!({"message": "I need a balance quote"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first: ChatResponse = json(response).await;
        assert_eq!(first.message, "What's your name and contact info?");
        assert_eq!(first.conversation_status, ConversationStatus::Active);
        assert!(!first.session_id.is_empty());

        let response = v1_router(state.clone())
            .oneshot(chat_request(serde_json::json!({
                "message": "Ana Torres",
                "session_id": first.session_id,
            })))
            .await
            .unwrap();
        let second: ChatResponse = json(response).await;
        assert_eq!(second.session_id, first.session_id);

        let req = Request::builder()
            .uri(format!("/sessions/{}", first.session_id))
            .body(Body::empty())
            .unwrap();
        let response = v1_router(state).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session: SessionResponse = json(response).await;
        assert_eq!(session.stage, Stage::Collecting);
        assert_eq!(session.facts.company.as_deref(), Some("kossodo"));
        assert_eq!(session.turns.len(), 6);
    }

    #[tokio::test]
    async fn empty_message_is_bad_request() {
        let response = v1_router(test_state(vec![]))
            .oneshot(chat_request(serde_json::json!({"message": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn long_message_is_bad_request() {
        let response = v1_router(test_state(vec![]))
            .oneshot(chat_request(serde_json::json!({"message": "x".repeat(51)})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = json(response).await;
        assert!(err.error.contains("too long"));
    }

    #[tokio::test]
    async fn exhausted_run_is_unavailable() {
        let script = (0..3).map(|_| set_company("nowhere")).collect();
        let response = v1_router(test_state(script))
            .oneshot(chat_request(serde_json::json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let err: ErrorResponse = json(response).await;
        assert_eq!(err.error, RETRY_LATER);
    }

    #[tokio::test]
    async fn provider_failure_is_unavailable() {
        let script = vec![Err(ProviderError::Network("connection reset".into()))];
        let response = v1_router(test_state(script))
            .oneshot(chat_request(serde_json::json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let req = Request::builder()
            .uri("/sessions/does-not-exist")
            .body(Body::empty())
            .unwrap();
        let response = v1_router(test_state(vec![])).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = v1_router(test_state(vec![])).oneshot(req).await.unwrap();
        assert!(response.status().is_client_error());
    }
}
