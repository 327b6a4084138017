//! HTTP gateway for chatdesk.
//!
//! Exposes the chat endpoint, a health check, and a read-only session view
//! under `/api/v1`.
//!
//! Built on Axum.

pub mod api_v1;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use chatdesk_agent::{ChatService, Orchestrator};
use chatdesk_config::AppConfig;
use chatdesk_core::event::EventBus;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub service: Arc<ChatService>,

    /// Longest accepted chat message, in characters
    pub max_message_chars: usize,

    pub started_at: chrono::DateTime<chrono::Utc>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(service: Arc<ChatService>, max_message_chars: usize) -> SharedState {
        Arc::new(Self {
            service,
            max_message_chars,
            started_at: chrono::Utc::now(),
        })
    }
}

/// Build the full router.
///
/// Layers applied:
/// - CORS restricted to the configured origins
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState, cors_origins: &[String]) -> Router {
    Router::new()
        .nest("/api/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors_layer(cors_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// CORS for the listed origins. Entries that are not valid header values,
/// and the `*` wildcard, are skipped.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.trim() {
            "*" => {
                warn!("Ignoring wildcard CORS origin; list origins explicitly");
                None
            }
            origin => match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            },
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Wire provider, tools, store, and orchestrator from configuration.
pub async fn build_service(config: &AppConfig) -> Result<Arc<ChatService>, Box<dyn std::error::Error>> {
    let provider = chatdesk_providers::router::build_from_config(config)?;
    let tools = Arc::new(chatdesk_tools::default_registry(&config.business.units)?);
    let store = chatdesk_store::open(&config.store).await?;
    let event_bus = Arc::new(EventBus::default());

    info!(
        provider = %provider.name(),
        model = %provider.model(),
        store = %store.name(),
        tools = tools.len(),
        "Chat service ready"
    );

    let orchestrator = Orchestrator::from_config(&config.agent, provider, tools, event_bus)
        .with_unit_prompts(config.business.prompts.clone());
    Ok(Arc::new(
        ChatService::new(store, orchestrator).with_idle_timeout(config.session.idle_timeout()),
    ))
}

/// Start the gateway HTTP server and serve until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let service = build_service(&config).await?;
    let state = GatewayState::new(service, config.gateway.max_message_chars);
    let app = build_router(state, &config.gateway.cors_origins);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
