//! HTTP gateway: a JSON API over per-key chat sessions.
//!
//! Every session lives in the [`SessionRegistry`]; sessions share only the
//! immutable [`TurnRunner`].

pub mod api;
pub mod auth;

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::agent::TurnRunner;
use crate::config::{Config, GatewayConfig};
use crate::sessions::{create_session_registry, SessionRegistry};
use auth::BearerToken;

/// Upper bound between idle-session sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state for all gateway handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub runner: Arc<TurnRunner>,
    /// Required bearer token for `/api/*`, if any.
    pub bearer_token: Option<BearerToken>,
    /// Default number of conversations in listings.
    pub recent_limit: usize,
}

impl AppState {
    pub fn new(runner: TurnRunner, config: &Config) -> Self {
        Self {
            registry: Arc::new(create_session_registry(&config.gateway)),
            runner: Arc::new(runner),
            bearer_token: config
                .gateway
                .bearer_token
                .as_deref()
                .and_then(BearerToken::new),
            recent_limit: config.chat.recent_limit,
        }
    }
}

/// Build the gateway router with body-size and timeout limits applied.
pub fn build_router(state: AppState, gateway: &GatewayConfig) -> Router {
    Router::new()
        .route("/health", get(api::handle_health))
        .route("/api/personas", get(api::handle_personas))
        .route("/api/sessions", post(api::handle_create_session))
        .route(
            "/api/sessions/{sid}",
            get(api::handle_get_session).delete(api::handle_delete_session),
        )
        .route(
            "/api/sessions/{sid}/conversations",
            get(api::handle_list_conversations).post(api::handle_new_conversation),
        )
        .route(
            "/api/sessions/{sid}/conversations/{cid}/load",
            post(api::handle_load_conversation),
        )
        .route(
            "/api/sessions/{sid}/pin",
            post(api::handle_pin).delete(api::handle_unpin),
        )
        .route("/api/sessions/{sid}/clear", post(api::handle_clear))
        .route("/api/sessions/{sid}/messages", post(api::handle_message))
        .layer(RequestBodyLimitLayer::new(gateway.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(gateway.request_timeout_secs),
        ))
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn run_gateway(config: &Config, runner: TurnRunner) -> Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind gateway to {addr}"))?;
    let local_addr = listener.local_addr()?;

    let state = AppState::new(runner, config);
    if state.bearer_token.is_none() {
        tracing::warn!("Gateway running without a bearer token; /api/* is open");
    }
    let sweeper = spawn_idle_sweeper(Arc::clone(&state.registry));
    let app = build_router(state, &config.gateway);

    tracing::info!(addr = %local_addr, "Gateway listening");
    println!("personachat gateway listening on http://{local_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Gateway shutting down");
        })
        .await
        .context("Gateway server error")?;
    sweeper.abort();
    Ok(())
}

/// Periodically evict sessions that have been idle past the registry TTL.
fn spawn_idle_sweeper(registry: Arc<SessionRegistry>) -> tokio::task::JoinHandle<()> {
    let period = registry.idle_ttl().min(MAX_SWEEP_INTERVAL).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = registry.evict_idle(Instant::now());
            if evicted > 0 {
                tracing::debug!(evicted, remaining = registry.len(), "Idle sessions swept");
            }
        }
    })
}
