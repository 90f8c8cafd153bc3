//! Consilio HTTP server
//!
//! Axum-based server hosting the dashboard pages and the JSON API.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function taking plain values. The inner functions are directly
//! testable without axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /health, /version
//! - GET  /sign-in, /sign-up  (auth pages, gated)
//! - GET  /, /meetings, /agents  (protected pages, gated)
//! - POST /api/auth/{sign-in,sign-up,social,sign-out}
//! - GET|POST /api/meetings, PUT /api/meetings/:id
//! - GET|POST /api/agents,   PUT /api/agents/:id

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use consilio_core::{AuthBackend, ConsilioConfig, MeetingStore, QueryCache};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::{api, pages};

/// Shared state for all HTTP handlers
pub struct AppState {
    pub config: ConsilioConfig,
    pub auth: Arc<dyn AuthBackend>,
    pub store: Arc<dyn MeetingStore>,
    pub cache: QueryCache,
    /// Present when the store is PostgreSQL; used by the health check.
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(
        config: ConsilioConfig,
        auth: Arc<dyn AuthBackend>,
        store: Arc<dyn MeetingStore>,
        pool: Option<PgPool>,
    ) -> Self {
        let cache = QueryCache::new(config.listing.cache_capacity, config.listing.cache_users);
        Self {
            config,
            auth,
            store,
            cache,
            pool,
        }
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/sign-in", get(pages::sign_in_handler))
        .route("/sign-up", get(pages::sign_up_handler))
        .route("/", get(pages::home_handler))
        .route("/meetings", get(pages::meetings_handler))
        .route("/agents", get(pages::agents_handler))
        .route("/api/auth/sign-in", post(api::sign_in_handler))
        .route("/api/auth/sign-up", post(api::sign_up_handler))
        .route("/api/auth/social", post(api::social_handler))
        .route("/api/auth/sign-out", post(api::sign_out_handler))
        .route(
            "/api/meetings",
            get(api::list_meetings_handler).post(api::create_meeting_handler),
        )
        .route("/api/meetings/:id", put(api::update_meeting_handler))
        .route(
            "/api/agents",
            get(api::list_agents_handler).post(api::create_agent_handler),
        )
        .route("/api/agents/:id", put(api::update_agent_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Consilio HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

/// Inner health check. Reports the store backend and, for PostgreSQL,
/// whether the database answers.
pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let store = state.store.name().to_string();

    let Some(pool) = &state.pool else {
        return (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": store,
            }),
        );
    };

    match consilio_core::db::health_check(pool).await {
        Ok(pg_ver) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": store,
                "postgresql": pg_ver,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "store": store,
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "consilio",
    })
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}
