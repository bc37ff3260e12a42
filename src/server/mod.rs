//! HTTP API for the pattern cache

pub mod http;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::patterns::FallbackOrchestrator;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub forge: FallbackOrchestrator,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(forge: FallbackOrchestrator) -> Self {
        Self { forge, started_at: Utc::now() }
    }
}

/// All routes, without binding
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(http::status_handler))
        .route("/api/docs", post(http::docs_handler))
        .route("/api/code", post(http::code_handler))
        .route("/api/fix", post(http::fix_handler))
        .route("/api/features", post(http::features_handler))
        .route("/api/ideas", post(http::ideas_handler))
        .route("/api/ideas/expand", post(http::expand_handler))
        .route("/api/metrics", get(http::metrics_handler))
        .route("/api/patterns", get(http::patterns_handler))
        .route("/api/patterns/{kind}/{id}/outcome", post(http::outcome_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn start(forge: FallbackOrchestrator, config: &Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let app = router(ServerState::new(forge));

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Pattern Forge Server Starting");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Pattern store: {}", config.storage.database_path.display());
    println!("✓ Generator model: {}", config.generator.model);
    if config.matching.enabled {
        println!("✓ Pattern matching enabled");
    } else {
        println!("⚠ Pattern matching disabled, every request goes to the generator");
    }
    println!();
    println!("🚀 Listening on http://{}", addr);
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on {}", addr);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
