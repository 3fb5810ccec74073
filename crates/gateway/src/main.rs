use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::Method;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ea_gateway::api;
use ea_gateway::config;
use ea_gateway::state::AppState;

/// Evidence-grounded reasoning agent gateway.
#[derive(Debug, Parser)]
#[command(name = "ea-gateway", version, about)]
struct Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Cli::parse();

    let gateway_config = config::load();
    init_tracing(&gateway_config.log_filter);

    tracing::info!("evidence agent gateway starting");

    let state = AppState::new(&gateway_config.inner);
    tracing::info!(
        max_concurrent_requests = state.admission.max_concurrent(),
        max_rounds = state.max_rounds,
        "orchestrator ready"
    );

    spawn_citation_sweeper(state.citations.clone(), gateway_config.citation_sweep_interval_seconds);
    spawn_session_sweeper(state.sessions.clone());

    let cors = build_cors_layer();

    let app = api::router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    let addr = format!("{}:{}", gateway_config.inner.server.host, gateway_config.inner.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "evidence agent gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

fn init_tracing(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();
}

/// Permissive by default, matching the teacher's wildcard-origin CORS
/// path; a production deployment would narrow this via configuration.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

fn spawn_citation_sweeper(citations: Arc<ea_citations::CitationStore>, interval_seconds: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            ticker.tick().await;
            let evicted = citations.sweep();
            if evicted > 0 {
                tracing::debug!(evicted, "citation sweep");
            }
        }
    });
}

fn spawn_session_sweeper(sessions: Arc<ea_sessions::SessionStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(300));
        loop {
            ticker.tick().await;
            let evicted = sessions.sweep();
            if evicted > 0 {
                tracing::debug!(evicted, "session sweep");
            }
        }
    });
}
