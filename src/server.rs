use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::credentials::Credentials;
use crate::graph::GraphClient;
use crate::profiles::ProfileCache;
use crate::realtime::{self, Broadcaster};
use crate::{dispatch, pages, webhook};

struct Inner {
    config: Config,
    credentials: Credentials,
    graph: GraphClient,
    profiles: ProfileCache,
    broadcaster: Broadcaster,
}

/// Shared application state, cheap to clone into every handler.
#[derive(Clone)]
pub struct AppState(Arc<Inner>);

impl AppState {
    pub fn new(config: Config) -> Self {
        let credentials = Credentials::from_pages(&config.pages);
        let graph = GraphClient::new(&config.graph);
        let profiles = ProfileCache::new(config.profiles.max_entries);
        Self(Arc::new(Inner {
            config,
            credentials,
            graph,
            profiles,
            broadcaster: Broadcaster::new(),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub fn credentials(&self) -> &Credentials {
        &self.0.credentials
    }

    pub fn graph(&self) -> &GraphClient {
        &self.0.graph
    }

    pub fn profiles(&self) -> &ProfileCache {
        &self.0.profiles
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.0.broadcaster
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
    pages: usize,
    cached_profiles: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.broadcaster().connected(),
        pages: state.credentials().len(),
        cached_profiles: state.profiles().len().await,
    })
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/webhook", get(webhook::verify).post(webhook::receive))
        .route("/send-message", post(dispatch::send_message))
        .route("/pages-info", get(pages::pages_info))
        .route("/ws", get(realtime::ws_handler))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the listener and serve until Ctrl-C.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = state.config().listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Server is listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
