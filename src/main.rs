//! rlhf-collect - human preference data collection server
//!
//! A worker chats with several language models at once. Every utterance is
//! fanned out to all backends, the worker picks the best reply, and all
//! backends continue from that choice. Finished sessions are appended to a
//! JSONL dataset, optionally pushed to a git repository.

mod api;
mod config;
mod dispatch;
mod llm;
mod runtime;
mod state_machine;
mod store;
mod sync;

use api::{create_router, AppState};
use config::AppConfig;
use dispatch::Dispatcher;
use llm::BackendRegistry;
use runtime::{SessionManager, SWEEP_INTERVAL};
use std::net::SocketAddr;
use std::sync::Arc;
use store::JsonlSink;
use sync::DatasetSync;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rlhf_collect=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env()?;

    // The checkout has to exist before the sink creates its file inside it
    let sync = match config.sync.clone() {
        Some(sync_config) => {
            let sync = DatasetSync::new(sync_config)?;
            sync.ensure_checkout().await?;
            Some(sync)
        }
        None => None,
    };

    let sink = JsonlSink::open(config.data_path()).await?;

    let registry = BackendRegistry::new(&config.backends)?;
    if config.backends.api_token.is_none() {
        tracing::warn!("HF_TOKEN not set; inference requests will be anonymous and rate limited");
    }
    tracing::info!(
        backends = ?registry.backend_ids(),
        turn_budget = config.turn_budget,
        max_concurrency = config.max_concurrency,
        "Backends initialized"
    );

    let dispatcher = Dispatcher::new(registry, config.max_concurrency);
    let manager = Arc::new(
        SessionManager::new(Arc::new(dispatcher), Arc::new(sink), config.turn_budget)
            .with_expiry(config.session_expiry),
    );

    let cancel = CancellationToken::new();
    let sweeper = manager.clone().spawn_sweeper(SWEEP_INTERVAL, cancel.clone());
    let sync_task = sync.map(|sync| {
        tracing::info!(
            path = %sync.data_dir().display(),
            interval_secs = sync.interval().as_secs(),
            "Dataset sync enabled"
        );
        sync.spawn(cancel.clone())
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(AppState::new(manager)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("rlhf-collect server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    sweeper.await?;
    if let Some(task) = sync_task {
        task.await?;
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Returns on SIGTERM or SIGINT
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to wait for SIGINT");
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM - shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT - shutting down");
        }
    }
}
