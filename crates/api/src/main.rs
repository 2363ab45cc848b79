use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelsmith_api::config::ServerConfig;
use reelsmith_api::registry::RunRegistry;
use reelsmith_api::router::build_app_router;
use reelsmith_api::state::AppState;
use reelsmith_events::EventBus;
use reelsmith_pipeline::{PipelineConfig, PipelineOrchestrator};
use reelsmith_provider::ProviderConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "reelsmith_api=debug,reelsmith_pipeline=info,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    let provider = ProviderConfig::from_env().context("Invalid provider configuration")?;
    let pipeline = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        backend = ?provider.backend,
        scene_count = pipeline.scene_count,
        "Loaded configuration",
    );

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let event_log_handle = tokio::spawn(log_events(event_bus.subscribe()));

    // --- Orchestrator ---
    let client = provider.build_client(pipeline.scene_count);
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        client,
        pipeline,
        Arc::clone(&event_bus),
    ));

    // --- Runs ---
    let runs = Arc::new(RunRegistry::new());
    if let Some(store) = orchestrator.checkpoints() {
        let restored = runs
            .restore(store)
            .await
            .context("Failed to restore checkpointed runs")?;
        tracing::info!(restored, dir = %store.dir().display(), "Checkpointed runs restored");
    }

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator,
        runs: Arc::clone(&runs),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let host = config
        .host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid HOST address {:?}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cancelling runs");

    let drained = runs
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    if drained {
        tracing::info!("All runs stopped");
    } else {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Runs still executing at shutdown deadline",
        );
    }

    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(1), event_log_handle).await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Log every pipeline event until the bus closes.
async fn log_events(mut rx: tokio::sync::broadcast::Receiver<reelsmith_events::PipelineEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => tracing::info!(
                event_type = %event.event_type,
                run_id = %event.run_id,
                scene = ?event.scene_index.map(|s| s.get()),
                stage = ?event.stage,
                payload = %event.payload,
                "Pipeline event",
            ),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event log lagged behind the bus");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
