use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use presence_api::SystemClock;
use presence_api_server::ApiOptions;
use presence_engine::{PresenceService, build_store, spawn_sweeper};

use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;

/// Сколько ждать завершения task'ов после отмены, прежде чем abort.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("presence-server starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    config.validate()?;
    tracing::info!(config = %args.config, "loaded config");

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Store + service ---
    let store = build_store(config.presence.store, config.presence.shards)?;
    let service = Arc::new(PresenceService::new(
        store,
        Arc::new(SystemClock),
        config.presence.engine_config(),
    )?);
    tracing::info!(
        store = %config.presence.store,
        online_threshold = ?service.config().online_threshold,
        retention_window = ?service.config().retention_window,
        "presence service ready"
    );

    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    // --- Sweeper ---
    handles.push(spawn_sweeper(
        service.sweeper(),
        config.presence.sweep_period(),
        token.clone(),
    ));

    // --- API server ---
    let api_service = service.clone();
    let api_port = config.api_port;
    let options = ApiOptions { max_batch: config.max_batch };
    let api_token = token.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = presence_api_server::run(api_port, api_service, options, api_token.clone()).await {
            tracing::error!(error = %e, "api server error");
            api_token.cancel();
        }
    }));

    tracing::info!(port = config.api_port, "api server listening");
    tracing::info!("server ready");

    // --- Ожидание Ctrl+C или падения API ---
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("shutting down...");
        }
        _ = token.cancelled() => {
            tracing::warn!("api server stopped, shutting down...");
        }
    }

    // Signal all tasks to stop cooperatively
    token.cancel();

    // Drain: ждать до SHUTDOWN_GRACE, остальное abort
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    for h in &mut handles {
        if tokio::time::timeout_at(deadline, &mut *h).await.is_err() {
            h.abort();
        }
    }

    tracing::info!(tracked = service.tracked(), "shutdown complete");
    Ok(())
}
