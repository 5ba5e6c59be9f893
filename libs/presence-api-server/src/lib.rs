mod auth;
pub mod error;
mod http;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;

use presence_engine::PresenceService;

pub use auth::{AuthenticatedSubject, SUBJECT_HEADER};
pub use error::{ApiError, ServeError};
pub use http::{BatchStatusResponse, StatusBody};

/// Ограничения HTTP слоя.
#[derive(Debug, Clone, Copy)]
pub struct ApiOptions {
    /// Максимум id в одном `POST /presence/status/batch`.
    pub max_batch: usize,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self { max_batch: 1000 }
    }
}

#[derive(Clone)]
pub struct AppState {
    service: Arc<PresenceService>,
    options: ApiOptions,
}

impl AppState {
    pub fn new(service: Arc<PresenceService>, options: ApiOptions) -> Self {
        Self { service, options }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Router
// ═══════════════════════════════════════════════════════════════

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/presence/heartbeat", post(http::handle_heartbeat))
        .route("/presence/offline", post(http::handle_offline))
        .route("/presence/status/batch", post(http::handle_batch_status))
        .route("/presence/status/{subject_id}", get(http::handle_status))
        .route("/health", get(http::handle_health))
        .with_state(state)
}

/// Presence HTTP API сервер. Работает до отмены `shutdown`.
pub async fn run(
    port: u16,
    service: Arc<PresenceService>,
    options: ApiOptions,
    shutdown: CancellationToken,
) -> Result<(), ServeError> {
    let app = router(AppState::new(service, options));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|source| ServeError::Bind { port, source })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(ServeError::Serve)?;

    Ok(())
}
