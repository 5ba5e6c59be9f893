use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Ошибки на границе HTTP. До `PresenceService` не доходят.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing authenticated subject")]
    Unauthenticated,

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("bind api :{port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    #[error("axum serve: {0}")]
    Serve(std::io::Error),
}
