use std::collections::BTreeMap;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use presence_api::{PresenceStatus, SubjectId, format_iso8601};

use super::AppState;
use crate::auth::AuthenticatedSubject;
use crate::error::ApiError;

// ═══════════════════════════════════════════════════════════════
//  DTO
// ═══════════════════════════════════════════════════════════════

/// `{ "online": bool, "lastSeen": ISO-8601 | null }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBody {
    pub online: bool,
    #[serde(rename = "lastSeen")]
    pub last_seen: Option<String>,
}

impl From<PresenceStatus> for StatusBody {
    fn from(status: PresenceStatus) -> Self {
        Self {
            online: status.online,
            last_seen: status.last_seen.and_then(format_iso8601),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchStatusResponse {
    pub statuses: BTreeMap<String, StatusBody>,
}

/// Id в батче: строка или целое число. Число нормализуется в строку.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSubjectId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl From<RawSubjectId> for SubjectId {
    fn from(raw: RawSubjectId) -> Self {
        match raw {
            RawSubjectId::Text(s) => SubjectId::from(s),
            RawSubjectId::Signed(n) => SubjectId::from(n),
            RawSubjectId::Unsigned(n) => SubjectId::from(n),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct BatchStatusRequest {
    ids: Vec<RawSubjectId>,
}

// ═══════════════════════════════════════════════════════════════
//  POST /presence/heartbeat, POST /presence/offline
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_heartbeat(
    State(state): State<AppState>,
    AuthenticatedSubject(subject): AuthenticatedSubject,
) -> StatusCode {
    state.service.heartbeat(&subject);
    StatusCode::NO_CONTENT
}

pub(crate) async fn handle_offline(
    State(state): State<AppState>,
    AuthenticatedSubject(subject): AuthenticatedSubject,
) -> StatusCode {
    state.service.sign_off(&subject);
    StatusCode::NO_CONTENT
}

// ═══════════════════════════════════════════════════════════════
//  GET /presence/status/{subject_id}
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_status(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Json<StatusBody> {
    let status = state.service.status(&SubjectId::from(subject_id));
    Json(status.into())
}

// ═══════════════════════════════════════════════════════════════
//  POST /presence/status/batch  { "ids": [...] }
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_batch_status(
    State(state): State<AppState>,
    body: Result<Json<BatchStatusRequest>, JsonRejection>,
) -> Result<Json<BatchStatusResponse>, ApiError> {
    let Json(request) = body.map_err(|e| {
        tracing::debug!(error = %e.body_text(), "rejected batch status request");
        ApiError::BadRequest(format!("expected {{\"ids\": [string | integer, ...]}}: {}", e.body_text()))
    })?;

    if request.ids.len() > state.options.max_batch {
        return Err(ApiError::BadRequest(format!(
            "batch of {} ids exceeds limit {}",
            request.ids.len(),
            state.options.max_batch
        )));
    }

    let ids: Vec<SubjectId> = request.ids.into_iter().map(SubjectId::from).collect();
    let statuses = state
        .service
        .batch_status(&ids)
        .into_iter()
        .map(|(id, status)| (id.into_inner(), StatusBody::from(status)))
        .collect();

    Ok(Json(BatchStatusResponse { statuses }))
}

// ═══════════════════════════════════════════════════════════════
//  GET /health
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "tracked": state.service.tracked(),
    }))
}
