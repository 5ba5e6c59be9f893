use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use presence_api::SubjectId;

use crate::error::ApiError;

/// Заголовок, в котором внешний auth слой передаёт id аутентифицированного субъекта.
pub const SUBJECT_HEADER: &str = "x-subject-id";

/// Субъект запроса. Аутентификация не наша: доверяем заголовку от auth proxy.
#[derive(Debug, Clone)]
pub struct AuthenticatedSubject(pub SubjectId);

impl<S> FromRequestParts<S> for AuthenticatedSubject
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(SUBJECT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthenticated)?;
        Ok(AuthenticatedSubject(SubjectId::from(value)))
    }
}
