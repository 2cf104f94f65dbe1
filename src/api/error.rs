//! Maps [`ElderError`] onto the REST/RPC error envelope from `spec.md` §6:
//! `{error, code, details?}` with HTTP status drawn from the closed set
//! `{400, 401, 403, 404, 409, 410, 429, 500}`, and `details.reason` naming
//! the conflict kind for 409s from the closed set in §7.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::error::ElderError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError(pub ElderError);

impl From<ElderError> for ApiError {
    fn from(err: ElderError) -> Self {
        ApiError(err)
    }
}

fn status_for(err: &ElderError) -> StatusCode {
    match err {
        ElderError::Validation(_) | ElderError::DepthExceeded(_) | ElderError::Malformed(_) => {
            StatusCode::BAD_REQUEST
        }
        ElderError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ElderError::Forbidden { .. } | ElderError::TenantMismatch => StatusCode::FORBIDDEN,
        ElderError::UnknownTenant(_) | ElderError::ResourceMissing(_) | ElderError::VillageIdUnknown(_) => {
            StatusCode::NOT_FOUND
        }
        ElderError::UniqueViolation(_)
        | ElderError::ForeignKeyViolation(_)
        | ElderError::DependentExists(_)
        | ElderError::WouldCreateCycle { .. }
        | ElderError::StaleRevision { .. } => StatusCode::CONFLICT,
        ElderError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        ElderError::Deadlock
        | ElderError::StorageUnavailable(_)
        | ElderError::CancelledByDeadline
        | ElderError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let details = if status == StatusCode::CONFLICT {
            match &self.0 {
                ElderError::WouldCreateCycle { path } => Some(json!({"reason": "cycle", "path": path})),
                other => Some(json!({"reason": other.reason_code()})),
            }
        } else if status == StatusCode::FORBIDDEN {
            Some(json!({"reason": self.0.reason_code()}))
        } else {
            None
        };
        let body = ApiErrorBody {
            error: self.0.to_string(),
            code: self.0.reason_code().to_string(),
            details,
        };
        tracing::info!(status = %status, code = %body.code, "request failed");
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
