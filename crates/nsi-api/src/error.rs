use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, message: msg.into() }
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::UNPROCESSABLE_ENTITY, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<nsi_engine::EngineError> for ApiError {
    fn from(e: nsi_engine::EngineError) -> Self {
        use nsi_engine::EngineError as E;
        match e {
            E::ConnectionNotFound(_) => ApiError::not_found(e.to_string()),
            E::InvalidSchedule(_) | E::VlanMismatch { .. } | E::StpUnknown(_)
            | E::CapacityUnavailable { .. } | E::PreconditionFailed(_) | E::Domain(_) => {
                ApiError::unprocessable(e.to_string())
            }
            _ => ApiError::internal(e.to_string()),
        }
    }
}
