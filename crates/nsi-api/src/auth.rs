use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine as _;

use crate::state::AppState;

/// Requires a valid `Authorization` header, either `Bearer <token>` or
/// `Basic <base64(user:token)>` — local admin tooling (curl, a reverse
/// proxy, a browser prompt) tends to default to one or the other, and
/// either carries the same provider-configured token. Applied to every
/// route except `/health`.
pub async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let expected = state.ctx.config.api.auth_token.as_str();
    let authorized = match header {
        Some(h) if h.starts_with("Bearer ") => h.trim_start_matches("Bearer ") == expected,
        Some(h) if h.starts_with("Basic ") => {
            let encoded = h.trim_start_matches("Basic ");
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .and_then(|decoded| decoded.split_once(':').map(|(_, password)| password == expected))
                .unwrap_or(false)
        }
        _ => false,
    };

    if authorized {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, "Unauthorized\n").into_response()
    }
}
