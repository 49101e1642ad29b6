use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;

pub async fn require_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // Internal token, when configured, always wins.
    if !state.internal_token.is_empty()
        && let Some(header) = req.headers().get("x-stagehand-internal-token")
        && let Ok(val) = header.to_str()
        && val == state.internal_token
    {
        return next.run(req).await;
    }

    // No token configured → open access only on loopback (local dev).
    if state.internal_token.is_empty() {
        let is_loopback = state.api_host == "127.0.0.1"
            || state.api_host == "::1"
            || state.api_host == "localhost";
        if is_loopback {
            return next.run(req).await;
        }
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "unauthorized" })),
    )
        .into_response()
}
