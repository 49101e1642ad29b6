use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    middleware,
    response::IntoResponse,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use std::convert::Infallible;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use tower_http::cors::CorsLayer;
use tracing::warn;

use super::AppState;
use super::auth;

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    let api_port = state.api_port;
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .with_state(state.clone());

    let authed_routes = Router::new()
        .route("/api/stream", get(sse_stream))
        .route("/api/logs", get(sse_logs))
        .route("/api/events/{event}/start", post(start_event))
        .route("/api/events/{event}/pause", post(pause_event))
        .route("/api/events/{event}/resume", post(resume_event))
        .route("/api/events/{event}/close", post(close_event))
        .route("/api/events/{event}/status", get(event_status))
        .route("/api/events/{event}/cards", get(event_cards))
        .route("/api/events/{event}/facts", get(event_facts))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .with_state(state);

    public_routes
        .merge(authed_routes)
        .layer(build_localhost_cors(api_port))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

/// The push stream: card/fact/status envelopes as server-sent events. The
/// front end observes eventual consistency here; a dropped subscriber just
/// resubscribes.
async fn sse_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.push.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(payload) => Ok(Event::default().data(payload)),
        Err(_) => Ok(Event::default().comment("lagged")),
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Live log follow for the dashboard; mirrors what the terminal prints.
async fn sse_logs(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(line) => Ok(Event::default().data(line)),
        Err(_) => Ok(Event::default().comment("lagged")),
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(serde::Deserialize, Default)]
struct StartBody {
    #[serde(default)]
    agent_id: Option<String>,
}

async fn start_event(
    State(state): State<AppState>,
    Path(event): Path<String>,
    body: Result<Json<StartBody>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    let agent_id = body
        .ok()
        .and_then(|b| b.0.agent_id)
        .unwrap_or_else(|| format!("agent-{}", event));
    match state.registry.start_event(&event, &agent_id).await {
        Ok(()) => Json(serde_json::json!({ "status": "running" })).into_response(),
        Err(e) => {
            warn!("start_event({}) failed: {}", event, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn pause_event(
    State(state): State<AppState>,
    Path(event): Path<String>,
) -> impl IntoResponse {
    match state.registry.pause_event(&event).await {
        Ok(()) => Json(serde_json::json!({ "status": "paused" })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn resume_event(
    State(state): State<AppState>,
    Path(event): Path<String>,
) -> impl IntoResponse {
    match state.registry.resume_event(&event).await {
        Ok(()) => Json(serde_json::json!({ "status": "running" })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn close_event(
    State(state): State<AppState>,
    Path(event): Path<String>,
) -> impl IntoResponse {
    match state.registry.close_event(&event).await {
        Ok(()) => Json(serde_json::json!({ "status": "stopped" })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn event_status(
    State(state): State<AppState>,
    Path(event): Path<String>,
) -> impl IntoResponse {
    let runtime = state.registry.snapshot(&event).await;
    let sessions = state
        .registry
        .store()
        .get_sessions_for_event(&event)
        .await
        .unwrap_or_default();
    Json(serde_json::json!({
        "event_id": event,
        "runtime": runtime,
        "sessions": sessions,
    }))
}

async fn event_cards(
    State(state): State<AppState>,
    Path(event): Path<String>,
) -> impl IntoResponse {
    match state.registry.store().list_cards_for_event(&event, 100).await {
        Ok(cards) => Json(serde_json::json!({ "cards": cards })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn event_facts(
    State(state): State<AppState>,
    Path(event): Path<String>,
) -> impl IntoResponse {
    match state.registry.store().list_active_facts(&event).await {
        Ok(facts) => Json(serde_json::json!({ "facts": facts })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
