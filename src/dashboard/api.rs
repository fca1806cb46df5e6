//! Console HTTP API
//!
//! REST endpoints and per-page WebSocket streams for the browser.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::types::*;
use super::{ConsolePage, ConsoleState, PageLease};
use crate::polling::Revalidation;
use crate::types::ConfigFormValues;

/// Create the API router with all endpoints
pub fn create_router(state: Arc<ConsoleState>) -> Router {
    Router::new()
        // Dashboard
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/dashboard/refresh", post(refresh_dashboard))
        .route("/api/dashboard/refresh-mode", put(set_refresh_mode))
        .route("/api/dashboard/value-metric", put(set_value_metric))
        // History
        .route("/api/history", get(get_history))
        // Config console
        .route("/api/config", get(get_config).put(submit_config))
        .route("/api/config/refresh", post(pull_latest_config))
        .route("/api/config/reset", post(reset_config))
        .route("/api/health", get(get_health))
        // WebSocket
        .route("/ws/:page", get(websocket_handler))
        // State
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // CORS for frontend
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}

// ─────────────────────────────────────────────────────────────────
// Dashboard Handlers
// ─────────────────────────────────────────────────────────────────

/// GET /api/dashboard - Stats cards and open positions
async fn get_dashboard(State(state): State<Arc<ConsoleState>>) -> impl IntoResponse {
    match state.open_dashboard().await {
        Ok(page) => Json(ApiResponse::success(page.view())),
        Err(err) => Json(ApiResponse::error(err.to_string())),
    }
}

/// POST /api/dashboard/refresh - Refresh every dashboard source, wait for all
async fn refresh_dashboard(State(state): State<Arc<ConsoleState>>) -> impl IntoResponse {
    let page = match state.mount_dashboard() {
        Ok(page) => page,
        Err(err) => return Json(ApiResponse::error(err.to_string())),
    };
    let report = page.refresh().await;
    Json(ApiResponse::success(report))
}

/// PUT /api/dashboard/refresh-mode - `{ "mode": "auto" | "manual" }`
async fn set_refresh_mode(
    State(state): State<Arc<ConsoleState>>,
    Json(request): Json<RefreshModeRequest>,
) -> impl IntoResponse {
    let controls = state.set_refresh_mode(request.mode);
    Json(ApiResponse::success(ControlsResponse {
        refresh_mode: controls.mode,
        value_metric: controls.metric,
    }))
}

/// PUT /api/dashboard/value-metric - `{ "metric": "notional" | "duration" }`
async fn set_value_metric(
    State(state): State<Arc<ConsoleState>>,
    Json(request): Json<ValueMetricRequest>,
) -> impl IntoResponse {
    let controls = state.set_value_metric(request.metric);
    Json(ApiResponse::success(ControlsResponse {
        refresh_mode: controls.mode,
        value_metric: controls.metric,
    }))
}

// ─────────────────────────────────────────────────────────────────
// History Handlers
// ─────────────────────────────────────────────────────────────────

/// GET /api/history - Snapshots, charts and recent events
async fn get_history(State(state): State<Arc<ConsoleState>>) -> impl IntoResponse {
    match state.open_history().await {
        Ok(page) => Json(ApiResponse::success(page.view())),
        Err(err) => Json(ApiResponse::error(err.to_string())),
    }
}

// ─────────────────────────────────────────────────────────────────
// Config Console Handlers
// ─────────────────────────────────────────────────────────────────

/// GET /api/config - Current configuration, form and notifications
async fn get_config(State(state): State<Arc<ConsoleState>>) -> impl IntoResponse {
    match state.open_config_console().await {
        Ok(page) => Json(ApiResponse::success(page.view())),
        Err(err) => Json(ApiResponse::error(err.to_string())),
    }
}

/// PUT /api/config - Submit the full form
async fn submit_config(
    State(state): State<Arc<ConsoleState>>,
    Json(values): Json<ConfigFormValues>,
) -> impl IntoResponse {
    let page = match state.open_config_console().await {
        Ok(page) => page,
        Err(err) => return Json(ApiResponse::error(err.to_string())),
    };
    let outcome = page.submit(values).await;
    state.config_console.broadcaster.broadcast(&page.render());
    Json(ApiResponse::success(outcome))
}

/// POST /api/config/refresh - Pull the latest configuration into the form
async fn pull_latest_config(State(state): State<Arc<ConsoleState>>) -> impl IntoResponse {
    let page = match state.open_config_console().await {
        Ok(page) => page,
        Err(err) => return Json(ApiResponse::error(err.to_string())),
    };
    match page.pull_latest().await {
        Revalidation::Updated(_) => Json(ApiResponse::success(page.view())),
        Revalidation::Failed(err) => Json(ApiResponse::error(err.to_string())),
    }
}

/// POST /api/config/reset - Discard form edits
async fn reset_config(State(state): State<Arc<ConsoleState>>) -> impl IntoResponse {
    let page = match state.open_config_console().await {
        Ok(page) => page,
        Err(err) => return Json(ApiResponse::error(err.to_string())),
    };
    match page.reset() {
        Some(values) => {
            state.config_console.broadcaster.broadcast(&page.render());
            Json(ApiResponse::success(values))
        }
        None => Json(ApiResponse::error("No configuration loaded yet")),
    }
}

/// GET /api/health - Liveness plus what is being polled
async fn get_health(State(state): State<Arc<ConsoleState>>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "ok",
        cached_sources: state.orchestrator.cached_keys(),
        mounted_pages: state.mounted_pages(),
        ws_viewers: state.ws_viewers(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    }))
}

// ─────────────────────────────────────────────────────────────────
// WebSocket Handler
// ─────────────────────────────────────────────────────────────────

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
};

/// WebSocket upgrade handler; the page stays mounted while connected
async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(page): Path<String>,
    State(state): State<Arc<ConsoleState>>,
) -> Response {
    if !matches!(page.as_str(), "dashboard" | "history" | "config") {
        return (StatusCode::NOT_FOUND, Json(ApiResponse::<()>::error("Unknown page"))).into_response();
    }
    ws.on_upgrade(move |socket| handle_websocket(socket, state, page))
}

async fn handle_websocket(socket: WebSocket, state: Arc<ConsoleState>, page: String) {
    let mounted = match page.as_str() {
        "dashboard" => match state.mount_dashboard() {
            Ok(lease) => {
                stream_page(socket, lease).await;
                Ok(())
            }
            Err(err) => Err(err),
        },
        "history" => match state.mount_history() {
            Ok(lease) => {
                stream_page(socket, lease).await;
                Ok(())
            }
            Err(err) => Err(err),
        },
        _ => match state.mount_config_console() {
            Ok(lease) => {
                stream_page(socket, lease).await;
                Ok(())
            }
            Err(err) => Err(err),
        },
    };

    if let Err(err) = mounted {
        tracing::warn!(page = %page, error = %err, "Failed to mount page for WebSocket");
    }
}

/// Outgoing message type for WebSocket
enum OutgoingMessage {
    Text(String),
    Pong(Vec<u8>),
}

/// Push the page's view on connect and after every change
async fn stream_page<P: ConsolePage>(socket: WebSocket, page: PageLease<'_, P>) {
    use futures_util::{SinkExt, StreamExt};

    tracing::info!(page = P::NAME, "🖥️ New WebSocket connection");

    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the initial render so no update is missed
    let mut rx = page.updates();

    if let Ok(json) = serde_json::to_string(&page.render()) {
        if sender.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    // Channel for outgoing messages
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<OutgoingMessage>(32);

    // Spawn task to send outgoing messages
    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let result = match msg {
                OutgoingMessage::Text(text) => sender.send(Message::Text(text)).await,
                OutgoingMessage::Pong(data) => sender.send(Message::Pong(data)).await,
            };
            if result.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages (ping/pong) and page updates
    loop {
        tokio::select! {
            update = rx.recv() => {
                match update {
                    Ok(msg) => {
                        if out_tx.send(OutgoingMessage::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        // Skip ahead with a fresh render
                        if let Ok(json) = serde_json::to_string(&page.render()) {
                            if out_tx.send(OutgoingMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        if out_tx.send(OutgoingMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received WebSocket message: {}", text);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }

    send_task.abort();
    tracing::info!(page = P::NAME, "🖥️ WebSocket connection closed");
}
