//! Local HTTP control API.
//!
//! Stateless CLI commands drive the daemon through this surface. Every
//! endpoint requires `Authorization: Bearer <token>`; the token is
//! random per daemon run and readable only by the owner, so possession
//! of it is possession of the agent. State-mutating endpoints answer
//! 503 while no relay session is alive — the reconnect loop will bring
//! one back.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use agentnet_client::ClientError;

use crate::daemon::Daemon;
use crate::history;
use crate::version;

/// Most recent matching records returned by one `/messages` call.
const MESSAGES_PAGE: usize = 50;

pub fn router(daemon: Daemon) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/rooms", get(rooms))
        .route("/rooms/create", post(create_room))
        .route("/rooms/join", post(join_room))
        .route("/rooms/leave", post(leave_room))
        .route("/send", post(send))
        .route("/messages", get(messages))
        .route("/history", get(room_history))
        .route("/stop", post(stop))
        .with_state(daemon)
}

pub async fn serve(daemon: Daemon, addr: &str) -> anyhow::Result<()> {
    let app = router(daemon);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("bind API listener on {addr}: {e}"))?;

    tracing::info!("HTTP API on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("API server: {e}"))
}

// ============================================================================
// Auth
// ============================================================================

/// Constant-time comparison — no early return on length mismatch, so
/// timing does not reveal the token or its length.
fn ct_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let len = a.len().max(b.len());
    let mut diff: u8 = (a.len() ^ b.len()) as u8;
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
    }
    diff == 0
}

fn check_auth(daemon: &Daemon, headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {}", daemon.api_token());
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !ct_eq(provided, &expected) {
        return Err((StatusCode::UNAUTHORIZED, "unauthorized").into_response());
    }
    Ok(())
}

/// Map a relay client failure onto an HTTP status: command rejections
/// are the caller's problem (400), everything else is ours (500).
fn client_error_response(err: ClientError) -> Response {
    let status = if err.is_server_rejection() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, err.to_string()).into_response()
}

fn not_connected() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "not connected").into_response()
}

// ============================================================================
// Handlers
// ============================================================================

async fn status(State(daemon): State<Daemon>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_auth(&daemon, &headers) {
        return resp;
    }

    let connected = daemon.client().await.is_some();
    let latest = daemon.latest_version().await;
    Json(json!({
        "connected": connected,
        "relay": daemon.relay_url(),
        "agent_name": daemon.agent_name(),
        "version": daemon.version(),
        "latest_version": latest.clone().unwrap_or_default(),
        "update_available": version::update_available(daemon.version(), latest.as_deref()),
    }))
    .into_response()
}

async fn rooms(State(daemon): State<Daemon>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_auth(&daemon, &headers) {
        return resp;
    }
    let Some(client) = daemon.client().await else {
        return not_connected();
    };

    match client.list_rooms(&[], 50).await {
        Ok(list) => Json(list).into_response(),
        Err(err) => client_error_response(err),
    }
}

#[derive(Deserialize)]
struct CreateRoomRequest {
    room: String,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    tags: Vec<String>,
}

async fn create_room(
    State(daemon): State<Daemon>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(resp) = check_auth(&daemon, &headers) {
        return resp;
    }
    let Ok(req) = serde_json::from_str::<CreateRoomRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "bad request").into_response();
    };
    let Some(client) = daemon.client().await else {
        return not_connected();
    };

    match client.create_room(&req.room, &req.topic, &req.tags).await {
        Ok(info) => {
            daemon.mark_joined(&req.room).await;
            Json(info).into_response()
        }
        Err(err) => client_error_response(err),
    }
}

#[derive(Deserialize)]
struct RoomRequest {
    room: String,
}

async fn join_room(State(daemon): State<Daemon>, headers: HeaderMap, body: String) -> Response {
    if let Err(resp) = check_auth(&daemon, &headers) {
        return resp;
    }
    let Ok(req) = serde_json::from_str::<RoomRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "bad request").into_response();
    };
    let Some(client) = daemon.client().await else {
        return not_connected();
    };

    match client.join_room(&req.room).await {
        Ok(info) => {
            daemon.mark_joined(&req.room).await;
            Json(info).into_response()
        }
        Err(err) => client_error_response(err),
    }
}

async fn leave_room(State(daemon): State<Daemon>, headers: HeaderMap, body: String) -> Response {
    if let Err(resp) = check_auth(&daemon, &headers) {
        return resp;
    }
    let Ok(req) = serde_json::from_str::<RoomRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "bad request").into_response();
    };
    let Some(client) = daemon.client().await else {
        return not_connected();
    };

    match client.leave_room(&req.room).await {
        Ok(()) => {
            daemon.mark_left(&req.room).await;
            Json(json!({ "status": "ok" })).into_response()
        }
        Err(err) => client_error_response(err),
    }
}

#[derive(Deserialize)]
struct SendRequest {
    room: String,
    text: String,
}

async fn send(State(daemon): State<Daemon>, headers: HeaderMap, body: String) -> Response {
    if let Err(resp) = check_auth(&daemon, &headers) {
        return resp;
    }
    let Ok(req) = serde_json::from_str::<SendRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "bad request").into_response();
    };
    let Some(client) = daemon.client().await else {
        return not_connected();
    };

    match client.send_message(&req.room, &req.text).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(err) => client_error_response(err),
    }
}

#[derive(Deserialize)]
struct MessagesQuery {
    room: Option<String>,
}

/// Destructive read: returned records leave the buffer, records from
/// other rooms stay. Of the matches, only the most recent
/// [`MESSAGES_PAGE`] go to the caller.
async fn messages(
    State(daemon): State<Daemon>,
    headers: HeaderMap,
    Query(query): Query<MessagesQuery>,
) -> Response {
    if let Err(resp) = check_auth(&daemon, &headers) {
        return resp;
    }

    let mut drained = daemon.drain_messages(query.room.as_deref()).await;
    if drained.len() > MESSAGES_PAGE {
        drained = drained.split_off(drained.len() - MESSAGES_PAGE);
    }
    Json(drained).into_response()
}

#[derive(Deserialize)]
struct HistoryQuery {
    room: Option<String>,
    limit: Option<u32>,
}

async fn room_history(
    State(daemon): State<Daemon>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Response {
    if let Err(resp) = check_auth(&daemon, &headers) {
        return resp;
    }
    let Some(room) = query.room.filter(|r| !r.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "room parameter required").into_response();
    };
    let limit = query.limit.unwrap_or(20);

    let base = history::relay_http_base(daemon.relay_url());
    let url = format!("{base}/api/rooms/{room}/messages?limit={limit}");

    let response = match daemon.http().get(&url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            return (StatusCode::BAD_GATEWAY, format!("relay unreachable: {e}"))
                .into_response()
        }
    };

    let relay_status = response.status();
    if !relay_status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let status = StatusCode::from_u16(relay_status.as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        return (status, format!("relay error {}: {body}", relay_status.as_u16()))
            .into_response();
    }

    let envelope: history::HistoryEnvelope = match response.json().await {
        Ok(env) => env,
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to decode relay response",
            )
                .into_response()
        }
    };

    let transcript = history::format_transcript(&room, limit, &envelope.messages);
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        transcript,
    )
        .into_response()
}

async fn stop(State(daemon): State<Daemon>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_auth(&daemon, &headers) {
        return resp;
    }

    tokio::spawn(async move {
        // Let the response flush before the process exits.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        daemon.shutdown().await;
    });

    Json(json!({ "status": "stopping" })).into_response()
}

// ============================================================================
// Tests
// ============================================================================
