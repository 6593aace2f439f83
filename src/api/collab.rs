//! Realtime BRD editing over WebSocket, plus REST views of the hub

use super::auth::{authenticate, AuthUser};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::collab::{ClientEvent, Effect, ServerEvent, SessionInfo};
use crate::db::CollaborationOperation;
use crate::notify::{self, Notice, MENTION};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_HISTORY: usize = 100;
const MAX_HISTORY: usize = 1000;

pub(super) fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/session/:brd_id", get(session))
        .route("/operations/:brd_id", get(operations))
        .route("/mentions", get(mentions))
        .route("/mentions/:mention_id/read", post(mark_mention_read))
        .route("/persist/:brd_id", post(persist))
        .route("/restore/:brd_id", get(restore))
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return ApiError::Unauthorized("Authentication required".to_string()).into_response();
    };

    match authenticate(&state, &token).await {
        Ok(auth) => ws.on_upgrade(move |socket| handle_socket(socket, state, auth)),
        Err(e) => {
            tracing::debug!("Rejected WebSocket connection: {:?}", e);
            e.into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, auth: AuthUser) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let replies = tx.clone();

    let conn = state.hub.connect(auth.id(), &auth.user.full_name(), tx);
    tracing::info!(
        user = auth.id(),
        conn,
        active = state.hub.connection_count(),
        "Collaboration socket opened"
    );

    let mut send_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_INTERVAL);
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    match serde_json::to_string(&event) {
                        Ok(text) => {
                            if sender.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("Failed to encode {} event: {}", event.name(), e),
                    }
                }
                _ = ping.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        let effects = recv_state.hub.handle(conn, event);
                        apply_effects(&recv_state, effects).await;
                    }
                    Err(e) => {
                        // A closed channel means the socket is already going away
                        let _ = replies.send(ServerEvent::error(format!("Invalid message: {}", e)));
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let effects = state.hub.disconnect(conn);
    apply_effects(&state, effects).await;
    tracing::info!(
        user = auth.id(),
        conn,
        active = state.hub.connection_count(),
        "Collaboration socket closed"
    );
}

/// Finish the database side of hub events
async fn apply_effects(state: &AppState, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Persist { brd_id } => {
                if let Err(e) = persist_brd(state, &brd_id).await {
                    tracing::error!("Failed to persist operations for BRD {}: {}", brd_id, e);
                }
            }
            Effect::Mentioned {
                mentioned_user_id,
                actor_id,
                brd_id,
                context,
            } => {
                let actor_name = match state.db.get_user(actor_id).await {
                    Ok(user) => user.full_name(),
                    Err(_) => "Someone".to_string(),
                };
                notify::notify_quietly(
                    &state.db,
                    Notice::new(mentioned_user_id, MENTION)
                        .actor(actor_id)
                        .resource("brd", brd_id)
                        .meta("actor_name", actor_name)
                        .meta("context", context),
                )
                .await;
            }
        }
    }
}

async fn persist_brd(state: &AppState, brd_id: &str) -> Result<usize, crate::db::DatabaseError> {
    let pending = state.hub.take_unpersisted(brd_id);
    if pending.operations.is_empty() {
        return Ok(0);
    }
    match state.db.persist_operations(&pending.operations).await {
        Ok(saved) => {
            tracing::debug!("Persisted {} operations for BRD {}", saved, brd_id);
            Ok(saved)
        }
        Err(e) => {
            let released = state.hub.release_unpersisted(&pending.ids);
            tracing::warn!(
                "Keeping {} operations of BRD {} for the next persist",
                released,
                brd_id
            );
            Err(e)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    limit: Option<usize>,
    #[serde(default, alias = "unread_only")]
    unread_only: bool,
}

impl HistoryQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY)
    }
}

async fn session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(brd_id): Path<String>,
) -> ApiResult<Json<SessionInfo>> {
    auth.require(&state, "brds", "read").await?;
    Ok(Json(state.hub.session_info(&brd_id)))
}

async fn operations(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(brd_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "brds", "read").await?;

    let operations = state.hub.operation_history(&brd_id, query.limit());
    Ok(Json(json!({
        "brdId": brd_id,
        "count": operations.len(),
        "operations": operations,
    })))
}

async fn mentions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Json<Value> {
    let mentions = state.hub.mentions_for(auth.id(), query.unread_only);
    Json(json!({
        "count": mentions.len(),
        "mentions": mentions,
    }))
}

async fn mark_mention_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(mention_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.hub.mark_mention_read(auth.id(), &mention_id) {
        return Err(ApiError::not_found("Mention not found"));
    }
    Ok(Json(json!({ "message": "Mention marked as read" })))
}

async fn persist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(brd_id): Path<String>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "brds", "update").await?;

    let saved = persist_brd(&state, &brd_id).await?;
    Ok(Json(json!({
        "message": "Operations persisted",
        "persisted": saved,
    })))
}

async fn restore(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(brd_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<CollaborationOperation>>> {
    auth.require(&state, "brds", "read").await?;
    Ok(Json(
        state
            .db
            .restore_operations(&brd_id, query.limit() as i64)
            .await?,
    ))
}
