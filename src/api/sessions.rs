//! Login sessions and the audit trail as seen by their owner

use super::auth::{audit, AuthUser};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::db::{AuditLog, DatabaseError, NewAuditLog, UserSession};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

pub(super) fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(my_sessions))
        .route("/active", get(active_sessions))
        .route("/terminate-all", post(terminate_all))
        .route("/:session_id/terminate", post(terminate))
}

pub(super) fn activity_routes() -> Router<AppState> {
    Router::new()
        .route("/my-activity", get(my_activity))
        .route("/my-login-history", get(login_history))
        .route("/all", get(all_activity))
}

#[derive(Debug, Default, Deserialize)]
struct ActivityQuery {
    limit: Option<i64>,
    action: Option<String>,
}

impl ActivityQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Session row flagged with whether it is the one making the request
fn session_view(session: UserSession, current: &str) -> Value {
    let is_current = session.id == current;
    let mut view = json!(session);
    view["isCurrent"] = json!(is_current);
    view
}

async fn my_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<Vec<Value>>> {
    let sessions = state
        .db
        .list_user_sessions(auth.id(), false, query.limit())
        .await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| session_view(s, &auth.session_id))
            .collect(),
    ))
}

async fn active_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Value>>> {
    let sessions = state
        .db
        .list_user_sessions(auth.id(), true, MAX_LIMIT)
        .await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| session_view(s, &auth.session_id))
            .collect(),
    ))
}

async fn terminate(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = match state.db.get_user_session(&session_id).await {
        Ok(s) if s.user_id == auth.id() => s,
        Ok(_) | Err(DatabaseError::NotFound(_)) => {
            return Err(ApiError::not_found("Session not found"))
        }
        Err(e) => return Err(e.into()),
    };

    state.db.end_session(&session.id).await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "SESSION_TERMINATED", "session").entity(&session.id),
    )
    .await;

    Ok(Json(json!({ "message": "Session terminated" })))
}

async fn terminate_all(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let ended = state
        .db
        .end_user_sessions(auth.id(), Some(&auth.session_id))
        .await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "SESSIONS_TERMINATED", "session")
            .new_values(json!({ "terminated": ended })),
    )
    .await;

    Ok(Json(json!({
        "message": "All other sessions terminated",
        "terminated": ended,
    })))
}

async fn my_activity(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<Vec<AuditLog>>> {
    Ok(Json(
        state
            .db
            .list_audit_logs(Some(auth.id()), query.action.as_deref(), query.limit())
            .await?,
    ))
}

async fn login_history(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<Vec<UserSession>>> {
    Ok(Json(
        state
            .db
            .list_user_sessions(auth.id(), false, query.limit())
            .await?,
    ))
}

async fn all_activity(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<Vec<AuditLog>>> {
    auth.require(&state, "audit_logs", "read").await?;
    Ok(Json(
        state
            .db
            .list_audit_logs(None, query.action.as_deref(), query.limit())
            .await?,
    ))
}
