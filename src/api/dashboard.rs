//! Liveness probe and the caller's dashboard counters

use super::auth::AuthUser;
use super::error::ApiResult;
use super::AppState;
use crate::db::DashboardStats;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

pub(super) fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/stats", get(stats))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn stats(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<DashboardStats>> {
    auth.require(&state, "dashboard", "read").await?;
    Ok(Json(state.db.dashboard_stats(auth.id()).await?))
}
