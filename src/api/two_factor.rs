//! Managing two-factor authentication for the signed-in user

use super::auth::{audit, AuthUser};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::db::{NewAuditLog, TwoFactorRecord};
use crate::security::totp;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/setup", get(setup))
        .route("/enable", post(enable))
        .route("/verify", post(verify))
        .route("/verify-backup", post(verify_backup))
        .route("/disable", post(disable))
        .route("/status", get(status))
}

#[derive(Debug, Deserialize)]
struct CodeRequest {
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PasswordRequest {
    password: Option<String>,
}

fn submitted(code: Option<String>) -> ApiResult<String> {
    code.map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("Verification code is required"))
}

async fn record_for(state: &AppState, user_id: i64) -> ApiResult<TwoFactorRecord> {
    state
        .db
        .get_two_factor(user_id)
        .await?
        .ok_or_else(|| ApiError::bad_request("2FA has not been set up"))
}

async fn setup(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    if let Some(existing) = state.db.get_two_factor(auth.id()).await? {
        if existing.is_enabled {
            return Err(ApiError::bad_request("2FA is already enabled"));
        }
    }

    let material = totp::generate_setup(&auth.user.email)?;
    state
        .db
        .save_two_factor_setup(auth.id(), &material.secret, &material.backup_codes)
        .await?;

    Ok(Json(json!({
        "secret": material.secret,
        "qrCodeUrl": material.otpauth_url,
        "backupCodes": material.backup_codes,
    })))
}

async fn enable(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CodeRequest>,
) -> ApiResult<Json<Value>> {
    let code = submitted(req.code)?;
    let record = record_for(&state, auth.id()).await?;

    if !totp::verify_code(&record.secret, &code)? {
        return Err(ApiError::bad_request("Invalid verification code"));
    }

    state.db.set_two_factor_enabled(auth.id(), true).await?;
    audit(&state.db, NewAuditLog::new(auth.id(), "2FA_ENABLED", "user").entity(auth.id())).await;
    tracing::info!("User {} enabled 2FA", auth.id());

    Ok(Json(json!({ "message": "2FA enabled successfully" })))
}

async fn verify(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CodeRequest>,
) -> ApiResult<Json<Value>> {
    let code = submitted(req.code)?;
    let record = record_for(&state, auth.id()).await?;

    if !totp::verify_code(&record.secret, &code)? {
        return Err(ApiError::bad_request("Invalid verification code"));
    }
    Ok(Json(json!({ "valid": true })))
}

async fn verify_backup(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CodeRequest>,
) -> ApiResult<Json<Value>> {
    let code = submitted(req.code)?;
    record_for(&state, auth.id()).await?;

    let Some(remaining) = state.db.consume_backup_code(auth.id(), &code).await? else {
        return Err(ApiError::bad_request("Invalid backup code"));
    };
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "2FA_BACKUP_CODE_USED", "user").entity(auth.id()),
    )
    .await;

    Ok(Json(json!({
        "valid": true,
        "remainingCodes": remaining,
    })))
}

async fn disable(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<PasswordRequest>,
) -> ApiResult<Json<Value>> {
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("Password is required"))?;

    if !state
        .passwords
        .verify_password(&password, &auth.user.password_hash)?
    {
        return Err(ApiError::Unauthorized("Invalid password".to_string()));
    }

    state.db.delete_two_factor(auth.id()).await?;
    audit(&state.db, NewAuditLog::new(auth.id(), "2FA_DISABLED", "user").entity(auth.id())).await;
    tracing::info!("User {} disabled 2FA", auth.id());

    Ok(Json(json!({ "message": "2FA disabled successfully" })))
}

async fn status(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let record = state.db.get_two_factor(auth.id()).await?;

    Ok(Json(match record {
        Some(r) => json!({
            "enabled": r.is_enabled,
            "enabledAt": r.enabled_at,
            "backupCodesRemaining": r.backup_codes.0.len(),
        }),
        None => json!({
            "enabled": false,
            "enabledAt": null,
            "backupCodesRemaining": 0,
        }),
    }))
}
