//! Authentication: the bearer extractor, login, registration and 2FA login completion

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::db::{Database, NewAuditLog, NewUser, User, UserSession};
use crate::notify::{self, Notice, USER_LOGIN};
use crate::security::{totp, PasswordManager};
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;

/// Address and agent of the calling client, taken from request headers
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let ip_address = text("x-forwarded-for")
            .and_then(|chain| chain.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| text("x-real-ip"));

        Self {
            ip_address,
            user_agent: text(header::USER_AGENT.as_str()),
        }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientInfo::from_headers(&parts.headers))
    }
}

/// The caller behind a valid, live session
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub session_id: String,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn role(&self) -> &str {
        &self.user.role
    }

    pub fn is_admin(&self) -> bool {
        self.user.role == "admin"
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin access required".to_string()))
        }
    }

    /// 403 unless the caller's role may perform `action` on `resource`
    pub async fn require(&self, state: &AppState, resource: &str, action: &str) -> ApiResult<()> {
        if state
            .permissions
            .has_permission(self.role(), resource, action)
            .await
        {
            return Ok(());
        }

        tracing::debug!(
            "Denied {} on {} for user {} ({})",
            action,
            resource,
            self.id(),
            self.role()
        );
        Err(ApiError::Denied {
            detail: format!("Role {} cannot {} on {}", self.role(), action, resource),
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn idle_for(last_activity: &str) -> Option<chrono::Duration> {
    DateTime::parse_from_rfc3339(last_activity)
        .ok()
        .map(|ts| Utc::now() - ts.with_timezone(&Utc))
}

/// Resolve a token to its user, enforcing the session rules
pub async fn authenticate(state: &AppState, token: &str) -> ApiResult<AuthUser> {
    let claims = state.tokens.verify(token)?;

    let session = match state.db.get_user_session(&claims.session_id).await {
        Ok(session) if session.is_active && session.user_id == claims.id => session,
        Ok(_) | Err(crate::db::DatabaseError::NotFound(_)) => {
            return Err(ApiError::Unauthorized("Session expired".to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let timeout = chrono::Duration::from_std(state.session_timeout)
        .unwrap_or_else(|_| chrono::Duration::minutes(30));
    if idle_for(&session.last_activity).is_some_and(|idle| idle > timeout) {
        state.db.end_session(&session.id).await?;
        tracing::info!("Session {} of user {} timed out", session.id, claims.id);
        return Err(ApiError::SessionTimeout);
    }
    state.db.touch_session(&session.id).await?;

    let user = match state.db.get_user(claims.id).await {
        Ok(user) if user.is_active => user,
        Ok(_) | Err(crate::db::DatabaseError::NotFound(_)) => {
            return Err(ApiError::Unauthorized(
                "User not found or inactive".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    };

    Ok(AuthUser {
        user,
        session_id: session.id,
    })
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("No token provided".to_string()))?;
        authenticate(state, token).await
    }
}

/// Write an audit row; failures are logged, never surfaced
pub(crate) async fn audit(db: &Database, entry: NewAuditLog) {
    if let Err(e) = db.log_audit(&entry).await {
        tracing::error!("Failed to write audit entry {}: {}", entry.action, e);
    }
}

/// User view with the role's effective permissions attached
pub(crate) async fn user_payload(state: &AppState, user: &User) -> Value {
    let mut body = json!(user.view());
    body["permissions"] = json!(state.permissions.user_permissions(&user.role).await);
    body
}

/// Open a session and sign a token for it
pub(crate) async fn start_session(
    state: &AppState,
    user: &User,
    client: &ClientInfo,
) -> ApiResult<String> {
    let session = UserSession::new(user.id)
        .with_client(client.ip_address.clone(), client.user_agent.clone());
    state.db.create_user_session(&session).await?;
    state.db.touch_last_login(user.id).await?;

    Ok(state.tokens.issue(user, &session.id)?)
}

fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/2fa/verify-code", post(verify_login_code))
        .route("/2fa/verify-backup-code", post(verify_login_backup_code))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    email: Option<String>,
    username: Option<String>,
    mobile: Option<String>,
    password: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (Some(email), Some(password), Some(first_name), Some(last_name)) = (
        required(req.email).map(|e| e.to_lowercase()),
        req.password.filter(|p| !p.is_empty()),
        required(req.first_name),
        required(req.last_name),
    ) else {
        return Err(ApiError::bad_request(
            "Email, password, first name and last name are required",
        ));
    };
    PasswordManager::check_policy(&password)?;

    let username = required(req.username);
    let mobile = required(req.mobile);
    if state
        .db
        .user_exists(&email, username.as_deref(), mobile.as_deref())
        .await?
    {
        return Err(ApiError::bad_request("User already exists"));
    }

    let hash = state.passwords.hash_password(&password)?;
    let user = state
        .db
        .create_user(
            &NewUser::new(&email, hash, first_name, last_name)
                .with_username(username)
                .with_mobile(mobile),
        )
        .await?;

    let token = start_session(&state, &user, &client).await?;
    audit(
        &state.db,
        NewAuditLog::new(user.id, "USER_REGISTERED", "user")
            .entity(user.id)
            .new_values(json!({ "email": user.email }))
            .ip(client.ip_address.clone()),
    )
    .await;
    tracing::info!("Registered user {} ({})", user.id, user.email);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "token": token,
            "user": user_payload(&state, &user).await,
        })),
    ))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(alias = "email")]
    credential: Option<String>,
    password: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(credential), Some(password)) =
        (required(req.credential), req.password.filter(|p| !p.is_empty()))
    else {
        return Err(ApiError::bad_request("Credential and password are required"));
    };

    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());
    let user = state
        .db
        .find_user_by_credential(&credential)
        .await?
        .ok_or_else(invalid)?;

    if !state.passwords.verify_password(&password, &user.password_hash)? {
        return Err(invalid());
    }
    if !user.is_active {
        return Err(ApiError::Forbidden("Account is disabled".to_string()));
    }

    if let Some(record) = state.db.get_two_factor(user.id).await? {
        if record.is_enabled {
            return Ok(Json(json!({
                "success": true,
                "requires2FA": true,
                "userId": user.id,
            })));
        }
    }

    let body = complete_login(&state, &user, &client, "USER_LOGIN").await?;
    Ok(Json(body))
}

/// Session, token, audit and sign-in notification for a verified user
async fn complete_login(
    state: &AppState,
    user: &User,
    client: &ClientInfo,
    audit_action: &str,
) -> ApiResult<Value> {
    let token = start_session(state, user, client).await?;

    audit(
        &state.db,
        NewAuditLog::new(user.id, audit_action, "user")
            .entity(user.id)
            .ip(client.ip_address.clone()),
    )
    .await;
    notify::notify_quietly(
        &state.db,
        Notice::new(user.id, USER_LOGIN)
            .resource("user", user.id)
            .meta(
                "ip_address",
                client.ip_address.clone().unwrap_or_else(|| "unknown".to_string()),
            ),
    )
    .await;

    // Re-read so last_login reflects this sign-in
    let user = state.db.get_user(user.id).await?;
    Ok(json!({
        "success": true,
        "token": token,
        "user": user_payload(state, &user).await,
    }))
}

async fn me(State(state): State<AppState>, auth: AuthUser) -> Json<Value> {
    Json(json!({ "user": user_payload(&state, &auth.user).await }))
}

async fn refresh(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let token = state.tokens.issue(&auth.user, &auth.session_id)?;
    Ok(Json(json!({ "token": token })))
}

async fn logout(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    state.db.end_session(&auth.session_id).await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "USER_LOGOUT", "session").entity(&auth.session_id),
    )
    .await;
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

async fn logout_all(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let ended = state.db.end_user_sessions(auth.id(), None).await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "USER_LOGOUT_ALL", "session")
            .new_values(json!({ "sessions": ended })),
    )
    .await;
    Ok(Json(json!({
        "message": "Logged out from all sessions",
        "sessionsEnded": ended,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginCodeRequest {
    user_id: Option<i64>,
    code: Option<String>,
    backup_code: Option<String>,
}

/// The 2FA row and user for a pending login; applies the shared status rules
async fn pending_login(
    state: &AppState,
    user_id: i64,
) -> ApiResult<(User, crate::db::TwoFactorRecord)> {
    let record = state
        .db
        .get_two_factor(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("2FA not set up for this user"))?;
    if !record.is_enabled {
        return Err(ApiError::bad_request("2FA is not enabled"));
    }

    let user = state.db.get_user(user_id).await?;
    if !user.is_active {
        return Err(ApiError::Forbidden("Account is disabled".to_string()));
    }
    Ok((user, record))
}

async fn verify_login_code(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<LoginCodeRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(user_id), Some(code)) = (req.user_id, required(req.code)) else {
        return Err(ApiError::bad_request("userId and code are required"));
    };

    let (user, record) = pending_login(&state, user_id).await?;
    if !totp::verify_code(&record.secret, &code)? {
        return Err(ApiError::Unauthorized("Invalid verification code".to_string()));
    }

    let body = complete_login(&state, &user, &client, "USER_LOGIN_2FA").await?;
    Ok(Json(body))
}

async fn verify_login_backup_code(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<LoginCodeRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(user_id), Some(code)) = (req.user_id, required(req.backup_code.or(req.code))) else {
        return Err(ApiError::bad_request("userId and backupCode are required"));
    };

    let (user, _) = pending_login(&state, user_id).await?;
    let Some(remaining) = state.db.consume_backup_code(user.id, &code).await? else {
        return Err(ApiError::Unauthorized("Invalid backup code".to_string()));
    };

    let mut body = complete_login(&state, &user, &client, "USER_LOGIN_2FA").await?;
    body["remainingCodes"] = json!(remaining);
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn test_client_info_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.7, 172.16.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.1"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8"));

        let info = ClientInfo::from_headers(&headers);
        assert_eq!(info.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(info.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn test_idle_duration() {
        let ten_minutes_ago = (Utc::now() - chrono::Duration::minutes(10)).to_rfc3339();
        let idle = idle_for(&ten_minutes_ago).unwrap();
        assert!(idle >= chrono::Duration::minutes(10));
        assert!(idle_for("not a timestamp").is_none());
    }
}
