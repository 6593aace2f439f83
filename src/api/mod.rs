//! HTTP and WebSocket surface

mod ai;
mod auth;
mod brds;
mod collab;
mod dashboard;
mod diagrams;
mod error;
mod groups;
mod notifications;
mod permissions;
mod sessions;
mod stories;
mod two_factor;
mod users;

pub use auth::{AuthUser, ClientInfo};
pub use error::{ApiError, ApiResult};

use crate::ai::AiService;
use crate::collab::CollaborationHub;
use crate::config::{AppConfig, ConfigError};
use crate::db::{Database, DatabaseError};
use crate::permissions::PermissionRegistry;
use crate::security::{PasswordManager, SecretCipher, TokenService};
use axum::http::{header, HeaderValue, Method, Request};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared handles every handler can reach
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub tokens: TokenService,
    pub passwords: PasswordManager,
    pub permissions: PermissionRegistry,
    pub ai: AiService,
    pub hub: Arc<CollaborationHub>,
    pub session_timeout: Duration,
    pub cors_origins: Vec<String>,
}

impl AppState {
    /// Wire services from configuration around an open database
    pub async fn new(config: &AppConfig, db: Database) -> Result<Self, ServerError> {
        let tokens = TokenService::new(config.require_jwt_secret()?, config.token_ttl()?);
        let cipher = SecretCipher::new(config.encryption_secret()?);

        let permissions = PermissionRegistry::new();
        permissions.reload(&db).await?;

        Ok(Self {
            db,
            tokens,
            passwords: PasswordManager::new(),
            permissions,
            ai: AiService::new(&config.openai, cipher),
            hub: Arc::new(CollaborationHub::new()),
            session_timeout: config.session_timeout(),
            cors_origins: config.cors_origins.clone(),
        })
    }
}

/// `?limit=&offset=` style paging shared by list endpoints
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Paging {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub skip: Option<i64>,
}

impl Paging {
    pub fn limit_or(&self, default: i64, max: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, max)
    }

    pub fn offset(&self) -> i64 {
        self.offset.or(self.skip).unwrap_or(0).max(0)
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

/// Every route of the service
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/auth", auth::routes())
        .nest("/2fa", two_factor::routes())
        .nest("/user-stories", stories::routes())
        .nest("/brd", brds::routes())
        .nest("/diagrams", diagrams::routes())
        .nest("/ai", ai::generation_routes())
        .nest("/ai-stories", ai::story_routes())
        .nest("/ai-config", ai::config_routes())
        .nest("/groups", groups::routes())
        .nest("/notifications", notifications::routes())
        .nest("/collaboration", collab::routes())
        .nest("/sessions", sessions::session_routes())
        .nest("/activity", sessions::activity_routes())
        .nest("/profile", users::profile_routes())
        .nest("/users", users::admin_routes())
        .nest("/permissions", permissions::routes())
        .nest("/dashboard", dashboard::routes());

    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .merge(dashboard::health_routes())
        .merge(collab::ws_routes())
        .nest("/api", api)
        .layer(TraceLayer::new_for_http().make_span_with(request_span::<axum::body::Body>))
        .layer(cors)
        .with_state(state)
}

/// Request span carrying the path only; the query can hold a session token
fn request_span<B>(request: &Request<B>) -> tracing::Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// Open the database, build the router and serve until the process is stopped
pub async fn serve(config: &AppConfig) -> Result<(), ServerError> {
    let db = Database::new(&config.db_path).await?;
    tracing::info!("Database ready at {}", config.db_path.display());

    let state = AppState::new(config, db).await?;
    let app = router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_request_span_omits_query() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let request = Request::get("/ws?token=secret-jwt").body(()).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            let span = request_span(&request);
            let _entered = span.enter();
            tracing::info!("upgraded");
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("path=/ws"));
        assert!(output.contains("method=GET"));
        assert!(!output.contains("secret-jwt"));
    }
}
