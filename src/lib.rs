//! BA Assistant - backend for the Business Analyst Assistant
//!
//! A REST and WebSocket service that helps analysts turn requirements into
//! user stories, Business Requirements Documents (BRDs) and diagrams, with
//! LLM generation, role based permissions and realtime co-editing.
//!
//! # Modules
//!
//! - [`api`] - axum router, authentication extractors and handlers
//! - [`db`] - SQLite persistence through sqlx
//! - [`ai`] - OpenAI compatible generation, analysis and estimation
//! - [`collab`] - in-memory collaboration hub behind the WebSocket
//! - [`permissions`] - role matrix plus database overrides
//! - [`notify`] - templated in-app notifications
//! - [`security`] - passwords, tokens, TOTP and key encryption
//!
//! # Example
//!
//! ```rust,no_run
//! use ba_assistant::config::AppConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::load(None)?;
//! ba_assistant::api::serve(&config).await?;
//! # Ok(())
//! # }
//! ```

pub mod ai;
pub mod api;
pub mod collab;
pub mod config;
pub mod db;
pub mod logging;
pub mod notify;
pub mod permissions;
pub mod security;

pub use api::{router, AppState};
pub use config::AppConfig;
pub use db::Database;
