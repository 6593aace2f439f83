//! Database models

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339()
}

// ============================================================================
// Accounts
// ============================================================================

/// User record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    pub mobile: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub is_active: bool,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            mobile: self.mobile.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role.clone(),
            is_active: self.is_active,
            last_login: self.last_login.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Public shape of a user in API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    pub mobile: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub is_active: bool,
    pub last_login: Option<String>,
    pub created_at: String,
}

/// Fields for inserting a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: Option<String>,
    pub mobile: Option<String>,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl NewUser {
    pub fn new(
        email: impl Into<String>,
        password_hash: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            username: None,
            mobile: None,
            password_hash: password_hash.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role: "analyst".to_string(),
        }
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    pub fn with_mobile(mut self, mobile: Option<String>) -> Self {
        self.mobile = mobile;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }
}

/// Partial profile update; `None` keeps the stored value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub mobile: Option<String>,
}

/// Login session record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSession {
    pub id: String,
    pub user_id: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub login_time: String,
    pub last_activity: String,
    pub logout_time: Option<String>,
    pub is_active: bool,
}

impl UserSession {
    pub fn new(user_id: i64) -> Self {
        let now = now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            ip_address: None,
            user_agent: None,
            login_time: now.clone(),
            last_activity: now,
            logout_time: None,
            is_active: true,
        }
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: String,
}

/// Audit entry before insertion
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub user_id: Option<i64>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub ip_address: Option<String>,
}

impl NewAuditLog {
    pub fn new(user_id: i64, action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            old_values: None,
            new_values: None,
            ip_address: None,
        }
    }

    pub fn entity(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn old_values(mut self, values: serde_json::Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: serde_json::Value) -> Self {
        self.new_values = Some(values);
        self
    }

    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }
}

/// Two-factor record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TwoFactorRecord {
    pub user_id: i64,
    pub secret: String,
    pub backup_codes: Json<Vec<String>>,
    pub is_enabled: bool,
    pub enabled_at: Option<String>,
}

/// Custom permission row overriding the built-in role table
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CustomPermission {
    pub id: i64,
    pub role: String,
    pub resource: String,
    pub action: String,
    pub created_at: String,
}

// ============================================================================
// Groups
// ============================================================================

/// Group with owner email and member count
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    pub created_by_email: Option<String>,
    pub member_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Group membership joined with the user's identity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupMember {
    pub group_id: i64,
    pub user_id: i64,
    pub role: String,
    pub added_at: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

// ============================================================================
// User stories
// ============================================================================

/// User story record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserStory {
    pub id: i64,
    pub user_id: i64,
    pub group_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub priority: String,
    pub status: String,
    pub tags: Json<Vec<String>>,
    pub estimated_points: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Story fields supplied by a client. On update, `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub group_id: Option<i64>,
    pub estimated_points: Option<i64>,
}

/// List filters for stories
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoryFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
}

// ============================================================================
// BRDs
// ============================================================================

/// Business requirements document
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Brd {
    pub id: String,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub story_ids: Json<Vec<i64>>,
    pub template: String,
    pub status: String,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Brd {
    pub fn new(user_id: i64, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            title: title.into(),
            content: content.into(),
            story_ids: Json(Vec::new()),
            template: "full".to_string(),
            status: "draft".to_string(),
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_stories(mut self, story_ids: Vec<i64>) -> Self {
        self.story_ids = Json(story_ids);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }
}

/// Partial BRD update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrdUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<String>,
}

/// Snapshot of a BRD at a version
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BrdVersion {
    pub id: i64,
    pub brd_id: String,
    pub version_number: i64,
    pub title: String,
    pub content: String,
    pub created_by: Option<i64>,
    pub created_at: String,
}

/// Cached quality analysis for a BRD
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BrdAnalysis {
    pub brd_id: String,
    pub score: i64,
    pub risk_level: String,
    pub summary: String,
    pub strengths: Json<Vec<String>>,
    pub gaps: Json<Vec<String>>,
    pub suggestions: Json<Vec<String>>,
    pub analyzed_at: String,
}

/// BRD comment joined with the author's name
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BrdComment {
    pub id: i64,
    pub brd_id: String,
    pub user_id: i64,
    pub author_name: String,
    pub section_id: Option<String>,
    pub content: String,
    pub created_at: String,
}

// ============================================================================
// Diagrams
// ============================================================================

/// Diagram record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Diagram {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub diagram_type: String,
    pub content: String,
    pub brd_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Diagram fields supplied by a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagramInput {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "type")]
    pub diagram_type: Option<String>,
    pub content: Option<String>,
    pub brd_id: Option<String>,
}

/// List filters for diagrams
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagramFilter {
    #[serde(rename = "type")]
    pub diagram_type: Option<String>,
    pub search: Option<String>,
}

// ============================================================================
// AI
// ============================================================================

/// Story produced by the model and kept for later import
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AiStory {
    pub id: i64,
    pub user_id: i64,
    pub brd_id: Option<String>,
    pub diagram_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Json<Vec<String>>,
    pub estimated_points: i64,
    pub priority: String,
    pub business_value: Option<String>,
    pub created_at: String,
}

/// Per-user model settings. `api_key` holds ciphertext.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AiConfiguration {
    pub user_id: i64,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: i64,
    pub language: String,
    pub detail_level: String,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// Notifications & collaboration
// ============================================================================

/// Notification joined with the actor's display name
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub actor_id: Option<i64>,
    pub actor_name: Option<String>,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

/// Notification before insertion
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub actor_id: Option<i64>,
    pub kind: String,
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationSetting {
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub is_enabled_in_app: bool,
    pub is_enabled_email: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationTemplate {
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub subject_template: String,
    pub message_template: String,
}

/// Persisted realtime edit operation
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CollaborationOperation {
    pub id: i64,
    pub brd_id: String,
    pub user_id: i64,
    pub operation_type: String,
    pub data: Json<serde_json::Value>,
    pub created_at: String,
}

/// Per-status count used by the dashboard
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}
