//! In-app notification dispatch
//!
//! A notification is delivered only when its type has a settings row with
//! in-app delivery on and a message template. System announcements skip the
//! settings check.

use crate::db::{Database, DatabaseError, NewNotification};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

pub const USER_LOGIN: &str = "USER_LOGIN";
pub const MENTION: &str = "MENTION";
pub const BRD_CREATED: &str = "BRD_CREATED";
pub const BRD_UPDATED: &str = "BRD_UPDATED";
pub const GROUP_MEMBER_ADDED: &str = "GROUP_MEMBER_ADDED";
pub const SYSTEM_ANNOUNCEMENT: &str = "SYSTEM_ANNOUNCEMENT";

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("valid regex");
}

/// A notification waiting to be dispatched
#[derive(Debug, Clone)]
pub struct Notice {
    pub user_id: i64,
    pub kind: String,
    pub actor_id: Option<i64>,
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub metadata: Map<String, Value>,
}

impl Notice {
    pub fn new(user_id: i64, kind: &str) -> Self {
        Self {
            user_id,
            kind: kind.to_string(),
            actor_id: None,
            resource_id: None,
            resource_type: None,
            metadata: Map::new(),
        }
    }

    pub fn actor(mut self, actor_id: i64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn resource(mut self, resource_type: &str, resource_id: impl ToString) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Substitute `{{key}}` from `metadata`. Unknown keys are left in place.
pub fn render_template(template: &str, metadata: &Map<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match metadata.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Deliver one notice. Returns the new row id, or `None` when delivery was skipped.
pub async fn notify(db: &Database, notice: &Notice) -> Result<Option<i64>, DatabaseError> {
    let setting = db.notification_setting(&notice.kind).await?;
    let enabled = match setting {
        Some(s) => s.is_enabled_in_app,
        None if notice.kind == SYSTEM_ANNOUNCEMENT => true,
        None => {
            tracing::warn!("No notification settings for type {}, skipping", notice.kind);
            return Ok(None);
        }
    };
    if !enabled {
        return Ok(None);
    }

    let Some(template) = db.notification_template(&notice.kind).await? else {
        tracing::warn!("No notification template for type {}, skipping", notice.kind);
        return Ok(None);
    };

    let id = db
        .insert_notification(&NewNotification {
            user_id: notice.user_id,
            actor_id: notice.actor_id,
            kind: notice.kind.clone(),
            resource_id: notice.resource_id.clone(),
            resource_type: notice.resource_type.clone(),
            message: render_template(&template.message_template, &notice.metadata),
        })
        .await?;

    Ok(Some(id))
}

/// Fire-and-forget variant for request handlers; failures are only logged
pub async fn notify_quietly(db: &Database, notice: Notice) {
    if let Err(e) = notify(db, &notice).await {
        tracing::error!("Failed to deliver {} notification: {}", notice.kind, e);
    }
}

/// Audience of a bulk announcement
#[derive(Debug, Clone, PartialEq)]
pub enum BulkTarget {
    All,
    Role(String),
    User(i64),
}

impl BulkTarget {
    pub fn parse(target_type: Option<&str>, target_value: Option<&Value>) -> Result<Self, String> {
        match target_type.unwrap_or("all") {
            "all" => Ok(BulkTarget::All),
            "role" => target_value
                .and_then(Value::as_str)
                .filter(|r| !r.is_empty())
                .map(|r| BulkTarget::Role(r.to_string()))
                .ok_or_else(|| "target_value must name a role".to_string()),
            "user" => target_value
                .and_then(|v| v.as_i64().or_else(|| v.as_str()?.parse().ok()))
                .map(BulkTarget::User)
                .ok_or_else(|| "target_value must be a user id".to_string()),
            other => Err(format!("Invalid target_type: {}", other)),
        }
    }
}

/// Send a system announcement to every active user in `target`
pub async fn send_bulk(
    db: &Database,
    actor_id: i64,
    target: &BulkTarget,
    message: &str,
) -> Result<usize, DatabaseError> {
    let recipients = match target {
        BulkTarget::All => db.active_user_ids(None).await?,
        BulkTarget::Role(role) => db.active_user_ids(Some(role)).await?,
        BulkTarget::User(id) => {
            db.get_user(*id).await?;
            vec![*id]
        }
    };

    let mut sent = 0;
    for user_id in recipients {
        let notice = Notice::new(user_id, SYSTEM_ANNOUNCEMENT)
            .actor(actor_id)
            .meta("message", message);
        if notify(db, &notice).await?.is_some() {
            sent += 1;
        }
    }

    tracing::info!("Bulk announcement delivered to {} users", sent);
    Ok(sent)
}
