//! Role based access control.
//!
//! A static table maps role → resource → actions. Rows in the `permissions`
//! table override it: when a role has any custom action on a resource, that
//! custom set replaces the built-in one for the resource.

use crate::db::{Database, DatabaseError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Analyst,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Analyst, Role::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Analyst => "analyst",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "analyst" => Ok(Role::Analyst),
            "viewer" => Ok(Role::Viewer),
            other => Err(format!("Invalid role: {}", other)),
        }
    }
}

pub const RESOURCES: [&str; 17] = [
    "users",
    "groups",
    "user_stories",
    "brds",
    "diagrams",
    "documents",
    "templates",
    "reports",
    "settings",
    "audit_logs",
    "dashboard",
    "sessions",
    "activity",
    "ai",
    "permissions",
    "profile",
    "notifications",
];

const CRUD: &[&str] = &["create", "read", "update", "delete"];
const READ: &[&str] = &["read"];
const NONE: &[&str] = &[];

type ResourceTable = BTreeMap<&'static str, &'static [&'static str]>;

fn row(
    resource: &'static str,
    actions: &'static [&'static str],
) -> (&'static str, &'static [&'static str]) {
    (resource, actions)
}

lazy_static::lazy_static! {
    /// Built-in actions per role and resource
    pub static ref ROLE_PERMISSIONS: BTreeMap<&'static str, ResourceTable> = {
        let admin: ResourceTable = [
            row(
                "users",
                &[
                    "create",
                    "read",
                    "update",
                    "delete",
                    "manage_roles",
                    "reset_password",
                    "manage_status",
                ],
            ),
            row("groups", &["create", "read", "update", "delete", "manage_members"]),
            row("user_stories", &["create", "read", "update", "delete", "publish"]),
            row("brds", &["create", "read", "update", "delete", "publish", "comment", "generate"]),
            row("diagrams", CRUD),
            row("documents", &["create", "read", "update", "delete", "share"]),
            row("templates", &["create", "read", "update", "delete", "share"]),
            row("reports", &["create", "read", "update", "delete", "export"]),
            row("settings", &["read", "update", "manage_audit_logs", "manage_roles"]),
            row("audit_logs", READ),
            row("dashboard", &["read", "view_analytics"]),
            row("sessions", &["read", "terminate"]),
            row("activity", &["read", "read_all", "export"]),
            row("ai", &["configure", "read", "generate"]),
            row("permissions", READ),
            row("profile", &["read", "update"]),
            row("notifications", &["read", "manage", "send_bulk", "configure"]),
        ]
        .into_iter()
        .collect();

        let analyst: ResourceTable = [
            row("users", READ),
            row("groups", &["read", "manage_members"]),
            row("user_stories", CRUD),
            row("brds", &["create", "read", "update", "delete", "comment", "generate"]),
            row("diagrams", CRUD),
            row("documents", CRUD),
            row("templates", CRUD),
            row("reports", &["create", "read", "export"]),
            row("settings", READ),
            row("audit_logs", NONE),
            row("dashboard", READ),
            row("sessions", &["read", "terminate"]),
            row("activity", READ),
            row("ai", &["configure", "read", "generate"]),
            row("permissions", READ),
            row("profile", &["read", "update"]),
            row("notifications", READ),
        ]
        .into_iter()
        .collect();

        let viewer: ResourceTable = [
            row("users", NONE),
            row("groups", READ),
            row("user_stories", READ),
            row("brds", &["read", "comment"]),
            row("diagrams", READ),
            row("documents", READ),
            row("templates", READ),
            row("reports", READ),
            row("settings", READ),
            row("audit_logs", NONE),
            row("dashboard", READ),
            row("sessions", &["read", "terminate"]),
            row("activity", READ),
            row("ai", &["read", "generate"]),
            row("permissions", READ),
            row("profile", READ),
            row("notifications", READ),
        ]
        .into_iter()
        .collect();

        [("admin", admin), ("analyst", analyst), ("viewer", viewer)]
            .into_iter()
            .collect()
    };
}

/// Built-in actions for one role and resource
pub fn base_actions(role: &str, resource: &str) -> &'static [&'static str] {
    ROLE_PERMISSIONS
        .get(role)
        .and_then(|table| table.get(resource))
        .copied()
        .unwrap_or(NONE)
}

/// Effective actions per resource
pub type PermissionMap = BTreeMap<String, Vec<String>>;

/// Built-in table merged with the overrides stored in the database
#[derive(Clone, Default)]
pub struct PermissionRegistry {
    custom: Arc<RwLock<HashMap<(String, String), BTreeSet<String>>>>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the in-memory overrides with the database rows
    pub async fn reload(&self, db: &Database) -> Result<usize, DatabaseError> {
        let rows = db.list_custom_permissions().await?;
        let count = rows.len();

        let mut custom: HashMap<(String, String), BTreeSet<String>> = HashMap::new();
        for row in rows {
            custom
                .entry((row.role, row.resource))
                .or_default()
                .insert(row.action);
        }

        *self.custom.write().await = custom;
        tracing::debug!("Loaded {} custom permission rows", count);
        Ok(count)
    }

    pub async fn grant(
        &self,
        db: &Database,
        role: &str,
        resource: &str,
        action: &str,
    ) -> Result<bool, DatabaseError> {
        let added = db.add_custom_permission(role, resource, action).await?;
        self.reload(db).await?;
        Ok(added)
    }

    pub async fn revoke(
        &self,
        db: &Database,
        role: &str,
        resource: &str,
        action: &str,
    ) -> Result<bool, DatabaseError> {
        let removed = db.remove_custom_permission(role, resource, action).await?;
        self.reload(db).await?;
        Ok(removed)
    }

    async fn effective(&self, role: &str, resource: &str) -> Vec<String> {
        let custom = self.custom.read().await;
        match custom.get(&(role.to_string(), resource.to_string())) {
            Some(actions) if !actions.is_empty() => actions.iter().cloned().collect(),
            _ => base_actions(role, resource)
                .iter()
                .map(|a| a.to_string())
                .collect(),
        }
    }

    pub async fn has_permission(&self, role: &str, resource: &str, action: &str) -> bool {
        self.effective(role, resource)
            .await
            .iter()
            .any(|a| a == action)
    }

    /// Every known resource with the role's effective actions
    pub async fn user_permissions(&self, role: &str) -> PermissionMap {
        let mut resources: BTreeSet<String> = RESOURCES.iter().map(|r| r.to_string()).collect();
        {
            let custom = self.custom.read().await;
            resources.extend(
                custom
                    .keys()
                    .filter(|(r, _)| r == role)
                    .map(|(_, resource)| resource.clone()),
            );
        }

        let mut map = PermissionMap::new();
        for resource in resources {
            let actions = self.effective(role, &resource).await;
            map.insert(resource, actions);
        }
        map
    }

    /// Resources on which the role has at least one action
    pub async fn accessible_resources(&self, role: &str) -> Vec<String> {
        self.user_permissions(role)
            .await
            .into_iter()
            .filter(|(_, actions)| !actions.is_empty())
            .map(|(resource, _)| resource)
            .collect()
    }
}
