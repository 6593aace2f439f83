//! Wire format of the realtime channel: `{"event": "...", "data": {...}}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent by clients
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
#[serde(rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinBrd {
        brd_id: String,
        #[serde(default)]
        user_name: Option<String>,
    },
    LeaveBrd {
        brd_id: String,
    },
    ContentChange {
        brd_id: String,
        section_id: String,
        #[serde(default)]
        change: Value,
    },
    SectionLock {
        brd_id: String,
        section_id: String,
    },
    SectionUnlock {
        brd_id: String,
        section_id: String,
    },
    CursorMove {
        brd_id: String,
        #[serde(default)]
        section_id: Option<String>,
        #[serde(default)]
        position: Value,
    },
    Mention {
        brd_id: String,
        mentioned_user_id: i64,
        mentioned_by_user_id: i64,
        #[serde(default)]
        mentioned_by_name: Option<String>,
        #[serde(default)]
        context: String,
    },
    CommentThread {
        brd_id: String,
        #[serde(default)]
        section_id: Option<String>,
        thread_id: String,
        action: String,
        #[serde(default)]
        comment_data: Value,
    },
}

/// Section lock as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedSection {
    pub section_id: String,
    pub locked_by: i64,
    pub since: String,
}

/// Snapshot of a BRD editing room
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub brd_id: String,
    pub active_users: Vec<i64>,
    pub locked_sections: Vec<LockedSection>,
}

/// In-memory mention waiting to be read
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    pub id: String,
    pub mentioned_by: i64,
    pub brd_id: String,
    pub context: String,
    pub timestamp: String,
    pub read: bool,
}

/// Messages pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
#[serde(rename_all_fields = "camelCase")]
pub enum ServerEvent {
    SessionInfo {
        brd_id: String,
        user_id: i64,
        active_users: Vec<i64>,
        locked_sections: Vec<LockedSection>,
        session_id: String,
    },
    UserJoined {
        user_id: i64,
        user_name: String,
        active_users: Vec<i64>,
        timestamp: String,
    },
    UserLeft {
        user_id: i64,
        active_users: Vec<i64>,
        timestamp: String,
    },
    ContentChanged {
        section_id: String,
        change: Value,
        user_id: i64,
        timestamp: String,
    },
    ChangeAcknowledged {
        operation_id: u64,
        timestamp: String,
    },
    SectionLocked {
        section_id: String,
        user_id: i64,
    },
    SectionLockUpdated {
        section_id: String,
        locked_by: Option<i64>,
        timestamp: String,
    },
    LockFailed {
        section_id: String,
        locked_by: i64,
        message: String,
    },
    SectionUnlocked {
        section_id: String,
    },
    CursorPositionUpdated {
        user_id: i64,
        section_id: Option<String>,
        position: Value,
        timestamp: String,
    },
    YouWereMentioned {
        by: String,
        brd_id: String,
        context: String,
        mention: Mention,
        timestamp: String,
    },
    MentionSent {
        mention_id: String,
        mentioned_user_id: i64,
        timestamp: String,
    },
    ThreadUpdated {
        brd_id: String,
        section_id: Option<String>,
        thread_id: String,
        action: String,
        user_id: i64,
        data: Value,
        timestamp: String,
    },
    ThreadAcknowledged {
        thread_id: String,
        action: String,
        timestamp: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::SessionInfo { .. } => "session-info",
            ServerEvent::UserJoined { .. } => "user-joined",
            ServerEvent::UserLeft { .. } => "user-left",
            ServerEvent::ContentChanged { .. } => "content-changed",
            ServerEvent::ChangeAcknowledged { .. } => "change-acknowledged",
            ServerEvent::SectionLocked { .. } => "section-locked",
            ServerEvent::SectionLockUpdated { .. } => "section-lock-updated",
            ServerEvent::LockFailed { .. } => "lock-failed",
            ServerEvent::SectionUnlocked { .. } => "section-unlocked",
            ServerEvent::CursorPositionUpdated { .. } => "cursor-position-updated",
            ServerEvent::YouWereMentioned { .. } => "you-were-mentioned",
            ServerEvent::MentionSent { .. } => "mention-sent",
            ServerEvent::ThreadUpdated { .. } => "thread-updated",
            ServerEvent::ThreadAcknowledged { .. } => "thread-acknowledged",
            ServerEvent::Error { .. } => "error",
        }
    }
}
