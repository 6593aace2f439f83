//! Realtime BRD collaboration: presence, section locks, edits and mentions

mod events;
mod hub;

pub use events::{ClientEvent, LockedSection, Mention, ServerEvent, SessionInfo};
pub use hub::{
    CollaborationHub, ConnId, Effect, LoggedOperation, PendingOperations, LOCK_TIMEOUT,
    OPERATION_LOG_CAPACITY,
};
