//! In-memory state shared by every realtime connection

use super::events::{ClientEvent, LockedSection, Mention, ServerEvent, SessionInfo};
use crate::db::NewOperation;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

/// Operations kept in memory across all BRDs
pub const OPERATION_LOG_CAPACITY: usize = 10_000;
/// A lock older than this can be taken over by another user
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

pub type ConnId = u64;

/// Work the caller has to finish outside the hub
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Flush the BRD's unsaved operations to the database
    Persist { brd_id: String },
    /// Record a MENTION notification
    Mentioned {
        mentioned_user_id: i64,
        actor_id: i64,
        brd_id: String,
        context: String,
    },
}

/// Operations claimed for writing, with their log ids
#[derive(Debug, Default)]
pub struct PendingOperations {
    pub ids: Vec<u64>,
    pub operations: Vec<NewOperation>,
}

/// Operation held in the in-memory log
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedOperation {
    pub id: u64,
    pub brd_id: String,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub timestamp: String,
    #[serde(skip)]
    persisted: bool,
}

struct Connection {
    user_id: i64,
    user_name: String,
    sender: UnboundedSender<ServerEvent>,
    rooms: HashSet<String>,
}

struct SectionLock {
    user_id: i64,
    brd_id: String,
    acquired: Instant,
    since: DateTime<Utc>,
}

#[derive(Default)]
struct HubState {
    next_conn: ConnId,
    next_op: u64,
    connections: HashMap<ConnId, Connection>,
    /// brd id → user id → that user's connections in the room
    rooms: HashMap<String, BTreeMap<i64, BTreeSet<ConnId>>>,
    locks: HashMap<String, SectionLock>,
    operations: VecDeque<LoggedOperation>,
    mentions: HashMap<i64, Vec<Mention>>,
}

impl HubState {
    fn send(&self, conn: ConnId, event: ServerEvent) {
        if let Some(c) = self.connections.get(&conn) {
            // A closed receiver means the socket is gone; the event is dropped
            let _ = c.sender.send(event);
        }
    }

    fn send_to_user(&self, user_id: i64, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        for c in self.connections.values().filter(|c| c.user_id == user_id) {
            if c.sender.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn broadcast(&self, brd_id: &str, except: Option<ConnId>, event: &ServerEvent) {
        let Some(room) = self.rooms.get(brd_id) else {
            return;
        };
        for conn in room.values().flatten() {
            if Some(*conn) != except {
                self.send(*conn, event.clone());
            }
        }
    }

    fn active_users(&self, brd_id: &str) -> Vec<i64> {
        self.rooms
            .get(brd_id)
            .map(|room| room.keys().copied().collect())
            .unwrap_or_default()
    }

    fn locked_sections(&self, brd_id: &str) -> Vec<LockedSection> {
        let mut sections: Vec<LockedSection> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.brd_id == brd_id)
            .map(|(section_id, lock)| LockedSection {
                section_id: section_id.clone(),
                locked_by: lock.user_id,
                since: lock.since.to_rfc3339(),
            })
            .collect();
        sections.sort_by(|a, b| a.section_id.cmp(&b.section_id));
        sections
    }

    fn log_operation(&mut self, brd_id: &str, user_id: i64, kind: &str, data: Value) -> u64 {
        self.next_op += 1;
        self.operations.push_back(LoggedOperation {
            id: self.next_op,
            brd_id: brd_id.to_string(),
            user_id,
            kind: kind.to_string(),
            data,
            timestamp: now(),
            persisted: false,
        });
        while self.operations.len() > OPERATION_LOG_CAPACITY {
            self.operations.pop_front();
        }
        self.next_op
    }

    /// Remove one connection from a room; true when the user left the room entirely
    fn leave_room(&mut self, conn: ConnId, user_id: i64, brd_id: &str) -> bool {
        let Some(room) = self.rooms.get_mut(brd_id) else {
            return false;
        };
        let mut user_gone = false;
        if let Some(conns) = room.get_mut(&user_id) {
            conns.remove(&conn);
            if conns.is_empty() {
                room.remove(&user_id);
                user_gone = true;
            }
        }
        if room.is_empty() {
            self.rooms.remove(brd_id);
        }
        if let Some(c) = self.connections.get_mut(&conn) {
            c.rooms.remove(brd_id);
        }
        user_gone
    }

    /// Drop every lock held by `user_id`, returning (brd, section) pairs
    fn release_locks(&mut self, user_id: i64) -> Vec<(String, String)> {
        let sections: Vec<String> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.user_id == user_id)
            .map(|(section, _)| section.clone())
            .collect();

        sections
            .into_iter()
            .filter_map(|section| {
                self.locks
                    .remove(&section)
                    .map(|lock| (lock.brd_id, section))
            })
            .collect()
    }

    fn announce_unlocked(&self, released: &[(String, String)]) {
        for (brd_id, section_id) in released {
            self.broadcast(
                brd_id,
                None,
                &ServerEvent::SectionLockUpdated {
                    section_id: section_id.clone(),
                    locked_by: None,
                    timestamp: now(),
                },
            );
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Rooms, section locks, the operation log and pending mentions.
///
/// All methods are synchronous; async follow-up work is returned as [`Effect`]s.
pub struct CollaborationHub {
    state: Mutex<HubState>,
    lock_timeout: Duration,
}

impl Default for CollaborationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl CollaborationHub {
    pub fn new() -> Self {
        Self::with_lock_timeout(LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            lock_timeout,
        }
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a socket for an authenticated user
    pub fn connect(
        &self,
        user_id: i64,
        user_name: &str,
        sender: UnboundedSender<ServerEvent>,
    ) -> ConnId {
        let mut state = self.state();
        state.next_conn += 1;
        let id = state.next_conn;
        state.connections.insert(
            id,
            Connection {
                user_id,
                user_name: user_name.to_string(),
                sender,
                rooms: HashSet::new(),
            },
        );
        id
    }

    /// Forget a socket. Leaves its rooms and releases all of its user's locks.
    pub fn disconnect(&self, conn: ConnId) -> Vec<Effect> {
        let mut state = self.state();
        let Some(connection) = state.connections.get(&conn) else {
            return Vec::new();
        };
        let user_id = connection.user_id;
        let rooms: Vec<String> = connection.rooms.iter().cloned().collect();

        let mut effects = Vec::new();
        for brd_id in rooms {
            if state.leave_room(conn, user_id, &brd_id) {
                let event = ServerEvent::UserLeft {
                    user_id,
                    active_users: state.active_users(&brd_id),
                    timestamp: now(),
                };
                state.broadcast(&brd_id, Some(conn), &event);
            }
            effects.push(Effect::Persist { brd_id });
        }

        state.connections.remove(&conn);
        let released = state.release_locks(user_id);
        state.announce_unlocked(&released);

        tracing::debug!(
            "Connection {} of user {} closed, released {} locks",
            conn,
            user_id,
            released.len()
        );
        effects
    }

    /// Apply one client message
    pub fn handle(&self, conn: ConnId, event: ClientEvent) -> Vec<Effect> {
        let mut state = self.state();
        let Some(connection) = state.connections.get(&conn) else {
            return Vec::new();
        };
        let user_id = connection.user_id;
        let user_name = connection.user_name.clone();

        match event {
            ClientEvent::JoinBrd {
                brd_id,
                user_name: display_name,
            } => {
                if brd_id.is_empty() {
                    state.send(conn, ServerEvent::error("Incomplete data"));
                    return Vec::new();
                }
                state
                    .rooms
                    .entry(brd_id.clone())
                    .or_default()
                    .entry(user_id)
                    .or_default()
                    .insert(conn);
                if let Some(c) = state.connections.get_mut(&conn) {
                    c.rooms.insert(brd_id.clone());
                }

                let active_users = state.active_users(&brd_id);
                state.send(
                    conn,
                    ServerEvent::SessionInfo {
                        brd_id: brd_id.clone(),
                        user_id,
                        active_users: active_users.clone(),
                        locked_sections: state.locked_sections(&brd_id),
                        session_id: conn.to_string(),
                    },
                );
                state.broadcast(
                    &brd_id,
                    Some(conn),
                    &ServerEvent::UserJoined {
                        user_id,
                        user_name: display_name.unwrap_or(user_name),
                        active_users,
                        timestamp: now(),
                    },
                );
                Vec::new()
            }

            ClientEvent::LeaveBrd { brd_id } => {
                state.leave_room(conn, user_id, &brd_id);
                let released = state.release_locks(user_id);
                state.announce_unlocked(&released);
                state.broadcast(
                    &brd_id,
                    Some(conn),
                    &ServerEvent::UserLeft {
                        user_id,
                        active_users: state.active_users(&brd_id),
                        timestamp: now(),
                    },
                );
                vec![Effect::Persist { brd_id }]
            }

            ClientEvent::ContentChange {
                brd_id,
                section_id,
                change,
            } => {
                if brd_id.is_empty() || section_id.is_empty() {
                    state.send(conn, ServerEvent::error("Incomplete data"));
                    return Vec::new();
                }
                let operation_id = state.log_operation(
                    &brd_id,
                    user_id,
                    "content-change",
                    json!({ "sectionId": section_id, "change": change }),
                );
                state.broadcast(
                    &brd_id,
                    Some(conn),
                    &ServerEvent::ContentChanged {
                        section_id,
                        change,
                        user_id,
                        timestamp: now(),
                    },
                );
                state.send(
                    conn,
                    ServerEvent::ChangeAcknowledged {
                        operation_id,
                        timestamp: now(),
                    },
                );
                Vec::new()
            }

            ClientEvent::SectionLock { brd_id, section_id } => {
                if let Some(lock) = state.locks.get(&section_id) {
                    if lock.user_id != user_id && lock.acquired.elapsed() < self.lock_timeout {
                        let locked_by = lock.user_id;
                        state.send(
                            conn,
                            ServerEvent::LockFailed {
                                section_id,
                                locked_by,
                                message: "Section is being edited by another user".to_string(),
                            },
                        );
                        return Vec::new();
                    }
                }

                state.locks.insert(
                    section_id.clone(),
                    SectionLock {
                        user_id,
                        brd_id: brd_id.clone(),
                        acquired: Instant::now(),
                        since: Utc::now(),
                    },
                );
                state.send(
                    conn,
                    ServerEvent::SectionLocked {
                        section_id: section_id.clone(),
                        user_id,
                    },
                );
                state.broadcast(
                    &brd_id,
                    Some(conn),
                    &ServerEvent::SectionLockUpdated {
                        section_id,
                        locked_by: Some(user_id),
                        timestamp: now(),
                    },
                );
                Vec::new()
            }

            ClientEvent::SectionUnlock { brd_id, section_id } => {
                let owned = state
                    .locks
                    .get(&section_id)
                    .is_some_and(|lock| lock.user_id == user_id);
                if !owned {
                    return Vec::new();
                }
                state.locks.remove(&section_id);
                state.send(
                    conn,
                    ServerEvent::SectionUnlocked {
                        section_id: section_id.clone(),
                    },
                );
                state.broadcast(
                    &brd_id,
                    None,
                    &ServerEvent::SectionLockUpdated {
                        section_id,
                        locked_by: None,
                        timestamp: now(),
                    },
                );
                Vec::new()
            }

            ClientEvent::CursorMove {
                brd_id,
                section_id,
                position,
            } => {
                if brd_id.is_empty() {
                    state.send(conn, ServerEvent::error("BRD ID missing"));
                    return Vec::new();
                }
                state.broadcast(
                    &brd_id,
                    Some(conn),
                    &ServerEvent::CursorPositionUpdated {
                        user_id,
                        section_id,
                        position,
                        timestamp: now(),
                    },
                );
                Vec::new()
            }

            ClientEvent::Mention {
                brd_id,
                mentioned_user_id,
                mentioned_by_user_id,
                mentioned_by_name,
                context,
            } => {
                if mentioned_by_user_id != user_id {
                    state.send(
                        conn,
                        ServerEvent::error("Not allowed to mention on behalf of another user"),
                    );
                    return Vec::new();
                }

                let mention = Mention {
                    id: mention_id(),
                    mentioned_by: user_id,
                    brd_id: brd_id.clone(),
                    context: context.clone(),
                    timestamp: now(),
                    read: false,
                };
                state
                    .mentions
                    .entry(mentioned_user_id)
                    .or_default()
                    .push(mention.clone());

                state.send_to_user(
                    mentioned_user_id,
                    &ServerEvent::YouWereMentioned {
                        by: mentioned_by_name.unwrap_or(user_name),
                        brd_id: brd_id.clone(),
                        context: context.clone(),
                        mention: mention.clone(),
                        timestamp: now(),
                    },
                );
                state.send(
                    conn,
                    ServerEvent::MentionSent {
                        mention_id: mention.id,
                        mentioned_user_id,
                        timestamp: now(),
                    },
                );

                vec![Effect::Mentioned {
                    mentioned_user_id,
                    actor_id: user_id,
                    brd_id,
                    context,
                }]
            }

            ClientEvent::CommentThread {
                brd_id,
                section_id,
                thread_id,
                action,
                comment_data,
            } => {
                state.log_operation(
                    &brd_id,
                    user_id,
                    "comment-thread",
                    json!({
                        "sectionId": section_id,
                        "threadId": thread_id,
                        "action": action,
                        "data": comment_data,
                    }),
                );
                state.broadcast(
                    &brd_id,
                    None,
                    &ServerEvent::ThreadUpdated {
                        brd_id: brd_id.clone(),
                        section_id,
                        thread_id: thread_id.clone(),
                        action: action.clone(),
                        user_id,
                        data: comment_data,
                        timestamp: now(),
                    },
                );
                state.send(
                    conn,
                    ServerEvent::ThreadAcknowledged {
                        thread_id,
                        action,
                        timestamp: now(),
                    },
                );
                Vec::new()
            }
        }
    }

    pub fn session_info(&self, brd_id: &str) -> SessionInfo {
        let state = self.state();
        SessionInfo {
            brd_id: brd_id.to_string(),
            active_users: state.active_users(brd_id),
            locked_sections: state.locked_sections(brd_id),
        }
    }

    /// The BRD's latest `limit` operations, newest first
    pub fn operation_history(&self, brd_id: &str, limit: usize) -> Vec<LoggedOperation> {
        self.state()
            .operations
            .iter()
            .rev()
            .filter(|op| op.brd_id == brd_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Claim the unsaved operations of a BRD, oldest first.
    ///
    /// Claimed operations are skipped by later calls. Pass the returned ids
    /// to [`CollaborationHub::release_unpersisted`] if the write fails.
    pub fn take_unpersisted(&self, brd_id: &str) -> PendingOperations {
        let mut state = self.state();
        let mut pending = PendingOperations::default();
        for op in state
            .operations
            .iter_mut()
            .filter(|op| op.brd_id == brd_id && !op.persisted)
        {
            op.persisted = true;
            pending.ids.push(op.id);
            pending.operations.push(NewOperation {
                brd_id: op.brd_id.clone(),
                user_id: op.user_id,
                operation_type: op.kind.clone(),
                data: op.data.clone(),
                created_at: op.timestamp.clone(),
            });
        }
        pending
    }

    /// Hand claimed operations back so the next persist retries them.
    /// Ids already evicted from the log are ignored.
    pub fn release_unpersisted(&self, ids: &[u64]) -> usize {
        let mut state = self.state();
        let mut released = 0;
        for op in state.operations.iter_mut().filter(|op| ids.contains(&op.id)) {
            op.persisted = false;
            released += 1;
        }
        released
    }

    pub fn mentions_for(&self, user_id: i64, unread_only: bool) -> Vec<Mention> {
        self.state()
            .mentions
            .get(&user_id)
            .map(|list| {
                list.iter()
                    .filter(|m| !unread_only || !m.read)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn mark_mention_read(&self, user_id: i64, mention_id: &str) -> bool {
        let mut state = self.state();
        match state
            .mentions
            .get_mut(&user_id)
            .and_then(|list| list.iter_mut().find(|m| m.id == mention_id))
        {
            Some(mention) => {
                mention.read = true;
                true
            }
            None => false,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.state().connections.len()
    }
}

fn mention_id() -> String {
    format!(
        "mention_{}_{}",
        Utc::now().timestamp_millis(),
        rand::thread_rng().gen::<u32>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn join(
        hub: &CollaborationHub,
        user_id: i64,
        brd: &str,
    ) -> (ConnId, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = unbounded_channel();
        let conn = hub.connect(user_id, &format!("user{}", user_id), tx);
        hub.handle(
            conn,
            ClientEvent::JoinBrd {
                brd_id: brd.into(),
                user_name: None,
            },
        );
        (conn, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn lock(hub: &CollaborationHub, conn: ConnId, section: &str) {
        hub.handle(
            conn,
            ClientEvent::SectionLock {
                brd_id: "b1".into(),
                section_id: section.into(),
            },
        );
    }

    #[test]
    fn test_join_broadcasts_presence() {
        let hub = CollaborationHub::new();
        let (_a, mut rx_a) = join(&hub, 1, "b1");
        let (_b, mut rx_b) = join(&hub, 2, "b1");

        let a_events = drain(&mut rx_a);
        assert_eq!(a_events[0].name(), "session-info");
        assert!(matches!(
            &a_events[1],
            ServerEvent::UserJoined { user_id: 2, active_users, .. } if active_users == &vec![1, 2]
        ));
        assert_eq!(drain(&mut rx_b)[0].name(), "session-info");
        assert_eq!(hub.session_info("b1").active_users, vec![1, 2]);
    }

    #[test]
    fn test_lock_conflict_and_owner_unlock() {
        let hub = CollaborationHub::new();
        let (a, mut rx_a) = join(&hub, 1, "b1");
        let (b, mut rx_b) = join(&hub, 2, "b1");
        drain(&mut rx_a);
        drain(&mut rx_b);

        lock(&hub, a, "intro");
        lock(&hub, b, "intro");
        assert!(matches!(
            drain(&mut rx_b).as_slice(),
            [ServerEvent::SectionLockUpdated { .. }, ServerEvent::LockFailed { locked_by: 1, .. }]
        ));

        // Only the owner can unlock
        hub.handle(
            b,
            ClientEvent::SectionUnlock {
                brd_id: "b1".into(),
                section_id: "intro".into(),
            },
        );
        assert_eq!(hub.session_info("b1").locked_sections.len(), 1);

        hub.handle(
            a,
            ClientEvent::SectionUnlock {
                brd_id: "b1".into(),
                section_id: "intro".into(),
            },
        );
        assert!(hub.session_info("b1").locked_sections.is_empty());
    }

    #[test]
    fn test_stale_lock_can_be_taken_over() {
        let hub = CollaborationHub::with_lock_timeout(Duration::ZERO);
        let (a, _rx_a) = join(&hub, 1, "b1");
        let (b, mut rx_b) = join(&hub, 2, "b1");

        lock(&hub, a, "intro");
        drain(&mut rx_b);
        lock(&hub, b, "intro");

        assert!(drain(&mut rx_b)
            .iter()
            .any(|e| matches!(e, ServerEvent::SectionLocked { user_id: 2, .. })));
        assert_eq!(hub.session_info("b1").locked_sections[0].locked_by, 2);
    }

    #[test]
    fn test_disconnect_releases_locks() {
        let hub = CollaborationHub::new();
        let (a, _rx_a) = join(&hub, 1, "b1");
        let (_b, mut rx_b) = join(&hub, 2, "b1");
        lock(&hub, a, "intro");
        lock(&hub, a, "scope");
        drain(&mut rx_b);

        let effects = hub.disconnect(a);
        assert_eq!(effects, vec![Effect::Persist { brd_id: "b1".into() }]);
        assert!(hub.session_info("b1").locked_sections.is_empty());
        assert_eq!(hub.session_info("b1").active_users, vec![2]);

        let events = drain(&mut rx_b);
        assert_eq!(events.iter().filter(|e| e.name() == "section-lock-updated").count(), 2);
        assert!(events.iter().any(|e| e.name() == "user-left"));
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn test_mention_sender_must_match_socket() {
        let hub = CollaborationHub::new();
        let (a, mut rx_a) = join(&hub, 1, "b1");
        let (_b, mut rx_b) = join(&hub, 2, "b1");
        drain(&mut rx_a);
        drain(&mut rx_b);

        let forged = hub.handle(
            a,
            ClientEvent::Mention {
                brd_id: "b1".into(),
                mentioned_user_id: 2,
                mentioned_by_user_id: 3,
                mentioned_by_name: None,
                context: "see scope".into(),
            },
        );
        assert!(forged.is_empty());
        assert_eq!(drain(&mut rx_a)[0].name(), "error");

        let effects = hub.handle(
            a,
            ClientEvent::Mention {
                brd_id: "b1".into(),
                mentioned_user_id: 2,
                mentioned_by_user_id: 1,
                mentioned_by_name: Some("Ana".into()),
                context: "see scope".into(),
            },
        );
        assert!(matches!(effects[0], Effect::Mentioned { mentioned_user_id: 2, actor_id: 1, .. }));
        assert_eq!(drain(&mut rx_a)[0].name(), "mention-sent");
        assert_eq!(drain(&mut rx_b)[0].name(), "you-were-mentioned");

        let pending = hub.mentions_for(2, true);
        assert_eq!(pending.len(), 1);
        assert!(pending[0].id.starts_with("mention_"));
        assert!(hub.mark_mention_read(2, &pending[0].id));
        assert!(hub.mentions_for(2, true).is_empty());
        assert!(!hub.mark_mention_read(1, &pending[0].id));
    }

    #[test]
    fn test_operation_history_and_persistence_flags() {
        let hub = CollaborationHub::new();
        let (a, mut rx_a) = join(&hub, 1, "b1");

        for i in 0..3 {
            hub.handle(
                a,
                ClientEvent::ContentChange {
                    brd_id: "b1".into(),
                    section_id: "s".into(),
                    change: json!({ "seq": i }),
                },
            );
        }
        assert!(drain(&mut rx_a)
            .iter()
            .any(|e| matches!(e, ServerEvent::ChangeAcknowledged { operation_id: 3, .. })));

        let history = hub.operation_history("b1", 2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].data["change"]["seq"], 2);

        let pending = hub.take_unpersisted("b1");
        assert_eq!(pending.operations.len(), 3);
        assert_eq!(pending.ids, vec![1, 2, 3]);
        assert_eq!(pending.operations[0].data["change"]["seq"], 0);
        assert!(hub.take_unpersisted("b1").operations.is_empty());
        assert!(hub.operation_history("other", 10).is_empty());
    }

    #[test]
    fn test_failed_write_is_retried() {
        let hub = CollaborationHub::new();
        let (a, _rx) = join(&hub, 1, "b1");
        hub.handle(
            a,
            ClientEvent::ContentChange {
                brd_id: "b1".into(),
                section_id: "s".into(),
                change: json!({ "text": "draft" }),
            },
        );

        let first = hub.take_unpersisted("b1");
        assert_eq!(first.operations.len(), 1);

        // The write failed, so the claim is handed back
        assert_eq!(hub.release_unpersisted(&first.ids), 1);

        let retry = hub.take_unpersisted("b1");
        assert_eq!(retry.ids, first.ids);
        assert_eq!(retry.operations[0].data["change"]["text"], "draft");
        assert!(hub.take_unpersisted("b1").ids.is_empty());
    }
}
