//! Database module for SQLite persistence

mod ai;
mod audit;
mod brds;
mod collab;
mod diagrams;
mod groups;
mod migrations;
mod models;
mod notifications;
mod permissions;
mod repository;
mod stories;
mod two_factor;
mod users;

pub use ai::NewAiStory;
pub use collab::{DashboardStats, NewOperation};
pub use models::{
    AiConfiguration, AiStory, AuditLog, Brd, BrdAnalysis, BrdComment, BrdUpdate, BrdVersion,
    CollaborationOperation, CustomPermission, Diagram, DiagramFilter, DiagramInput, Group,
    GroupMember, NewAuditLog, NewNotification, NewUser, Notification, NotificationSetting,
    NotificationTemplate, ProfileUpdate, StatusCount, StoryFilter, StoryInput, TwoFactorRecord,
    User, UserSession, UserStory, UserView,
};
pub use repository::{Database, DatabaseError};
