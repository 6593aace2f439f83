//! Database migrations

/// SQL for creating the database schema
pub const INIT_SCHEMA: &str = r#"
-- ========================================================================
-- ACCOUNTS
-- ========================================================================

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    username TEXT UNIQUE,
    mobile TEXT UNIQUE,
    password_hash TEXT NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'analyst' CHECK(role IN ('admin', 'analyst', 'viewer')),
    is_active INTEGER NOT NULL DEFAULT 1,
    last_login TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS user_sessions (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    ip_address TEXT,
    user_agent TEXT,
    login_time TEXT NOT NULL,
    last_activity TEXT NOT NULL,
    logout_time TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS user_2fa (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL UNIQUE,
    secret TEXT NOT NULL,
    backup_codes TEXT NOT NULL DEFAULT '[]',
    is_enabled INTEGER NOT NULL DEFAULT 0,
    enabled_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS audit_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER,
    action TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT,
    old_values TEXT,
    new_values TEXT,
    ip_address TEXT,
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS permissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    role TEXT NOT NULL,
    resource TEXT NOT NULL,
    action TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(role, resource, action)
);

-- ========================================================================
-- REQUIREMENTS CONTENT
-- ========================================================================

CREATE TABLE IF NOT EXISTS user_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_by INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS user_group_members (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    role TEXT NOT NULL DEFAULT 'member',
    added_at TEXT NOT NULL,
    UNIQUE(group_id, user_id),

    FOREIGN KEY (group_id) REFERENCES user_groups(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS user_stories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    group_id INTEGER,
    title TEXT NOT NULL,
    description TEXT,
    acceptance_criteria TEXT,
    priority TEXT NOT NULL DEFAULT 'Medium',
    status TEXT NOT NULL DEFAULT 'draft',
    tags TEXT NOT NULL DEFAULT '[]',
    estimated_points INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (group_id) REFERENCES user_groups(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS brd_documents (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    story_ids TEXT NOT NULL DEFAULT '[]',
    template TEXT NOT NULL DEFAULT 'full',
    status TEXT NOT NULL DEFAULT 'draft',
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS brd_versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    brd_id TEXT NOT NULL,
    version_number INTEGER NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    created_by INTEGER,
    created_at TEXT NOT NULL,
    UNIQUE(brd_id, version_number),

    FOREIGN KEY (brd_id) REFERENCES brd_documents(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS brd_analysis (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    brd_id TEXT NOT NULL UNIQUE,
    score INTEGER NOT NULL,
    risk_level TEXT NOT NULL,
    summary TEXT NOT NULL,
    strengths TEXT NOT NULL DEFAULT '[]',
    gaps TEXT NOT NULL DEFAULT '[]',
    suggestions TEXT NOT NULL DEFAULT '[]',
    analyzed_at TEXT NOT NULL,

    FOREIGN KEY (brd_id) REFERENCES brd_documents(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS brd_comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    brd_id TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    section_id TEXT,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (brd_id) REFERENCES brd_documents(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS diagrams (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    diagram_type TEXT NOT NULL DEFAULT 'flowchart',
    content TEXT NOT NULL DEFAULT '',
    brd_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (brd_id) REFERENCES brd_documents(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS ai_stories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    brd_id TEXT,
    diagram_id INTEGER,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    acceptance_criteria TEXT NOT NULL DEFAULT '[]',
    estimated_points INTEGER NOT NULL DEFAULT 5,
    priority TEXT NOT NULL DEFAULT 'P2',
    business_value TEXT,
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (brd_id) REFERENCES brd_documents(id) ON DELETE CASCADE,
    FOREIGN KEY (diagram_id) REFERENCES diagrams(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS ai_configurations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL UNIQUE,
    api_key TEXT NOT NULL,
    model TEXT NOT NULL DEFAULT 'gpt-3.5-turbo',
    temperature REAL NOT NULL DEFAULT 0.7,
    max_tokens INTEGER NOT NULL DEFAULT 2000,
    language TEXT NOT NULL DEFAULT 'en',
    detail_level TEXT NOT NULL DEFAULT 'standard',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ========================================================================
-- NOTIFICATIONS & COLLABORATION
-- ========================================================================

CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    actor_id INTEGER,
    type TEXT NOT NULL,
    resource_id TEXT,
    resource_type TEXT,
    message TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (actor_id) REFERENCES users(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS notification_settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL UNIQUE,
    is_enabled_in_app INTEGER NOT NULL DEFAULT 1,
    is_enabled_email INTEGER NOT NULL DEFAULT 0,
    description TEXT
);

CREATE TABLE IF NOT EXISTS notification_templates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL UNIQUE,
    subject_template TEXT NOT NULL DEFAULT 'New Notification',
    message_template TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS collaboration_operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    brd_id TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    operation_type TEXT NOT NULL,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Create indexes for better query performance
-- Login matches usernames ignoring case, so uniqueness must too
CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username_nocase ON users(username COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON user_sessions(user_id, is_active);
CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_logs(user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_stories_user ON user_stories(user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_brds_user ON brd_documents(user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_brd_versions ON brd_versions(brd_id, version_number DESC);
CREATE INDEX IF NOT EXISTS idx_diagrams_user ON diagrams(user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_collab_ops_brd ON collaboration_operations(brd_id, created_at DESC);
"#;

/// Default notification types and their message templates
pub const SEED_DATA: &str = r#"
INSERT OR IGNORE INTO notification_settings (type, is_enabled_in_app, is_enabled_email, description) VALUES
    ('USER_LOGIN', 1, 0, 'Sign-in confirmation'),
    ('MENTION', 1, 0, 'Someone mentioned you while editing a BRD'),
    ('BRD_CREATED', 1, 0, 'A BRD was generated'),
    ('BRD_UPDATED', 1, 0, 'A BRD you own was updated'),
    ('GROUP_MEMBER_ADDED', 1, 0, 'You were added to a group'),
    ('SYSTEM_ANNOUNCEMENT', 1, 0, 'Announcements sent by administrators');

INSERT OR IGNORE INTO notification_templates (type, subject_template, message_template) VALUES
    ('USER_LOGIN', 'New sign-in', 'Signed in successfully from {{ip_address}}'),
    ('MENTION', 'You were mentioned', '{{actor_name}} mentioned you: {{context}}'),
    ('BRD_CREATED', 'BRD generated', 'BRD "{{brd_title}}" was generated'),
    ('BRD_UPDATED', 'BRD updated', 'BRD "{{brd_title}}" was updated to version {{version}}'),
    ('GROUP_MEMBER_ADDED', 'Added to group', 'You were added to group "{{group_name}}"'),
    ('SYSTEM_ANNOUNCEMENT', 'Announcement', '{{message}}');
"#;
