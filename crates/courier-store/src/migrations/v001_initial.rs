//! v001 -- Initial schema creation.
//!
//! Creates `users`, `friendships`, `chat_groups`, `group_members` and `messages`.
//! Soft-deleted rows stay in place with `deleted = 1`; the partial unique
//! indexes only constrain live rows.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,     -- 24 hex chars
    username   TEXT NOT NULL UNIQUE,
    email      TEXT,
    avatar     TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'offline',
    created_at INTEGER NOT NULL,              -- unix millis
    updated_at INTEGER NOT NULL,
    deleted    INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email
    ON users(email) WHERE email IS NOT NULL AND deleted = 0;

-- ----------------------------------------------------------------
-- Friendships (one live edge per unordered pair)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friendships (
    id         TEXT PRIMARY KEY NOT NULL,
    user_id    TEXT NOT NULL,
    friend_id  TEXT NOT NULL,
    status     TEXT NOT NULL,                 -- pending | accepted | rejected
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted    INTEGER NOT NULL DEFAULT 0,

    CHECK (user_id <> friend_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_friendships_pair
    ON friendships(min(user_id, friend_id), max(user_id, friend_id))
    WHERE deleted = 0;
CREATE INDEX IF NOT EXISTS idx_friendships_user ON friendships(user_id);
CREATE INDEX IF NOT EXISTS idx_friendships_friend ON friendships(friend_id);

-- ----------------------------------------------------------------
-- Groups
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_groups (
    id          TEXT PRIMARY KEY NOT NULL,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    avatar      TEXT NOT NULL,
    creator_id  TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL,
    deleted     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS group_members (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    id         TEXT NOT NULL UNIQUE,
    group_id   TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    role       TEXT NOT NULL,                 -- admin | member
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted    INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_group_members_pair
    ON group_members(group_id, user_id) WHERE deleted = 0;
CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(user_id);

-- ----------------------------------------------------------------
-- Messages (append-only apart from `read`)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order, tie-breaker
    id           TEXT NOT NULL UNIQUE,
    kind         TEXT NOT NULL,                      -- private | group
    sender_id    TEXT NOT NULL,
    receiver_id  TEXT,
    group_id     TEXT,
    content      TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    read         INTEGER NOT NULL DEFAULT 0,

    CHECK (
        (kind = 'private' AND receiver_id IS NOT NULL AND group_id IS NULL) OR
        (kind = 'group' AND group_id IS NOT NULL AND receiver_id IS NULL)
    )
);

CREATE INDEX IF NOT EXISTS idx_messages_private
    ON messages(sender_id, receiver_id, timestamp_ms) WHERE kind = 'private';
CREATE INDEX IF NOT EXISTS idx_messages_group
    ON messages(group_id, timestamp_ms) WHERE kind = 'group';
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
