use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking — no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: Users and relationships

CREATE TABLE users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    avatar_url TEXT,
    is_assistant INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Directed friendship edge, one row per (user, friend) direction.
-- Display fields are denormalized so friend lists render without a join.
-- Block state is soft: rows are never deleted on the happy path.
CREATE TABLE friends (
    user_id TEXT NOT NULL,
    friend_id TEXT NOT NULL,
    friend_username TEXT NOT NULL,
    friend_avatar_url TEXT,
    is_blocked INTEGER NOT NULL DEFAULT 0,
    blocked_by TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (user_id, friend_id),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (friend_id) REFERENCES users(id)
);

CREATE TABLE friend_requests (
    id TEXT PRIMARY KEY,
    sender_id TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    responded_at TEXT,
    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (receiver_id) REFERENCES users(id)
);

CREATE INDEX idx_friend_requests_receiver ON friend_requests(receiver_id, status);

-- One open request per directed pair; resolved requests stay as history.
CREATE UNIQUE INDEX idx_friend_requests_pending
    ON friend_requests(sender_id, receiver_id) WHERE status = 'pending';
",
        ),
        M::up(
            "-- Migration 2: Conversations and messages

-- Participant order is normalized (lexicographically smaller id is always
-- participant_a) so the unique constraint enforces one conversation per
-- unordered pair even under racing find-or-create.
CREATE TABLE conversations (
    id TEXT PRIMARY KEY,
    participant_a TEXT NOT NULL,
    participant_b TEXT NOT NULL,
    last_message_id TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(participant_a, participant_b)
);

CREATE INDEX idx_conversations_a ON conversations(participant_a);
CREATE INDEX idx_conversations_b ON conversations(participant_b);

-- Per-user soft-clear watermark (unix millis). Messages at or before the
-- watermark are hidden from that user only; nothing is deleted.
CREATE TABLE conversation_clears (
    conversation_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    cleared_at INTEGER NOT NULL,
    PRIMARY KEY (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE TABLE messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    message_type TEXT NOT NULL DEFAULT 'text',
    content TEXT,
    attachment_url TEXT,
    timestamp INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX idx_messages_conv_time ON messages(conversation_id, timestamp);
",
        ),
        M::up(
            "-- Migration 3: Call history

ALTER TABLE messages ADD COLUMN call_type TEXT;
ALTER TABLE messages ADD COLUMN call_status TEXT;
ALTER TABLE messages ADD COLUMN call_duration INTEGER;
ALTER TABLE messages ADD COLUMN call_direction TEXT;
ALTER TABLE messages ADD COLUMN call_room_id TEXT;

-- Idempotent upsert key for call records: both call legs may submit the
-- same (conversation, room) history row; the second writer merges.
CREATE UNIQUE INDEX idx_messages_call_room
    ON messages(conversation_id, call_room_id) WHERE message_type = 'call';
",
        ),
    ])
}
