/// Database row types for all tables.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.

/// User record in the users table
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub is_assistant: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Directed friendship edge with denormalized display fields
#[derive(Debug, Clone)]
pub struct FriendRow {
    pub user_id: String,
    pub friend_id: String,
    pub friend_username: String,
    pub friend_avatar_url: Option<String>,
    pub is_blocked: bool,
    pub blocked_by: Option<String>,
    pub created_at: String,
}

/// Friend request lifecycle record (pending -> accepted | declined, once)
#[derive(Debug, Clone)]
pub struct FriendRequestRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: String,
    pub created_at: String,
    pub responded_at: Option<String>,
}

/// Conversation between a normalized participant pair
#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub last_message_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Message row; call columns are populated only when message_type = 'call'
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub message_type: String,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub timestamp: i64,
    pub created_at: String,
    pub call_type: Option<String>,
    pub call_status: Option<String>,
    pub call_duration: Option<i64>,
    pub call_direction: Option<String>,
    pub call_room_id: Option<String>,
}
