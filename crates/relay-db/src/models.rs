//! Database row types. These map directly to SQLite query results and stay
//! independent of the wire frames in relay-types.

use relay_types::UserId;

/// Outcome of `Database::register_user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created(UserId),
    UsernameTaken,
}

/// A global message joined with its sender's username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalMessageRow {
    pub username: String,
    pub content: String,
    pub timestamp: String,
}

/// A direct message joined with its sender's username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectMessageRow {
    pub username: String,
    pub content: String,
    pub timestamp: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
}
