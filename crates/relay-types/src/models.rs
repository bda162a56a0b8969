use serde::{Deserialize, Serialize};

/// Server-assigned user id (SQLite rowid).
pub type UserId = i64;

/// One roster entry as it appears in a `user_list` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
}
