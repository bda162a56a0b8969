use crate::models::{DirectMessageRow, GlobalMessageRow, Registration};
use crate::{Database, HISTORY_LIMIT, credentials};
use anyhow::Result;
use relay_types::{UserId, UserSummary};
use rusqlite::{Connection, ErrorCode};

/// Text layout of stored timestamps. Sorts lexicographically.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

impl Database {
    // -- Users --

    /// Create a user unless the username is already taken.
    pub fn register_user(&self, username: &str, password: &str) -> Result<Registration> {
        // Hash outside the lock; Argon2 is deliberately slow
        let password_hash = credentials::hash(password)?;

        self.with_conn(|conn| {
            match conn.execute(
                "INSERT INTO users (username, password) VALUES (?1, ?2)",
                (username, &password_hash),
            ) {
                Ok(_) => Ok(Registration::Created(conn.last_insert_rowid())),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Ok(Registration::UsernameTaken)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Returns the user's id only if both username and password match.
    /// Unknown user and wrong password both yield `None`.
    pub fn verify_user(&self, username: &str, password: &str) -> Result<Option<UserId>> {
        // Unknown users still pay for a verify so timing does not leak existence
        let Some((id, stored)) = self.with_conn(|conn| query_credentials(conn, username))? else {
            credentials::verify_absent(password)?;
            return Ok(None);
        };

        if credentials::verify(password, &stored)? {
            Ok(Some(id))
        } else {
            Ok(None)
        }
    }

    pub fn list_users(&self) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, username FROM users ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(UserSummary {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append one message. `receiver_id == None` stores a global message.
    pub fn save_message(
        &self,
        sender_id: UserId,
        content: &str,
        receiver_id: Option<UserId>,
    ) -> Result<()> {
        let timestamp = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, content, timestamp, receiver_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![sender_id, content, timestamp, receiver_id],
            )?;
            Ok(())
        })
    }

    /// Latest global messages, newest first.
    pub fn recent_global_messages(&self, limit: u32) -> Result<Vec<GlobalMessageRow>> {
        self.with_conn(|conn| query_global_messages(conn, limit))
    }

    /// Latest direct messages the user sent or received, newest first.
    pub fn dm_history(&self, user_id: UserId) -> Result<Vec<DirectMessageRow>> {
        self.with_conn(|conn| query_dm_history(conn, user_id, HISTORY_LIMIT))
    }
}

fn query_credentials(conn: &Connection, username: &str) -> Result<Option<(UserId, String)>> {
    let mut stmt = conn.prepare("SELECT id, password FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;

    Ok(row)
}

fn query_global_messages(conn: &Connection, limit: u32) -> Result<Vec<GlobalMessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT u.username, m.content, m.timestamp
         FROM messages m
         JOIN users u ON m.sender_id = u.id
         WHERE m.receiver_id IS NULL
         ORDER BY m.timestamp DESC, m.id DESC
         LIMIT ?1",
    )?;

    let rows = stmt
        .query_map([limit], |row| {
            Ok(GlobalMessageRow {
                username: row.get(0)?,
                content: row.get(1)?,
                timestamp: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_dm_history(conn: &Connection, user_id: UserId, limit: u32) -> Result<Vec<DirectMessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT u.username, m.content, m.timestamp, m.sender_id, m.receiver_id
         FROM messages m
         JOIN users u ON m.sender_id = u.id
         WHERE (m.sender_id = ?1 OR m.receiver_id = ?1)
           AND m.receiver_id IS NOT NULL
         ORDER BY m.timestamp DESC, m.id DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![user_id, limit], |row| {
            Ok(DirectMessageRow {
                username: row.get(0)?,
                content: row.get(1)?,
                timestamp: row.get(2)?,
                sender_id: row.get(3)?,
                receiver_id: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
