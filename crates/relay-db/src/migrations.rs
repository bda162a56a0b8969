use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id   INTEGER NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            timestamp   TEXT NOT NULL,
            receiver_id INTEGER REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_timestamp
            ON messages(timestamp);

        CREATE INDEX IF NOT EXISTS idx_messages_participants
            ON messages(sender_id, receiver_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
