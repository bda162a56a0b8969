use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use relay_db::{Database, DirectMessageRow, GlobalMessageRow, HISTORY_LIMIT, Registration};
use relay_types::{UserId, UserSummary};

use crate::error::GatewayError;

/// Async facade over the blocking SQLite store. Every call runs on the
/// blocking pool so a slow commit never stalls other connections.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<Registration, GatewayError> {
        let (username, password) = (username.to_string(), password.to_string());
        self.blocking(move |db| db.register_user(&username, &password)).await
    }

    pub async fn verify(&self, username: &str, password: &str) -> Result<Option<UserId>, GatewayError> {
        let (username, password) = (username.to_string(), password.to_string());
        self.blocking(move |db| db.verify_user(&username, &password)).await
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>, GatewayError> {
        self.blocking(|db| db.list_users()).await
    }

    /// Resolves only after the row is committed.
    pub async fn save_message(
        &self,
        sender_id: UserId,
        content: &str,
        receiver_id: Option<UserId>,
    ) -> Result<(), GatewayError> {
        let content = content.to_string();
        self.blocking(move |db| db.save_message(sender_id, &content, receiver_id)).await
    }

    pub async fn recent_global_messages(&self) -> Result<Vec<GlobalMessageRow>, GatewayError> {
        self.blocking(|db| db.recent_global_messages(HISTORY_LIMIT)).await
    }

    pub async fn dm_history(&self, user_id: UserId) -> Result<Vec<DirectMessageRow>, GatewayError> {
        self.blocking(move |db| db.dm_history(user_id)).await
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, GatewayError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                GatewayError::Store(anyhow!("store task failed: {}", e))
            })?
            .map_err(GatewayError::Store)
    }
}
