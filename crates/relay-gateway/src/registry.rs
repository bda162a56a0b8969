use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::debug;

use relay_types::{ServerEvent, UserId};

use crate::error::GatewayError;

/// Process-unique connection id, allocated in accept order.
pub type ConnId = u64;

/// Outbound side of one live connection. Frames queued here are written to
/// the socket, in order, by that connection's writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Queue a frame. Fails once the writer side has gone away.
    pub fn send(&self, event: ServerEvent) -> Result<(), GatewayError> {
        self.tx
            .send(event)
            .map_err(|_| GatewayError::Transport(format!("connection {} is closed", self.id)))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An authenticated connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub handle: ConnectionHandle,
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("user {0} already has a live session")]
    AlreadyOnline(UserId),

    #[error("connection {0} is already registered")]
    DuplicateHandle(ConnId),

    #[error("connection {0} closed before it could be registered")]
    Closed(ConnId),

    #[error("server is shutting down")]
    ShuttingDown,
}

/// Live table of authenticated sessions.
///
/// Both indexes sit behind one lock, so a snapshot never sees a session in
/// one map but not the other.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    next_id: AtomicU64,
    sessions: RwLock<Sessions>,
    shutdown: watch::Sender<bool>,
}

#[derive(Default)]
struct Sessions {
    by_conn: BTreeMap<ConnId, Session>,
    by_user: HashMap<UserId, ConnId>,
}

impl Registry {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                sessions: RwLock::new(Sessions::default()),
                shutdown,
            }),
        }
    }

    /// Allocate a handle for a freshly accepted connection. The handle is not
    /// registered until `add` succeeds.
    pub fn open_handle(&self) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle { id, tx }, rx)
    }

    /// Register a session. `greeting` is queued on the session's own handle
    /// while the lock is held, so it precedes any frame another task can
    /// address to this connection.
    pub async fn add(&self, session: Session, greeting: ServerEvent) -> Result<(), RegistryError> {
        let mut sessions = self.inner.sessions.write().await;
        let conn_id = session.handle.id;

        if *self.inner.shutdown.borrow() {
            return Err(RegistryError::ShuttingDown);
        }
        if sessions.by_conn.contains_key(&conn_id) {
            return Err(RegistryError::DuplicateHandle(conn_id));
        }
        if sessions.by_user.contains_key(&session.user_id) {
            return Err(RegistryError::AlreadyOnline(session.user_id));
        }
        if session.handle.send(greeting).is_err() {
            return Err(RegistryError::Closed(conn_id));
        }

        debug!(conn_id, user_id = session.user_id, "Session registered");
        sessions.by_user.insert(session.user_id, conn_id);
        sessions.by_conn.insert(conn_id, session);
        Ok(())
    }

    pub async fn remove(&self, conn_id: ConnId) -> Option<Session> {
        let mut sessions = self.inner.sessions.write().await;
        let session = sessions.by_conn.remove(&conn_id)?;

        if sessions.by_user.get(&session.user_id) == Some(&conn_id) {
            sessions.by_user.remove(&session.user_id);
        }

        debug!(conn_id, user_id = session.user_id, "Session removed");
        Some(session)
    }

    pub async fn find_by_user_id(&self, user_id: UserId) -> Option<ConnectionHandle> {
        let sessions = self.inner.sessions.read().await;
        let conn_id = sessions.by_user.get(&user_id)?;
        sessions.by_conn.get(conn_id).map(|s| s.handle.clone())
    }

    /// All sessions in connect order.
    pub async fn snapshot(&self) -> Vec<Session> {
        self.inner
            .sessions
            .read()
            .await
            .by_conn
            .values()
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.by_conn.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop accepting sessions, drop every registered one and wake every
    /// connection task waiting in `shutting_down`. Returns how many sessions
    /// were dropped.
    pub async fn close_all(&self) -> usize {
        let mut sessions = self.inner.sessions.write().await;
        self.inner.shutdown.send_replace(true);

        let count = sessions.by_conn.len();
        sessions.by_conn.clear();
        sessions.by_user.clear();
        count
    }

    /// Resolves once `close_all` has been called.
    pub async fn shutting_down(&self) {
        let mut rx = self.inner.shutdown.subscribe();
        let _ = rx.wait_for(|closing| *closing).await;
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
