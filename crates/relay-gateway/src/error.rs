use thiserror::Error;

/// Failures that end a single connection. None of them reach other sessions.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unparseable frame, missing field or unknown tag
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Peer vanished or the socket failed
    #[error("transport error: {0}")]
    Transport(String),

    /// The store could not complete a read or write
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Protocol(err.to_string())
    }
}
