use std::future::Future;

use tracing::{debug, info, warn};

use relay_db::Registration;
use relay_types::{AuthRequest, ChatMessage, ChatSend, ServerEvent};

use crate::Gateway;
use crate::error::GatewayError;
use crate::presence;
use crate::registry::{ConnectionHandle, RegistryError, Session};
use crate::router;

pub const REGISTERED: &str = "Registration successful";
pub const USERNAME_TAKEN: &str = "Username already exists";
pub const LOGGED_IN: &str = "Login successful";
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const ALREADY_ONLINE: &str = "User already logged in";

/// Inbound half of a connection, reduced to text frames.
pub trait FrameSource {
    /// Next text frame. `None` once the peer has closed cleanly.
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<String, GatewayError>>> + Send;
}

/// Drive one connection from accept to close.
///
/// The first frames must authenticate (`register` keeps the connection
/// waiting for a `login`; any failed attempt closes it). After a successful
/// login the session is registered, the roster is broadcast and history is
/// replayed, then every inbound frame is routed until the peer goes away.
/// Registry removal and the follow-up roster broadcast run however the
/// relay loop ends.
pub async fn run<S: FrameSource>(
    gateway: &Gateway,
    handle: ConnectionHandle,
    frames: &mut S,
) -> Result<(), GatewayError> {
    let Some(session) = authenticate(gateway, &handle, frames).await? else {
        return Ok(());
    };

    info!("{} ({}) connected", session.username, session.user_id);

    let result = async {
        welcome(gateway, &session).await?;
        relay(gateway, &session, frames).await
    }
    .await;

    gateway.registry.remove(session.handle.id()).await;
    if let Err(e) = presence::broadcast_roster(&gateway.store, &gateway.registry).await {
        warn!("Roster broadcast after {} left failed: {}", session.username, e);
    }

    info!("{} ({}) disconnected", session.username, session.user_id);
    result
}

/// Returns the registered session, or `None` when the connection should
/// close after an auth failure (the failure frame has been queued).
async fn authenticate<S: FrameSource>(
    gateway: &Gateway,
    handle: &ConnectionHandle,
    frames: &mut S,
) -> Result<Option<Session>, GatewayError> {
    loop {
        let Some(frame) = next_frame(gateway, frames).await else {
            return Ok(None);
        };
        let request: AuthRequest = serde_json::from_str(&frame?)?;

        match request {
            AuthRequest::Register { username, password } => {
                match gateway.store.register(&username, &password).await? {
                    Registration::Created(user_id) => {
                        info!("Registered {} ({})", username, user_id);
                        handle.send(ServerEvent::auth_ok(REGISTERED))?;
                    }
                    Registration::UsernameTaken => {
                        info!("Registration refused, {} is taken", username);
                        handle.send(ServerEvent::auth_failed(USERNAME_TAKEN))?;
                        return Ok(None);
                    }
                }
            }

            AuthRequest::Login { username, password } => {
                let Some(user_id) = gateway.store.verify(&username, &password).await? else {
                    info!("Login failed for {}", username);
                    handle.send(ServerEvent::auth_failed(INVALID_CREDENTIALS))?;
                    return Ok(None);
                };

                let session = Session {
                    handle: handle.clone(),
                    user_id,
                    username,
                };

                return match gateway
                    .registry
                    .add(session.clone(), ServerEvent::auth_ok(LOGGED_IN))
                    .await
                {
                    Ok(()) => Ok(Some(session)),
                    Err(RegistryError::AlreadyOnline(_)) => {
                        info!("{} ({}) is already online, refusing login", session.username, user_id);
                        handle.send(ServerEvent::auth_failed(ALREADY_ONLINE))?;
                        Ok(None)
                    }
                    Err(e) => Err(GatewayError::Transport(e.to_string())),
                };
            }
        }
    }
}

/// Announce the new session and bring it up to date: roster broadcast to
/// everyone, then the roster, global history and DM history for this client
/// alone. History goes out oldest first.
async fn welcome(gateway: &Gateway, session: &Session) -> Result<(), GatewayError> {
    presence::broadcast_roster(&gateway.store, &gateway.registry).await?;

    session.handle.send(presence::roster(&gateway.store).await?)?;

    let recent = gateway.store.recent_global_messages().await?;
    for row in recent.into_iter().rev() {
        session.handle.send(ServerEvent::Message(ChatMessage::Global {
            username: row.username,
            content: row.content,
            timestamp: Some(row.timestamp),
        }))?;
    }

    let dms = gateway.store.dm_history(session.user_id).await?;
    for row in dms.into_iter().rev() {
        session.handle.send(ServerEvent::Message(ChatMessage::Direct {
            username: row.username,
            content: row.content,
            timestamp: Some(row.timestamp),
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
        }))?;
    }

    Ok(())
}

/// One frame at a time, so a client's messages reach every target in the
/// order they were sent.
async fn relay<S: FrameSource>(
    gateway: &Gateway,
    session: &Session,
    frames: &mut S,
) -> Result<(), GatewayError> {
    while let Some(frame) = next_frame(gateway, frames).await {
        let send: ChatSend = serde_json::from_str(&frame?)?;
        router::dispatch(gateway, session, send).await?;
    }
    Ok(())
}

/// Next inbound frame, or `None` when the peer closed or the server is
/// shutting down.
async fn next_frame<S: FrameSource>(
    gateway: &Gateway,
    frames: &mut S,
) -> Option<Result<String, GatewayError>> {
    tokio::select! {
        frame = frames.next_frame() => frame,
        _ = gateway.registry.shutting_down() => {
            debug!("Server shutting down, ending session");
            None
        }
    }
}
