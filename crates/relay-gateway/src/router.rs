use tracing::{debug, trace};

use relay_types::{ChatMessage, ChatSend, ServerEvent, UserId};

use crate::Gateway;
use crate::error::GatewayError;
use crate::registry::{ConnectionHandle, Session};

/// Where an inbound chat frame is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Global,
    Direct { receiver_id: UserId },
}

impl Route {
    pub fn of(send: &ChatSend) -> Self {
        match send.receiver_id {
            Some(receiver_id) => Route::Direct { receiver_id },
            None => Route::Global,
        }
    }
}

/// Everyone in the snapshot except the sender.
pub fn broadcast_targets(sender: &ConnectionHandle, snapshot: &[Session]) -> Vec<ConnectionHandle> {
    snapshot
        .iter()
        .filter(|s| s.handle.id() != sender.id())
        .map(|s| s.handle.clone())
        .collect()
}

/// The recipient's connection, if online, followed by the sender's echo.
/// A DM to oneself is delivered once.
pub fn direct_targets(sender: &ConnectionHandle, recipient: Option<ConnectionHandle>) -> Vec<ConnectionHandle> {
    let mut out: Vec<ConnectionHandle> = recipient
        .into_iter()
        .filter(|r| r.id() != sender.id())
        .collect();
    out.push(sender.clone());
    out
}

/// Queue `event` on every target. A closed target is skipped; the rest of
/// the fan-out still happens. Returns how many targets accepted the frame.
pub fn fan_out(targets: &[ConnectionHandle], event: &ServerEvent) -> usize {
    let mut delivered = 0;
    for target in targets {
        match target.send(event.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => debug!(conn_id = target.id(), "Skipping target: {}", e),
        }
    }
    delivered
}

/// Persist one chat frame from `sender`, then deliver it. Nothing is fanned
/// out unless the store has committed the row.
pub async fn dispatch(gateway: &Gateway, sender: &Session, send: ChatSend) -> Result<usize, GatewayError> {
    let route = Route::of(&send);

    gateway
        .store
        .save_message(sender.user_id, &send.content, send.receiver_id)
        .await?;

    let message = match route {
        Route::Global => ChatMessage::Global {
            username: sender.username.clone(),
            content: send.content,
            timestamp: None,
        },
        Route::Direct { receiver_id } => ChatMessage::Direct {
            username: sender.username.clone(),
            content: send.content,
            timestamp: None,
            sender_id: sender.user_id,
            receiver_id,
        },
    };

    let targets = match route {
        Route::Global => broadcast_targets(&sender.handle, &gateway.registry.snapshot().await),
        Route::Direct { receiver_id } => {
            direct_targets(&sender.handle, gateway.registry.find_by_user_id(receiver_id).await)
        }
    };
    let delivered = fan_out(&targets, &ServerEvent::Message(message));

    trace!(
        "{} ({}) {:?} delivered to {}/{} connections",
        sender.username,
        sender.user_id,
        route,
        delivered,
        targets.len()
    );
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use tokio::sync::mpsc;

    struct Peer {
        session: Session,
        rx: mpsc::UnboundedReceiver<ServerEvent>,
    }

    fn peers(registry: &Registry, names: &[&str]) -> Vec<Peer> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let (handle, rx) = registry.open_handle();
                Peer {
                    session: Session {
                        handle,
                        user_id: i as UserId + 1,
                        username: name.to_string(),
                    },
                    rx,
                }
            })
            .collect()
    }

    fn ids(handles: &[ConnectionHandle]) -> Vec<u64> {
        handles.iter().map(|h| h.id()).collect()
    }

    #[test]
    fn global_excludes_sender() {
        let registry = Registry::new();
        let p = peers(&registry, &["alice", "bob", "carol"]);
        let snapshot: Vec<_> = p.iter().map(|p| p.session.clone()).collect();

        let out = broadcast_targets(&p[0].session.handle, &snapshot);
        assert_eq!(ids(&out), [p[1].session.handle.id(), p[2].session.handle.id()]);
    }

    #[tokio::test]
    async fn direct_hits_recipient_and_echoes_sender() {
        let registry = Registry::new();
        let p = peers(&registry, &["alice", "bob", "carol"]);
        for peer in &p {
            registry
                .add(peer.session.clone(), ServerEvent::auth_ok("x"))
                .await
                .unwrap();
        }

        let recipient = registry.find_by_user_id(2).await;
        let out = direct_targets(&p[0].session.handle, recipient);
        assert_eq!(ids(&out), [p[1].session.handle.id(), p[0].session.handle.id()]);
    }

    #[tokio::test]
    async fn direct_to_offline_user_only_echoes() {
        let registry = Registry::new();
        let p = peers(&registry, &["alice", "bob"]);
        registry
            .add(p[0].session.clone(), ServerEvent::auth_ok("x"))
            .await
            .unwrap();

        let recipient = registry.find_by_user_id(2).await;
        assert!(recipient.is_none());
        let out = direct_targets(&p[0].session.handle, recipient);
        assert_eq!(ids(&out), [p[0].session.handle.id()]);
    }

    #[test]
    fn direct_to_self_is_delivered_once() {
        let registry = Registry::new();
        let p = peers(&registry, &["alice"]);
        let me = p[0].session.handle.clone();

        let out = direct_targets(&me, Some(me.clone()));
        assert_eq!(ids(&out), [me.id()]);
    }

    #[test]
    fn fan_out_skips_closed_targets() {
        let registry = Registry::new();
        let mut p = peers(&registry, &["alice", "bob", "carol"]);
        let handles: Vec<_> = p.iter().map(|p| p.session.handle.clone()).collect();

        // bob's writer is gone
        let bob = p.remove(1);
        drop(bob.rx);

        let event = ServerEvent::auth_ok("x");
        assert_eq!(fan_out(&handles, &event), 2);
        assert_eq!(p[0].rx.try_recv().ok(), Some(event.clone()));
        assert_eq!(p[1].rx.try_recv().ok(), Some(event));
    }

    #[test]
    fn route_follows_receiver_id() {
        let global = ChatSend { content: "hi".into(), receiver_id: None };
        let direct = ChatSend { content: "hi".into(), receiver_id: Some(4) };
        assert_eq!(Route::of(&global), Route::Global);
        assert_eq!(Route::of(&direct), Route::Direct { receiver_id: 4 });
    }
}
