use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use relay_types::ServerEvent;

use crate::Gateway;
use crate::error::GatewayError;
use crate::session::{self, FrameSource};

/// Text frames read off an axum WebSocket.
pub struct WsFrames(SplitStream<WebSocket>);

impl FrameSource for WsFrames {
    async fn next_frame(&mut self) -> Option<Result<String, GatewayError>> {
        loop {
            let msg = match self.0.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(GatewayError::Transport(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.as_str().to_owned())),
                Message::Binary(_) => {
                    return Some(Err(GatewayError::Protocol("binary frames are not supported".into())));
                }
                Message::Close(_) => return None,
                // Pings are answered by axum itself
                _ => {}
            }
        }
    }
}

/// Handle a single WebSocket connection for its whole lifetime.
///
/// A writer task drains the connection's outbound queue into the socket
/// while this task runs the session state machine on the read half. Once
/// the session ends and every handle clone is dropped, the writer flushes
/// whatever is still queued (such as a failed `auth_response`) and closes
/// the socket.
pub async fn handle_connection(socket: WebSocket, gateway: Gateway) {
    let (sender, receiver) = socket.split();
    let (handle, outbound) = gateway.registry.open_handle();
    let conn_id = handle.id();

    debug!(conn_id, "Connection accepted");

    let writer = tokio::spawn(write_loop(sender, outbound, conn_id));

    let mut frames = WsFrames(receiver);
    match session::run(&gateway, handle, &mut frames).await {
        Ok(()) => debug!(conn_id, "Session ended"),
        Err(GatewayError::Transport(e)) => info!(conn_id, "Connection dropped: {}", e),
        Err(e) => warn!(conn_id, "Closing connection: {}", e),
    }
    drop(frames);

    let _ = writer.await;
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<ServerEvent>,
    conn_id: u64,
) {
    while let Some(event) = outbound.recv().await {
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!(conn_id, "Failed to encode outbound frame: {}", e);
                continue;
            }
        };

        if sender.send(Message::Text(text.into())).await.is_err() {
            debug!(conn_id, "Peer went away mid-send");
            return;
        }
    }

    let _ = sender.close().await;
}
