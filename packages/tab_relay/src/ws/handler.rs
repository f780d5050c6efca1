//! WebSocket Handler
//!
//! One task pair per connection: a writer draining the outbound channel and a
//! reader feeding frames to the dispatcher.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::identity::ServerIdentity;
use crate::metrics::ServerMetrics;
use crate::router::RelayRouter;

use super::dispatch::{ConnectionContext, handle_text_frame};
use super::protocol::ServerMessage;

/// Handle a relay WebSocket connection until either side goes away.
pub async fn handle_relay_ws(
    socket: WebSocket,
    router: Arc<RelayRouter>,
    identity: Arc<ServerIdentity>,
    metrics: Arc<ServerMetrics>,
    send_channel_capacity: usize,
) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %connection_id, "New relay WebSocket connection");
    metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(send_channel_capacity);

    router.hub().register(&connection_id, tx.clone()).await;

    let welcome = ServerMessage::Welcome {
        connection_id: connection_id.clone(),
        server_key: identity.public_key(),
        fingerprint: identity.fingerprint(),
        signature: identity.sign(connection_id.as_bytes()),
    };
    if tx.send(welcome).await.is_err() {
        warn!(conn_id = %connection_id, "Failed to send welcome - channel closed");
    }

    let sender_task = async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    let mut ctx = ConnectionContext::new(
        connection_id.clone(),
        tx,
        router.clone(),
        metrics.clone(),
    );
    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => handle_text_frame(&mut ctx, &text).await,
                Ok(Message::Close(_)) => {
                    debug!("Client closed connection");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                // Binary frames carry nothing in this protocol; pings are
                // answered by axum.
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!("Sender task ended"),
        _ = input_task => debug!("Input task ended"),
    }

    router.hub().unregister(&connection_id).await;
    metrics.connection_closed();
    info!(conn_id = %connection_id, "Relay WebSocket connection closed");
}
