//! Message dispatcher: turns decoded client frames into router calls and
//! writes the reply for each call back to the caller.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::metrics::ServerMetrics;
use crate::router::RelayRouter;
use crate::session::Session;

use super::protocol::{ClientMessage, ServerMessage};

/// Maximum `invalid_message` errors per connection before silently dropping.
/// Keeps a misbehaving client from turning garbage into an echo stream.
const MAX_INVALID_MESSAGES: u32 = 10;

/// Per-connection state owned by the connection's reader task.
pub(crate) struct ConnectionContext {
    pub session: Session,
    pub tx: mpsc::Sender<ServerMessage>,
    pub router: Arc<RelayRouter>,
    pub metrics: Arc<ServerMetrics>,
    invalid_count: u32,
}

impl ConnectionContext {
    pub(crate) fn new(
        connection_id: String,
        tx: mpsc::Sender<ServerMessage>,
        router: Arc<RelayRouter>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            session: Session::new(connection_id),
            tx,
            router,
            metrics,
            invalid_count: 0,
        }
    }

    async fn reply(&self, msg: ServerMessage) {
        if self.tx.send(msg).await.is_err() {
            debug!(
                "[DISPATCH] {} reply channel closed",
                self.session.connection_id
            );
        }
    }

    async fn reply_result(&self, id: u64, result: Result<serde_json::Value, RelayError>) {
        let msg = match result {
            Ok(value) => ServerMessage::Result { id, value },
            Err(e) => ServerMessage::call_error(id, &e),
        };
        self.reply(msg).await;
    }
}

/// Decode one text frame and dispatch it.
pub(crate) async fn handle_text_frame(ctx: &mut ConnectionContext, text: &str) {
    ctx.metrics.message_received();
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => dispatch_client_message(ctx, msg).await,
        Err(e) => {
            ctx.metrics.message_invalid();
            ctx.invalid_count += 1;
            if ctx.invalid_count <= MAX_INVALID_MESSAGES {
                warn!(
                    "[DISPATCH] {} sent an invalid frame: {}",
                    ctx.session.connection_id, e
                );
                ctx.reply(ServerMessage::Error {
                    id: None,
                    code: "invalid_message".to_string(),
                    message: e.to_string(),
                })
                .await;
            }
        }
    }
}

/// Dispatch a single `ClientMessage` against the connection's session.
pub(crate) async fn dispatch_client_message(ctx: &mut ConnectionContext, msg: ClientMessage) {
    match msg {
        ClientMessage::RegisterInput { id, account } => {
            let result = ctx
                .router
                .bind_input(&mut ctx.session, &account)
                .await
                .map(|()| serde_json::Value::Bool(true));
            ctx.reply_result(id, result).await;
        }
        ClientMessage::RegisterOutput { id, account } => {
            let result = ctx
                .router
                .bind_output(&mut ctx.session, &account)
                .await
                .map(|()| serde_json::Value::Null);
            ctx.reply_result(id, result).await;
        }
        ClientMessage::RegisterInputTab { id, tab_id } => {
            let result = ctx
                .router
                .heartbeat(&ctx.session, &tab_id.into_vec())
                .await
                .map(|()| serde_json::Value::Bool(true));
            ctx.reply_result(id, result).await;
        }
        ClientMessage::UnregisterInputTab { id, tab_id } => {
            let result = ctx
                .router
                .forget(&ctx.session, &tab_id.into_vec())
                .await
                .map(|()| serde_json::Value::Bool(true));
            ctx.reply_result(id, result).await;
        }
        ClientMessage::GetTabs { id } => {
            let tabs = ctx.router.query_tabs(&ctx.session).await;
            ctx.reply_result(id, Ok(serde_json::json!(tabs))).await;
        }
        ClientMessage::InjectData { id, data, tab_id } => {
            let result = ctx
                .router
                .inject_command(&ctx.session, data, tab_id)
                .await
                .map(|_| serde_json::Value::Bool(true));
            ctx.reply_result(id, result).await;
        }
        ClientMessage::Data { tab_id, data } => {
            ctx.router.relay_inbound(&ctx.session, tab_id, data).await;
        }
    }
}
