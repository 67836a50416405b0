//! Per-connection entry point: authenticate, resolve or create the
//! document's channel, register the client, send the connect ack, then run
//! the client's inbound loop to completion with guaranteed cleanup.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::SinkExt;
use serde_json::json;
use tracing::warn;

use crate::auth::{AuthClient, AuthOutcome};
use crate::channel::spawn_writer;
use crate::registry::ChannelRegistry;
use pairboard_core::Mode;

const TMP_PREFIX: &str = "tmp-";

/// Drives one peer connection for its entire lifetime.
pub async fn handle_connection(
    socket: WebSocket,
    token: String,
    registry: Arc<ChannelRegistry>,
    auth: Arc<AuthClient>,
) {
    let (document_id, mode) = match resolve_auth(&token, &auth).await {
        AuthOutcome::Granted { document_id, mode } => (document_id, mode),
        AuthOutcome::Rejected(reason) => {
            close_before_upgrade_complete(socket, 1011, reason).await;
            return;
        }
    };

    let (channel, created) = match registry.get_or_create(&document_id).await {
        Ok(pair) => pair,
        Err(err) => {
            warn!(document_id, %err, "backend unavailable while opening channel");
            close_before_upgrade_complete(
                socket,
                1011,
                "Can't find data for given codespace",
            )
            .await;
            return;
        }
    };

    if created {
        tokio::spawn(Arc::clone(&channel).listen());
    }

    let (sink, inbound) = futures_util::StreamExt::split(socket);
    let (client, outbound_rx) = channel.create_client(inbound, mode);
    spawn_writer(sink, outbound_rx);

    channel.register(Arc::clone(&client)).await;

    let ack = json!({
        "operation": "connected",
        "data": { "id": client.id, "mode": mode.as_str() },
    });
    let _ = client.send_timed(ack.to_string()).await;

    client.listen().await;

    // Guaranteed cleanup regardless of how listen() terminated.
    channel.leave(&client).await;
}

/// `tmp-` ids skip remote auth entirely and are always granted `edit`; any
/// other id is resolved against the external auth API.
async fn resolve_auth(token: &str, auth: &AuthClient) -> AuthOutcome {
    if token.starts_with(TMP_PREFIX) {
        return AuthOutcome::Granted {
            document_id: token.to_string(),
            mode: Mode::Edit,
        };
    }
    auth.authenticate(token).await
}

/// Closes a socket that never made it to having a registered `Client` --
/// best-effort, matching `Client::close`'s own semantics.
async fn close_before_upgrade_complete(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_prefixed_tokens_never_reach_the_auth_client() {
        // resolve_auth is exercised end-to-end in the channel integration
        // tests (which drive a real WebSocket upgrade); this just pins the
        // prefix constant against the data model's `classify`.
        assert_eq!(pairboard_core::classify("tmp-abc"), pairboard_core::DocumentFlavor::Ephemeral);
        assert!("tmp-abc".starts_with(TMP_PREFIX));
    }
}
