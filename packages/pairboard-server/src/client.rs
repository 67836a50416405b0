//! A single connected peer within one [`crate::channel::Channel`].

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use pairboard_core::Mode;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::debug;
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::message_handler::MessageHandler;

/// Message to be written to a peer's outbound half.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: Cow<'static, str> },
}

/// Error returned when an outbound send could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    Disconnected,
}

/// One connected peer.
///
/// Constructed once per connection and immutable thereafter apart from its
/// internal channel plumbing. Set membership in a [`crate::channel::Channel`]
/// uses `Arc` pointer identity rather than `id` equality.
pub struct Client {
    pub id: String,
    pub channel_id: String,
    pub mode: Mode,
    pub expire_refresh_seconds: u64,
    outbound: mpsc::Sender<OutboundMessage>,
    inbound: Mutex<SplitStream<WebSocket>>,
    close_notify: Notify,
    handler: Arc<MessageHandler>,
    send_timeout: Duration,
}

impl Client {
    /// Constructs a new client bound to `channel_id`, returning it alongside
    /// the receiver half that the caller must drive with a writer task.
    ///
    /// `connection` sizes the outbound queue and bounds how long
    /// [`Client::send_timed`] waits for room in it.
    pub fn new(
        channel_id: String,
        mode: Mode,
        expire_refresh_seconds: u64,
        inbound: SplitStream<WebSocket>,
        handler: Arc<MessageHandler>,
        connection: &ConnectionConfig,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(connection.outbound_channel_capacity);
        let client = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            channel_id,
            mode,
            expire_refresh_seconds,
            outbound: tx,
            inbound: Mutex::new(inbound),
            close_notify: Notify::new(),
            handler,
            send_timeout: connection.send_timeout,
        });
        (client, rx)
    }

    /// Consumes inbound frames until the peer disconnects, is closed by
    /// [`Client::close`], or a transport error occurs. Never panics or
    /// propagates an error for an ordinary disconnect.
    pub async fn listen(self: &Arc<Self>) {
        loop {
            enum Event {
                Frame(Option<Result<Message, axum::Error>>),
                Closed,
            }

            let event = {
                let mut inbound = self.inbound.lock().await;
                tokio::select! {
                    biased;
                    () = self.close_notify.notified() => Event::Closed,
                    frame = inbound.next() => Event::Frame(frame),
                }
            };

            match event {
                Event::Closed => break,
                Event::Frame(Some(Ok(Message::Text(text)))) => {
                    let handler = Arc::clone(&self.handler);
                    let channel_id = self.channel_id.clone();
                    handler.dispatch(text.as_str(), &channel_id, self).await;
                }
                Event::Frame(Some(Ok(Message::Close(_)))) | Event::Frame(None) => break,
                Event::Frame(Some(Ok(_))) => continue,
                Event::Frame(Some(Err(_))) => break,
            }
        }
    }

    /// Writes one text frame. Non-blocking: a full outbound queue fails
    /// immediately rather than stalling the caller (typically
    /// `Channel::broadcast`, which must not let one slow peer block fan-out
    /// to the rest of the channel).
    pub fn send(&self, message: String) -> Result<(), SendError> {
        self.outbound
            .try_send(OutboundMessage::Text(message))
            .map_err(|_| SendError::Disconnected)
    }

    /// Writes one text frame, waiting up to this client's configured
    /// `send_timeout` for room in the outbound queue rather than failing
    /// immediately. Meant for a one-off direct send to this client (the
    /// connect acknowledgement), not for fan-out, which uses [`Client::send`]
    /// so one slow peer can't delay delivery to the rest of the channel.
    pub async fn send_timed(&self, message: String) -> Result<(), SendError> {
        self.outbound
            .send_timeout(OutboundMessage::Text(message), self.send_timeout)
            .await
            .map_err(|_| SendError::Disconnected)
    }

    /// Convenience wrapper used by operation handlers to re-publish an
    /// accepted message on this client's channel.
    pub async fn publish(
        &self,
        backend: &dyn crate::backend::Backend,
        message: &str,
    ) -> Result<(), crate::error::BackendError> {
        backend.publish(&self.channel_id, message).await
    }

    /// Idempotent best-effort close: enqueues a close frame for the writer
    /// task and wakes `listen()` so it stops reading even if the writer
    /// never gets scheduled.
    ///
    /// Accepts either a literal `&'static str` or an owned `String` (e.g. a
    /// reason formatted with attacker-controlled data, such as an unknown
    /// operation name) without leaking: `Cow<'static, str>`'s owned variant
    /// needs no `'static` borrow.
    pub fn close(&self, code: u16, reason: impl Into<Cow<'static, str>>) {
        let reason = reason.into();
        let _ = self.outbound.try_send(OutboundMessage::Close {
            code,
            reason: reason.clone(),
        });
        self.close_notify.notify_one();
        debug!(client_id = %self.id, code, %reason, "client closed");
    }
}

/// Drains `rx` and forwards each message to the WebSocket sink until the
/// channel is closed or a `Close` message is sent.
pub async fn run_writer(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<OutboundMessage>,
) {
    use futures_util::SinkExt;

    while let Some(msg) = rx.recv().await {
        let ws_message = match msg {
            OutboundMessage::Text(text) => Message::Text(text),
            OutboundMessage::Close { code, reason } => {
                Message::Close(Some(CloseFrame { code, reason }))
            }
        };
        let is_close = matches!(ws_message, Message::Close(_));
        if sink.send(ws_message).await.is_err() {
            break;
        }
        if is_close {
            break;
        }
    }
}
