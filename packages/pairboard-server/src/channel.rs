//! One channel per document: a pub/sub listener fanning out to the set of
//! clients currently editing that document.

use std::sync::{Arc, Weak};

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use pairboard_core::{classify, DocumentFlavor, Mode};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendEvent, EventKind, Subscription};
use crate::client::{run_writer, Client};
use crate::config::ConnectionConfig;
use crate::message_handler::MessageHandler;
use crate::registry::ChannelRegistry;

/// Control-plane payloads the channel handles itself instead of fanning out
/// verbatim. Currently only the keyspace-expiration sentinel.
const CONTROL_EXPIRED: &str = "expired";

/// Per-document fan-out object.
///
/// Holds a non-owning [`Weak`] reference back to its registry (see the
/// reference-cycle design note): the registry owns channels, and a channel
/// only ever asks the registry to remove itself.
pub struct Channel {
    pub channel_id: String,
    clients: Mutex<Vec<Arc<Client>>>,
    subscription: Mutex<Box<dyn Subscription>>,
    /// Wakes `listen()` out of an in-flight `next_event().await` on a quiet
    /// document so `leave()` never has to contend on `subscription` itself
    /// to tear it down -- the same race-a-`Notify`-against-the-read shape
    /// `Client::listen` uses for the identical problem on the client side.
    cancel: Notify,
    registry: Weak<ChannelRegistry>,
    backend: Arc<dyn Backend>,
    handler: Arc<MessageHandler>,
    expire_refresh_seconds: u64,
    connection: ConnectionConfig,
}

impl Channel {
    pub(crate) fn new(
        channel_id: String,
        subscription: Box<dyn Subscription>,
        registry: Weak<ChannelRegistry>,
        backend: Arc<dyn Backend>,
        handler: Arc<MessageHandler>,
        ephemeral_expire_seconds: u64,
        permanent_expire_seconds: u64,
        connection: ConnectionConfig,
    ) -> Arc<Self> {
        let expire_refresh_seconds = match classify(&channel_id) {
            DocumentFlavor::Ephemeral => ephemeral_expire_seconds,
            DocumentFlavor::Permanent => permanent_expire_seconds,
        };

        Arc::new(Self {
            channel_id,
            clients: Mutex::new(Vec::new()),
            subscription: Mutex::new(subscription),
            cancel: Notify::new(),
            registry,
            backend,
            handler,
            expire_refresh_seconds,
            connection,
        })
    }

    /// Long-running task: consumes the pub/sub stream until it closes or
    /// `leave()` signals teardown. Owned by the channel's lifetime; the
    /// registry spawns exactly one of these per channel at creation time.
    ///
    /// Races the read against `cancel` rather than locking `subscription`
    /// from both this loop and `leave()`: a quiet document may never
    /// deliver another `next_event()`, and a second caller blocked on the
    /// same lock to call `reset()` would then hang forever. The subscription
    /// must be reset promptly once the last client leaves, not whenever the
    /// next unrelated message happens to arrive.
    pub async fn listen(self: Arc<Self>) {
        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.notified() => None,
                event = self.next_subscription_event() => event,
            };

            let Some(event) = event else {
                info!(channel_id = %self.channel_id, "pubsub listener stopping");
                break;
            };

            if event.kind != EventKind::Message {
                continue;
            }

            if event.data == CONTROL_EXPIRED {
                self.control_expired().await;
                continue;
            }

            self.broadcast(&event.data).await;
        }

        self.subscription.lock().await.reset().await;
        debug!(channel_id = %self.channel_id, "pubsub subscription reset");
    }

    /// Locks `subscription` for exactly one `next_event()` call. Dropping
    /// this future (as `tokio::select!` does when `cancel` wins the race)
    /// never leaves the lock held: `Mutex::lock()` is cancel-safe, and no
    /// guard exists until the lock is actually acquired.
    async fn next_subscription_event(&self) -> Option<BackendEvent> {
        let mut subscription = self.subscription.lock().await;
        subscription.next_event().await
    }

    /// Sends `payload` to every currently-registered client. Per-client
    /// failures are logged and swallowed so one bad peer never blocks
    /// delivery to the rest of the channel.
    async fn broadcast(&self, payload: &str) {
        let snapshot = self.clients.lock().await.clone();
        for client in snapshot {
            if client.send(payload.to_string()).is_err() {
                warn!(client_id = %client.id, channel_id = %self.channel_id, "dropped broadcast to a disconnected client");
            }
        }
    }

    /// Closes every client in the channel. Each client's own `listen()`
    /// loop then unwinds through `ConnectionHandler`'s cleanup, which calls
    /// `leave` and tears the channel down once it is empty.
    async fn control_expired(&self) {
        let snapshot = self.clients.lock().await.clone();
        info!(channel_id = %self.channel_id, clients = snapshot.len(), "codespace data expired");
        for client in snapshot {
            client.close(1011, "Codespace data expired from cache");
        }
    }

    /// Constructs a client bound to this channel. Does not add it to
    /// `clients`; the caller must follow up with [`Channel::register`].
    pub fn create_client(
        self: &Arc<Self>,
        inbound: SplitStream<WebSocket>,
        mode: Mode,
    ) -> (Arc<Client>, tokio::sync::mpsc::Receiver<crate::client::OutboundMessage>) {
        Client::new(
            self.channel_id.clone(),
            mode,
            self.expire_refresh_seconds,
            inbound,
            Arc::clone(&self.handler),
            &self.connection,
        )
    }

    pub async fn register(&self, client: Arc<Client>) {
        self.clients.lock().await.push(client);
    }

    /// Removes `client` from the channel and, if it was the last one, tears
    /// the channel down: deregisters from the registry, then wakes
    /// `listen()` so it resets the subscription itself and exits. Both
    /// steps run while still holding the per-channel lock so no concurrent
    /// `register` on this (now-dying) instance can observe a
    /// half-torn-down channel.
    ///
    /// Deliberately does not touch `subscription` itself -- `listen()` owns
    /// that lock for the lifetime of its read, and a second caller blocking
    /// on it here would hang until the next unrelated backend message (see
    /// `listen()`'s doc comment).
    pub async fn leave(&self, client: &Arc<Client>) {
        let mut clients = self.clients.lock().await;
        if let Some(pos) = clients.iter().position(|c| Arc::ptr_eq(c, client)) {
            client.close(1011, "Connection closed");
            clients.remove(pos);
        }

        if clients.is_empty() {
            if let Some(registry) = self.registry.upgrade() {
                registry.destroy(&self.channel_id).await;
            }
            self.cancel.notify_one();
            debug!(channel_id = %self.channel_id, "channel torn down");
        }
    }
}

/// Spawns the writer task that drains a client's outbound queue onto its
/// WebSocket sink. Kept as a free function (rather than a `Channel` method)
/// because it owns the sink half directly, independent of channel
/// membership.
pub fn spawn_writer(sink: SplitSink<WebSocket, Message>, rx: tokio::sync::mpsc::Receiver<crate::client::OutboundMessage>) {
    tokio::spawn(run_writer(sink, rx));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::message_handler::MessageHandler;
    use async_trait::async_trait;
    use axum::extract::ws::WebSocketUpgrade;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// A subscription that never delivers another event, modeling a quiet
    /// document with no activity after its last client leaves. Records
    /// whether `reset` was actually invoked.
    struct NeverSubscription {
        reset_called: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Subscription for NeverSubscription {
        async fn next_event(&mut self) -> Option<BackendEvent> {
            std::future::pending().await
        }

        async fn reset(&mut self) {
            self.reset_called.store(true, Ordering::SeqCst);
        }
    }

    struct NullBackend;

    #[async_trait]
    impl Backend for NullBackend {
        async fn publish(&self, _channel: &str, _message: &str) -> Result<(), BackendError> {
            Ok(())
        }
        async fn subscribe(&self, _channel: &str) -> Result<Box<dyn Subscription>, BackendError> {
            unimplemented!("tests construct Channel directly, bypassing ChannelRegistry::get_or_create")
        }
        async fn hget(&self, _key: &str, _field: &str) -> Result<Option<String>, BackendError> {
            Ok(None)
        }
        async fn hset(&self, _key: &str, _field: &str, _value: &str) -> Result<(), BackendError> {
            Ok(())
        }
        async fn expire(&self, _key: &str, _seconds: u64) -> Result<(), BackendError> {
            Ok(())
        }
    }

    /// Opens one real loopback WebSocket connection and hands back the
    /// server-side inbound half, so `Client::new` can be exercised without a
    /// fake stand-in for axum's socket type.
    async fn accept_one_websocket() -> SplitStream<WebSocket> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind a loopback listener");
        let addr = listener.local_addr().expect("listener has a local address");

        let (socket_tx, socket_rx) = tokio::sync::oneshot::channel();
        let socket_tx = StdMutex::new(Some(socket_tx));

        tokio::spawn(async move {
            let app = Router::new().route(
                "/",
                get(move |ws: WebSocketUpgrade| {
                    let socket_tx = socket_tx.lock().unwrap().take();
                    async move {
                        ws.on_upgrade(move |socket| async move {
                            if let Some(tx) = socket_tx {
                                let _ = tx.send(socket);
                            }
                            std::future::pending::<()>().await;
                        })
                    }
                }),
            );
            let _ = axum::serve(listener, app).await;
        });

        let url = format!("ws://{addr}/");
        let (_client_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .expect("loopback websocket handshake should succeed");

        let socket = socket_rx
            .await
            .expect("server should hand back the upgraded socket");
        futures_util::StreamExt::split(socket).1
    }

    #[tokio::test]
    async fn leave_does_not_deadlock_on_a_quiet_subscription_and_resets_it() {
        let reset_called = Arc::new(AtomicBool::new(false));
        let subscription = Box::new(NeverSubscription {
            reset_called: Arc::clone(&reset_called),
        });
        let backend: Arc<dyn Backend> = Arc::new(NullBackend);
        let handler = MessageHandler::new(Arc::clone(&backend));

        let channel = Channel::new(
            "doc-quiet".to_string(),
            subscription,
            Weak::new(),
            Arc::clone(&backend),
            handler,
            300,
            3600,
            ConnectionConfig::default(),
        );

        let listener_handle = tokio::spawn(Arc::clone(&channel).listen());

        let inbound = accept_one_websocket().await;
        let (client, _outbound_rx) = channel.create_client(inbound, Mode::Edit);
        channel.register(Arc::clone(&client)).await;

        // Before the fix, this hung forever: `leave()` tried to lock the
        // same `subscription` mutex `listen()` was holding across its
        // in-flight (never-resolving) `next_event().await`.
        tokio::time::timeout(Duration::from_secs(2), channel.leave(&client))
            .await
            .expect("leave() must not block on a quiet subscription");

        // `listen()` must wind down promptly too -- not linger until some
        // unrelated future backend message happens to arrive.
        tokio::time::timeout(Duration::from_secs(2), listener_handle)
            .await
            .expect("listen() must exit once leave() signals teardown")
            .expect("listen() must not panic");

        assert!(reset_called.load(Ordering::SeqCst), "subscription must be reset on teardown");
    }

    #[tokio::test]
    async fn leave_of_a_non_member_client_is_a_no_op() {
        let subscription = Box::new(NeverSubscription {
            reset_called: Arc::new(AtomicBool::new(false)),
        });
        let backend: Arc<dyn Backend> = Arc::new(NullBackend);
        let handler = MessageHandler::new(Arc::clone(&backend));

        let channel = Channel::new(
            "doc-solo".to_string(),
            subscription,
            Weak::new(),
            Arc::clone(&backend),
            handler,
            300,
            3600,
            ConnectionConfig::default(),
        );

        let inbound = accept_one_websocket().await;
        let (stranger, _outbound_rx) = channel.create_client(inbound, Mode::Edit);

        // `stranger` was never registered; `leave` must still treat the
        // (already-empty) client set as empty and tear down rather than
        // panicking or hanging on a client it never saw.
        tokio::time::timeout(Duration::from_secs(2), channel.leave(&stranger))
            .await
            .expect("leave() of an unregistered client must not hang");
    }
}
