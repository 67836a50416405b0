//! Map from `document_id` to [`Channel`], guarded by a single registry lock.
//!
//! At most one channel per `document_id` exists at any point. `get_or_create`
//! and `destroy` are serialized on the registry lock below, so no caller can
//! observe a half-created or half-destroyed channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::backend::Backend;
use crate::channel::Channel;
use crate::config::ConnectionConfig;
use crate::error::BackendError;
use crate::message_handler::MessageHandler;

/// Owner of every live [`Channel`]. Channels hold a [`Weak`] handle back to
/// their registry so a channel can ask to be removed without keeping the
/// registry alive itself.
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, Arc<Channel>>>,
    backend: Arc<dyn Backend>,
    handler: Arc<MessageHandler>,
    ephemeral_expire_seconds: u64,
    permanent_expire_seconds: u64,
    connection: ConnectionConfig,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        handler: Arc<MessageHandler>,
        ephemeral_expire_seconds: u64,
        permanent_expire_seconds: u64,
        connection: ConnectionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(HashMap::new()),
            backend,
            handler,
            ephemeral_expire_seconds,
            permanent_expire_seconds,
            connection,
        })
    }

    /// Returns the existing channel for `document_id`, or subscribes to the
    /// backend and constructs a new one. The `bool` is `true` when a new
    /// channel was created, in which case the caller must spawn its
    /// `listen()` task so every registry entry always has a live listener.
    pub async fn get_or_create(
        self: &Arc<Self>,
        document_id: &str,
    ) -> Result<(Arc<Channel>, bool), BackendError> {
        let mut channels = self.channels.lock().await;

        if let Some(channel) = channels.get(document_id) {
            return Ok((Arc::clone(channel), false));
        }

        let subscription = self.backend.subscribe(document_id).await?;
        let channel = Channel::new(
            document_id.to_string(),
            subscription,
            Arc::downgrade(self),
            Arc::clone(&self.backend),
            Arc::clone(&self.handler),
            self.ephemeral_expire_seconds,
            self.permanent_expire_seconds,
            self.connection.clone(),
        );
        channels.insert(document_id.to_string(), Arc::clone(&channel));
        Ok((channel, true))
    }

    /// Removes `document_id` from the registry. Idempotent: a channel that
    /// somehow tore itself down twice (which the per-channel lock rules out,
    /// but would be harmless regardless) simply finds nothing to remove the
    /// second time.
    pub async fn destroy(&self, document_id: &str) {
        self.channels.lock().await.remove(document_id);
    }

    /// Number of live channels, surfaced on the `/health` endpoint.
    pub async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }
}
