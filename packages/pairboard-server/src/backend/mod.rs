//! The pub/sub + kv backend facade consumed by [`crate::channel`] and
//! [`crate::message_handler`].
//!
//! This is the only boundary between the relay and the external store: a
//! thin `publish`/`subscribe`/`hget`/`hset`/`expire` surface, deliberately
//! narrower than a full Redis client so that the channel fabric never
//! depends on backend-specific types.

mod redis_backend;

pub use redis_backend::RedisBackend;

use async_trait::async_trait;

use crate::error::BackendError;

/// The kind of record yielded by a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// An application-level payload published on the document's channel, or
    /// a keyspace expiration translated into the sentinel `"expired"`
    /// payload.
    Message,
}

/// A single record delivered by the backend's pub/sub stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEvent {
    pub kind: EventKind,
    pub data: String,
}

/// An open subscription to one document's pub/sub channel.
///
/// Implementations also listen for the backend's keyspace expiration
/// notification for the same key and translate it into a `BackendEvent`
/// carrying the literal payload `"expired"`, so callers never need to know
/// about keyspace notifications directly.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next record. Returns `None` once the subscription has
    /// been closed, either by [`Subscription::reset`] or by the backend
    /// connection dropping.
    async fn next_event(&mut self) -> Option<BackendEvent>;

    /// Tears down the subscription. Idempotent.
    async fn reset(&mut self);
}

/// The pub/sub + kv operations required by the channel fabric.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), BackendError>;

    /// Opens a subscription to `channel`, also arming keyspace-expiration
    /// delivery for the same key.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BackendError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, BackendError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), BackendError>;

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), BackendError>;
}
