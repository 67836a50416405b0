//! Redis-backed implementation of [`super::Backend`].

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::{MultiplexedConnection, PubSub};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Backend, BackendEvent, EventKind, Subscription};
use crate::error::BackendError;

/// Channel Redis publishes expiration key names to when keyspace
/// notifications are enabled (`notify-keyspace-events Ex`).
const EXPIRED_KEYEVENT_CHANNEL: &str = "__keyevent@0__:expired";

pub struct RedisBackend {
    client: redis::Client,
    conn: Mutex<MultiplexedConnection>,
}

impl RedisBackend {
    pub async fn connect(redis_url: &str) -> Result<Self, BackendError> {
        let client = redis::Client::open(redis_url).map_err(BackendError::from)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            client,
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), BackendError> {
        let mut conn = self.conn.lock().await;
        conn.publish(channel, message).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BackendError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        pubsub.subscribe(EXPIRED_KEYEVENT_CHANNEL).await?;

        Ok(Box::new(RedisSubscription {
            pubsub: Some(pubsub),
            document_key: channel.to_string(),
        }))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, BackendError> {
        let mut conn = self.conn.lock().await;
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), BackendError> {
        let mut conn = self.conn.lock().await;
        conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), BackendError> {
        let mut conn = self.conn.lock().await;
        conn.expire(key, seconds as i64).await?;
        Ok(())
    }
}

struct RedisSubscription {
    pubsub: Option<PubSub>,
    document_key: String,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next_event(&mut self) -> Option<BackendEvent> {
        let pubsub = self.pubsub.as_mut()?;
        let mut stream = pubsub.on_message();
        loop {
            let msg = stream.next().await?;
            let channel = msg.get_channel_name();

            if channel == EXPIRED_KEYEVENT_CHANNEL {
                let expired_key: String = msg.get_payload().unwrap_or_default();
                if expired_key != self.document_key {
                    continue;
                }
                return Some(BackendEvent {
                    kind: EventKind::Message,
                    data: "expired".to_string(),
                });
            }

            let Ok(payload) = msg.get_payload::<String>() else {
                continue;
            };
            return Some(BackendEvent {
                kind: EventKind::Message,
                data: payload,
            });
        }
    }

    async fn reset(&mut self) {
        if let Some(mut pubsub) = self.pubsub.take() {
            let _ = pubsub.unsubscribe(&self.document_key).await;
            let _ = pubsub.unsubscribe(EXPIRED_KEYEVENT_CHANNEL).await;
            debug!(channel = %self.document_key, "pubsub subscription reset");
        }
    }
}
