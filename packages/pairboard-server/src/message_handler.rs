//! Parses inbound frames, enforces the operation whitelist, and executes
//! the two supported operations.
//!
//! A single `MessageHandler` is shared by every channel and client; it
//! carries no mutable state of its own beyond the per-document in-flight
//! locks that serialize `insert_value`.

use std::sync::Arc;

use dashmap::DashMap;
use pairboard_core::message::operation_names;
use pairboard_core::{apply_changes, InsertValue};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::backend::Backend;
use crate::client::Client;

/// Shared, stateless (besides per-document locks) operation dispatcher.
pub struct MessageHandler {
    backend: Arc<dyn Backend>,
    insert_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MessageHandler {
    pub fn new(backend: Arc<dyn Backend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            insert_locks: DashMap::new(),
        })
    }

    fn insert_lock(&self, document_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.insert_locks
                .entry(document_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Parses `raw` and routes it to the matching operation, or closes the
    /// peer if the frame is malformed or the operation isn't whitelisted.
    pub async fn dispatch(&self, raw: &str, document_id: &str, client: &Arc<Client>) {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value @ Value::Object(_)) => value,
            _ => {
                client.close(1011, "Message does not have specified 'operation'");
                return;
            }
        };

        let Some(operation) = value.get("operation").and_then(Value::as_str) else {
            client.close(1011, "Message does not have specified 'operation'");
            return;
        };

        if !operation_names::is_whitelisted(operation) {
            self.operation_not_allowed(operation, client);
            return;
        }

        match operation {
            operation_names::INSERT_VALUE => {
                self.insert_value(raw, &value, document_id, client).await;
            }
            operation_names::CREATE_SELECTION => {
                self.create_selection(raw, client).await;
            }
            _ => unreachable!("operation was checked against the whitelist above"),
        }
    }

    fn operation_not_allowed(&self, operation: &str, client: &Arc<Client>) {
        warn!(operation, "operation is not allowed");
        client.close(1011, format!("'{operation}' operation is not allowed"));
    }

    /// Atomic read-modify-write of the document text, followed by a TTL
    /// refresh and republish. Serialized per `document_id` so that within
    /// one process at most one `insert_value` is ever in flight for a given
    /// document, closing the intra-process race window between reading and
    /// writing the stored text.
    async fn insert_value(&self, raw: &str, value: &Value, document_id: &str, client: &Arc<Client>) {
        let changes = match serde_json::from_value::<InsertValue>(value.clone()) {
            Ok(body) => body.changes,
            Err(err) => {
                warn!(document_id, %err, "insert_value message had no usable 'changes' field");
                return;
            }
        };

        let lock = self.insert_lock(document_id);
        let _guard = lock.lock().await;

        let code = match self.backend.hget(document_id, "code").await {
            Ok(Some(code)) => code,
            Ok(None) => {
                client.close(1011, "Can't find data for given codespace");
                return;
            }
            Err(err) => {
                warn!(document_id, %err, "backend unavailable during insert_value");
                return;
            }
        };

        let new_code = match apply_changes(&code, &changes) {
            Ok(new_code) => new_code,
            Err(err) => {
                warn!(document_id, %err, "rejected an invalid change list");
                return;
            }
        };

        if let Err(err) = self.backend.hset(document_id, "code", &new_code).await {
            warn!(document_id, %err, "failed to persist insert_value");
            return;
        }
        if let Err(err) = self
            .backend
            .expire(document_id, client.expire_refresh_seconds)
            .await
        {
            warn!(document_id, %err, "failed to refresh document TTL");
        }
        if let Err(err) = client.publish(self.backend.as_ref(), raw).await {
            warn!(document_id, %err, "failed to publish insert_value");
        }
    }

    /// Pure relay: no state mutation, no TTL refresh.
    async fn create_selection(&self, raw: &str, client: &Arc<Client>) {
        if let Err(err) = client.publish(self.backend.as_ref(), raw).await {
            warn!(err = %err, "failed to publish create_selection");
        }
    }
}
