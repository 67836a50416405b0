//! HTTP and WebSocket handler definitions for the relay server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod health;
pub mod websocket;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use websocket::ws_upgrade_handler;

use std::sync::Arc;
use std::time::Instant;

use crate::auth::AuthClient;
use crate::config::ServerConfig;
use crate::registry::ChannelRegistry;

use super::ShutdownController;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Owner of every live per-document channel.
    pub registry: Arc<ChannelRegistry>,
    /// Resolves a connection token to a document id and capability mode.
    pub auth: Arc<AuthClient>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Server configuration (bind address, backend, auth API, per-connection
    /// settings).
    pub config: Arc<ServerConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
