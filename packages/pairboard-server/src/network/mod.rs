//! Networking: router assembly, HTTP middleware, and graceful shutdown.
//!
//! Per-document channel fabric (the actual relay) lives in
//! [`crate::channel`], [`crate::client`], [`crate::message_handler`], and
//! [`crate::registry`]; this module is the HTTP-framework glue around it.

pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use handlers::AppState;
pub use module::NetworkModule;
pub use shutdown::*;
