//! WebSocket upgrade handler: the HTTP-framework glue that hands a freshly
//! upgraded socket off to [`crate::connection::handle_connection`].

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

use super::AppState;
use crate::connection::handle_connection;

/// Upgrades `/​<token>/` to a WebSocket and runs the connection to
/// completion. The token carries the codespace id (or, for `tmp-` ids, the
/// id itself).
pub async fn ws_upgrade_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        handle_connection(socket, token, state.registry, state.auth).await;
    })
}
