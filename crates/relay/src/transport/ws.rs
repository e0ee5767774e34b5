// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection gateway: WebSocket upgrade and authentication handshake.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{SinkExt, Stream, StreamExt};
use tracing::{debug, warn};

use crate::connection::CloseReason;
use crate::error::{ErrorResponse, RelayError};
use crate::protocol::{InboundFrame, UserId};
use crate::state::RelayState;
use crate::transport::handler::{close_message, ConnectionHandler};

/// `GET /ws`: upgrade to the relay WebSocket.
pub async fn ws_handler(
    State(state): State<Arc<RelayState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(code = %RelayError::HandshakeFailed, err = %rejection, "websocket upgrade rejected");
            let body = ErrorResponse {
                error: RelayError::HandshakeFailed.to_error_body(rejection.body_text()),
            };
            return (rejection.status(), Json(body)).into_response();
        }
    };

    ws.on_failed_upgrade(|e| {
        warn!(code = %RelayError::HandshakeFailed, err = %e, "websocket upgrade failed");
    })
    .on_upgrade(move |socket| handle_connection(state, socket))
}

/// Per-connection entry point, starting in the unauthenticated phase.
async fn handle_connection(state: Arc<RelayState>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let user_id = match authenticate(&state, &mut ws_rx).await {
        Ok(user_id) => user_id,
        Err(why) => {
            warn!(code = %RelayError::AuthenticationFailed, reason = %why, "closing unauthenticated connection");
            let _ = ws_tx.send(close_message(CloseReason::AuthenticationFailed)).await;
            let _ = ws_tx.close().await;
            return;
        }
    };

    let handler = ConnectionHandler::authenticated(Arc::clone(&state), user_id);
    let conn_id = handler.connection().id();
    let reason = handler.run(ws_tx, ws_rx).await;
    debug!(user_id, conn_id, %reason, "handler finished");
}

/// Read exactly one frame and resolve it to an identity.
///
/// Anything other than a valid authenticate frame within the auth timeout is
/// a failure. There is no second attempt on the same connection.
pub async fn authenticate<R, E>(state: &RelayState, rx: &mut R) -> Result<UserId, String>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let first = match tokio::time::timeout(state.config.auth_timeout(), rx.next()).await {
        Err(_) => return Err("timed out waiting for authenticate frame".to_owned()),
        Ok(None) => return Err("closed before authenticating".to_owned()),
        Ok(Some(Err(e))) => return Err(format!("read failed: {e}")),
        Ok(Some(Ok(msg))) => msg,
    };

    let Message::Text(text) = first else {
        return Err("first frame must be a text authenticate frame".to_owned());
    };

    match InboundFrame::decode(&text) {
        Ok(InboundFrame::Authenticate { token }) => {
            state.resolver.validate(&token).await.map_err(|e| e.to_string())
        }
        Ok(other) => Err(format!("expected authenticate frame, got {}", other.kind())),
        Err(e) => Err(format!("undecodable frame: {e}")),
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
