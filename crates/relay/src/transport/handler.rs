// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection state machine.
//!
//! ```text
//! Authenticated --read error / protocol error / eviction / replacement / shutdown--> Closed
//! ```
//!
//! The handshake before `Authenticated` belongs to the gateway in `ws.rs`.
//!
//! The handler task is the only owner of the socket. It reads inbound frames
//! in arrival order and drains the connection's outbound queue, which is how
//! the router reaches this peer.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::{CloseReason, Connection};
use crate::error::RelayError;
use crate::protocol::{InboundFrame, UserId};
use crate::state::RelayState;

/// Bound on writing the final close frame to a peer that may not be reading.
const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Phase of a connection once the gateway has authenticated it.
///
/// The unauthenticated phase is the gateway's handshake; a handler only
/// exists for an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Authenticated(UserId),
    Closed(CloseReason),
}

/// Drives an authenticated connection until it closes.
pub struct ConnectionHandler {
    state: Arc<RelayState>,
    user_id: UserId,
    conn: Arc<Connection>,
    outbound: mpsc::Receiver<String>,
    phase: Phase,
}

impl ConnectionHandler {
    /// Register `user_id` and take over its registry slot.
    ///
    /// A connection displaced from the slot is closed here, by the side that
    /// performed the replacement.
    pub fn authenticated(state: Arc<RelayState>, user_id: UserId) -> Self {
        let (conn, outbound) = Connection::new(state.config.outbound_buffer);
        if let Some(prev) = state.registry.register(user_id, Arc::clone(&conn)) {
            if prev.close(CloseReason::Replaced) {
                info!(user_id, old_conn = prev.id(), new_conn = conn.id(), "session replaced");
            }
        }
        info!(user_id, conn_id = conn.id(), "user authenticated");
        Self { state, user_id, conn, outbound, phase: Phase::Authenticated(user_id) }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the message loop, then tear down. Returns the close reason.
    pub async fn run<S, R, E>(mut self, mut sink: S, mut stream: R) -> CloseReason
    where
        S: Sink<Message> + Unpin,
        S::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let user_id = self.user_id;
        let shutdown = self.state.shutdown.clone();

        let reason = loop {
            tokio::select! {
                biased;
                _ = self.conn.closed() => {
                    break self.conn.close_reason().unwrap_or(CloseReason::Shutdown);
                }
                _ = shutdown.cancelled() => break CloseReason::Shutdown,
                Some(frame) = self.outbound.recv() => {
                    // A peer that stops draining must not pin us past eviction.
                    tokio::select! {
                        result = sink.send(Message::Text(frame.into())) => {
                            // The next read on a broken socket tears us down.
                            if let Err(e) = result {
                                warn!(user_id, conn_id = self.conn.id(), code = %RelayError::DeliveryFailure, err = %e, "write to peer failed");
                            }
                        }
                        _ = self.conn.closed() => {}
                        _ = shutdown.cancelled() => {}
                    }
                }
                msg = stream.next() => {
                    if let Err(reason) = self.on_message(user_id, msg).await {
                        break reason;
                    }
                }
            }
        };

        self.teardown(user_id, reason);
        let reason = self.conn.close_reason().unwrap_or(reason);
        if !matches!(reason, CloseReason::PeerClosed | CloseReason::ReadError) {
            let close = sink.send(close_message(reason));
            if tokio::time::timeout(CLOSE_WRITE_TIMEOUT, close).await.is_err() {
                debug!(user_id, conn_id = self.conn.id(), %reason, "close frame write timed out");
            }
        }
        let _ = tokio::time::timeout(CLOSE_WRITE_TIMEOUT, sink.close()).await;
        reason
    }

    /// Unregister and close. Safe to call any number of times.
    fn teardown(&mut self, user_id: UserId, reason: CloseReason) {
        let removed = self.state.registry.remove(user_id, &self.conn);
        self.conn.close(reason);
        self.phase = Phase::Closed(reason);
        debug!(user_id, conn_id = self.conn.id(), removed, %reason, "connection closed");
    }

    /// Handle one read result. `Err` carries the reason to close.
    async fn on_message<E: Display>(
        &self,
        user_id: UserId,
        msg: Option<Result<Message, E>>,
    ) -> Result<(), CloseReason> {
        let msg = match msg {
            None => return Err(CloseReason::PeerClosed),
            Some(Err(e)) => {
                debug!(user_id, conn_id = self.conn.id(), code = %RelayError::ReadError, err = %e, "read failed");
                return Err(CloseReason::ReadError);
            }
            Some(Ok(msg)) => msg,
        };

        let text = match msg {
            Message::Text(text) => text,
            Message::Ping(_) | Message::Pong(_) => {
                self.state.registry.touch(user_id);
                return Ok(());
            }
            Message::Close(_) => return Err(CloseReason::PeerClosed),
            Message::Binary(_) => {
                warn!(user_id, code = %RelayError::ProtocolError, "binary frame rejected");
                return Err(CloseReason::ProtocolError);
            }
        };

        let frame = match InboundFrame::decode(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(user_id, code = %RelayError::ProtocolError, err = %e, "undecodable frame");
                return Err(CloseReason::ProtocolError);
            }
        };

        // Any well-formed frame is proof of life.
        self.state.registry.touch(user_id);

        match frame {
            InboundFrame::Heartbeat => {}
            InboundFrame::Invitation(invitation) => {
                if self.state.config.enforce_inviter && invitation.inviter_id != user_id {
                    warn!(
                        user_id,
                        claimed = invitation.inviter_id,
                        "invitation inviter_id does not match sender, dropped"
                    );
                    return Ok(());
                }
                let outcome = self.state.router.route(invitation).await;
                debug!(user_id, ?outcome, "invitation routed");
            }
            InboundFrame::Authenticate { .. } => {
                debug!(user_id, "already authenticated, frame ignored");
            }
            InboundFrame::Unknown(tag) => {
                warn!(user_id, kind = tag.as_deref().unwrap_or("untagged"), "unrecognized frame ignored");
            }
        }
        Ok(())
    }
}

/// Close frame carrying `reason`.
pub fn close_message(reason: CloseReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: reason.close_code(),
        reason: Utf8Bytes::from_static(reason.as_str()),
    }))
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
