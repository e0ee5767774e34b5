// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared handle to one live WebSocket connection.
//!
//! The socket itself is owned by the connection's handler task. Everyone else
//! (registry, router, heartbeat monitor) holds an `Arc<Connection>` which can
//! only enqueue outbound frames or ask the handler to close.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Process-unique connection identifier.
pub type ConnectionId = u64;

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    AuthenticationFailed,
    ProtocolError,
    PeerClosed,
    ReadError,
    /// Same user authenticated a newer connection.
    Replaced,
    /// Heartbeat timeout.
    Evicted,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::PeerClosed => "PEER_CLOSED",
            Self::ReadError => "READ_ERROR",
            Self::Replaced => "REPLACED",
            Self::Evicted => "EVICTED",
            Self::Shutdown => "SHUTDOWN",
        }
    }

    /// Close code for the frame sent to the peer.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::AuthenticationFailed => 4001,
            Self::ProtocolError => 4002,
            Self::Replaced => 4000,
            Self::Evicted => 4008,
            Self::Shutdown => 1001,
            Self::PeerClosed => 1000,
            Self::ReadError => 1011,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an outbound frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// Outbound queue is full; the peer is not draining.
    Full,
    /// Connection is closed or closing.
    Closed,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("outbound queue full"),
            Self::Closed => f.write_str("connection closed"),
        }
    }
}

impl std::error::Error for DeliveryError {}

pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
    reason: OnceLock<CloseReason>,
}

impl Connection {
    /// Create a connection handle with an outbound queue of `buffer` frames.
    ///
    /// The receiver goes to whoever owns the socket.
    pub fn new(buffer: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let (outbound, rx) = mpsc::channel(buffer.max(1));
        let conn = Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            outbound,
            cancel: CancellationToken::new(),
            reason: OnceLock::new(),
        });
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a text frame for the owning handler to write. Never blocks.
    pub fn deliver(&self, frame: String) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Mark the connection closed and signal its handler.
    ///
    /// Returns `true` only for the call that actually closed it; later calls
    /// are no-ops and keep the first reason.
    pub fn close(&self, reason: CloseReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.cancel.cancel();
        first
    }

    pub fn is_closed(&self) -> bool {
        self.reason.get().is_some()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.reason.get().copied()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.close_reason())
            .finish()
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
