// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay: presence-aware invitation routing over WebSocket.

pub mod config;
pub mod connection;
pub mod error;
pub mod identity;
pub mod monitor;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod state;
pub mod store;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::connection::CloseReason;
use crate::identity::{TokenResolver, UserDirectory};
use crate::monitor::HeartbeatMonitor;
use crate::state::RelayState;
use crate::store::{JsonlStore, MemoryStore, PendingInvitationStore};
use crate::transport::build_router;

/// Build relay state from configuration: user directory, token resolver and
/// pending store.
pub fn build_state(config: RelayConfig, shutdown: CancellationToken) -> anyhow::Result<RelayState> {
    let directory = UserDirectory::load(&config.users)?;
    if directory.is_empty() {
        warn!("user directory {} is empty; every token will be rejected", config.users.display());
    }
    let resolver = Arc::new(TokenResolver::new(config.token_secret.as_bytes(), directory));

    let store: Arc<dyn PendingInvitationStore> = match config.pending_store {
        Some(ref path) => {
            info!("pending invitations stored in {}", path.display());
            Arc::new(JsonlStore::open(path)?)
        }
        None => Arc::new(MemoryStore::new()),
    };

    Ok(RelayState::new(config, resolver, store, shutdown))
}

/// Run the relay until Ctrl-C.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let state = Arc::new(build_state(config, shutdown.clone())?);

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
            }
            shutdown.cancel();
        });
    }

    let listener = TcpListener::bind(&addr).await?;
    info!(
        "relay listening on {addr} (heartbeat timeout {:?}, sweep every {:?}, eviction within {:?})",
        state.config.heartbeat_timeout(),
        state.config.sweep_interval(),
        state.config.max_detection_latency(),
    );
    serve(state, listener).await
}

/// Serve on `listener` until `state.shutdown` is cancelled, then close every
/// connection and join the heartbeat monitor.
pub async fn serve(state: Arc<RelayState>, listener: TcpListener) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let monitor = HeartbeatMonitor::new(
        Arc::clone(&state.registry),
        state.config.sweep_interval(),
        state.config.heartbeat_timeout(),
    )
    .spawn(shutdown.clone());

    let router = build_router(Arc::clone(&state));
    let served =
        axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await;

    shutdown.cancel();
    let remaining = state.registry.drain();
    for (_, conn) in &remaining {
        conn.close(CloseReason::Shutdown);
    }
    if let Err(e) = monitor.await {
        warn!(err = %e, "heartbeat monitor task failed");
    }
    info!(closed = remaining.len(), "relay stopped");

    served?;
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
