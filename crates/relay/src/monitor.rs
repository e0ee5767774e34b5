// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background sweep that evicts connections whose heartbeats stopped.
//!
//! This is the only path that notices a peer which vanished without closing
//! its socket. A dead peer is detected at most `timeout + interval` after its
//! last frame.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::CloseReason;
use crate::registry::Registry;

pub struct HeartbeatMonitor {
    registry: Arc<Registry>,
    interval: Duration,
    timeout: Duration,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<Registry>, interval: Duration, timeout: Duration) -> Self {
        Self { registry, interval, timeout }
    }

    /// Run one sweep as of `now`. Returns how many connections were evicted.
    ///
    /// Entries are unlinked under the registry lock and closed after it is
    /// released. A handler racing us on its own teardown finds its entry gone
    /// and its close already done, both of which are no-ops.
    pub fn sweep(&self, now: Instant) -> usize {
        let evicted = self.registry.evict_stale(now, self.timeout);
        for (user_id, conn) in &evicted {
            if conn.close(CloseReason::Evicted) {
                info!(user_id, conn_id = conn.id(), "heartbeat timeout, connection evicted");
            }
        }
        evicted.len()
    }

    /// Spawn the sweep loop. It exits when `shutdown` is cancelled; await the
    /// returned handle to join it.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately; nothing can be stale yet.
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }

                let evicted = self.sweep(Instant::now());
                if evicted > 0 {
                    debug!(evicted, online = self.registry.len(), "heartbeat sweep");
                }
            }
            debug!("heartbeat monitor stopped");
        })
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
