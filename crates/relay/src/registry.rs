// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Presence registry: who is online, on which connection, and when they were
//! last heard from.
//!
//! One mutex guards the whole map so every operation sees a consistent view
//! of a user's slot. The lock is synchronous and never held across an await;
//! closing connections and writing frames happen after it is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::connection::Connection;
use crate::protocol::UserId;

/// A user's live connection and liveness timestamp.
struct RegistryEntry {
    connection: Arc<Connection>,
    last_heartbeat: Instant,
}

#[derive(Default)]
pub struct Registry {
    entries: Mutex<HashMap<UserId, RegistryEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `user`.
    ///
    /// Returns the displaced connection, if any. The caller must close it.
    pub fn register(&self, user: UserId, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let entry = RegistryEntry { connection, last_heartbeat: Instant::now() };
        self.entries.lock().insert(user, entry).map(|prev| prev.connection)
    }

    /// Refresh `user`'s heartbeat. No-op when the user is not registered.
    pub fn touch(&self, user: UserId) {
        if let Some(entry) = self.entries.lock().get_mut(&user) {
            entry.last_heartbeat = Instant::now();
        }
    }

    pub fn lookup(&self, user: UserId) -> Option<Arc<Connection>> {
        self.entries.lock().get(&user).map(|e| Arc::clone(&e.connection))
    }

    /// Remove `user`'s entry only if it still points at `connection`.
    ///
    /// A stale handler tearing down after its session was replaced leaves the
    /// newer entry alone. Returns whether an entry was removed.
    pub fn remove(&self, user: UserId, connection: &Connection) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&user) {
            Some(entry) if entry.connection.id() == connection.id() => {
                entries.remove(&user);
                true
            }
            _ => false,
        }
    }

    /// Remove every entry silent for longer than `threshold` as of `now`.
    ///
    /// Returned connections are no longer reachable through the registry but
    /// are still open; the caller closes them.
    pub fn evict_stale(&self, now: Instant, threshold: Duration) -> Vec<(UserId, Arc<Connection>)> {
        let mut evicted = Vec::new();
        self.entries.lock().retain(|user, entry| {
            if now.saturating_duration_since(entry.last_heartbeat) > threshold {
                evicted.push((*user, Arc::clone(&entry.connection)));
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Remove every entry, e.g. at shutdown.
    pub fn drain(&self) -> Vec<(UserId, Arc<Connection>)> {
        self.entries.lock().drain().map(|(user, e)| (user, e.connection)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot of currently registered users, sorted.
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.entries.lock().keys().copied().collect();
        users.sort_unstable();
        users
    }

    /// Time since `user` was last heard from.
    pub fn idle_for(&self, user: UserId) -> Option<Duration> {
        self.entries.lock().get(&user).map(|e| e.last_heartbeat.elapsed())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
