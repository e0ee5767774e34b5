// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending invitation storage for invitees that are offline.
//!
//! The relay only ever enqueues. When and how stored invitations are handed
//! back to a reconnecting user belongs to the store's owner.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::StoreError;
use crate::protocol::{Invitation, UserId};
use crate::state::epoch_ms;

/// An invitation held for later delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInvitation {
    pub id: String,
    #[serde(flatten)]
    pub invitation: Invitation,
    /// Epoch millis at enqueue time.
    pub enqueued_at: u64,
}

impl PendingInvitation {
    pub fn new(invitation: Invitation) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), invitation, enqueued_at: epoch_ms() }
    }
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Durable home for invitations addressed to offline users.
///
/// Object-safe for use as `Arc<dyn PendingInvitationStore>`.
pub trait PendingInvitationStore: Send + Sync {
    fn enqueue(&self, invitation: Invitation) -> StoreFuture<'_, ()>;

    /// Invitations currently held for `invitee`, oldest first.
    fn pending_for(&self, invitee: UserId) -> StoreFuture<'_, Vec<PendingInvitation>>;
}

/// In-process store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<Vec<PendingInvitation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl PendingInvitationStore for MemoryStore {
    fn enqueue(&self, invitation: Invitation) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.items.lock().push(PendingInvitation::new(invitation));
            Ok(())
        })
    }

    fn pending_for(&self, invitee: UserId) -> StoreFuture<'_, Vec<PendingInvitation>> {
        Box::pin(async move {
            Ok(self
                .items
                .lock()
                .iter()
                .filter(|p| p.invitation.invitee_id == invitee)
                .cloned()
                .collect())
        })
    }
}

/// Append-only JSON-lines file, one [`PendingInvitation`] per line.
pub struct JsonlStore {
    path: PathBuf,
    // Serializes appends so lines from concurrent enqueues never interleave.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlStore {
    /// Open (creating if needed) the store file at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { path: path.to_owned(), write_lock: tokio::sync::Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PendingInvitationStore for JsonlStore {
    fn enqueue(&self, invitation: Invitation) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut line = serde_json::to_string(&PendingInvitation::new(invitation))?;
            line.push('\n');

            let _guard = self.write_lock.lock().await;
            let mut file =
                tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            Ok(())
        })
    }

    fn pending_for(&self, invitee: UserId) -> StoreFuture<'_, Vec<PendingInvitation>> {
        Box::pin(async move {
            // Appends are not atomic; never observe a half-written line.
            let contents = {
                let _guard = self.write_lock.lock().await;
                tokio::fs::read_to_string(&self.path).await?
            };
            let mut out = Vec::new();
            for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                let item: PendingInvitation = serde_json::from_str(line)?;
                if item.invitation.invitee_id == invitee {
                    out.push(item);
                }
            }
            Ok(out)
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
