// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deliver-now or store-for-later routing of invitations.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::RelayError;
use crate::protocol::{encode_invitation, Invitation};
use crate::registry::Registry;
use crate::store::PendingInvitationStore;

/// What happened to a routed invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued on the invitee's live connection.
    Delivered,
    /// Invitee was online but the write failed. Not retried, not stored.
    DeliveryFailed,
    /// Invitee offline; handed to the pending store.
    Stored,
    /// Invitee offline and the pending store refused it.
    StoreFailed,
}

pub struct InvitationRouter {
    registry: Arc<Registry>,
    store: Arc<dyn PendingInvitationStore>,
}

impl InvitationRouter {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn PendingInvitationStore>) -> Self {
        Self { registry, store }
    }

    /// Route one invitation. Failures are logged and swallowed.
    pub async fn route(&self, invitation: Invitation) -> RouteOutcome {
        let invitee = invitation.invitee_id;

        // The registry lock is released before anything touches the peer.
        let Some(conn) = self.registry.lookup(invitee) else {
            return match self.store.enqueue(invitation).await {
                Ok(()) => {
                    debug!(invitee, "invitee offline, invitation stored");
                    RouteOutcome::Stored
                }
                Err(e) => {
                    warn!(invitee, code = %RelayError::StoreError, err = %e, "failed to store pending invitation");
                    RouteOutcome::StoreFailed
                }
            };
        };

        let frame = match encode_invitation(&invitation) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(invitee, err = %e, "failed to encode invitation");
                return RouteOutcome::DeliveryFailed;
            }
        };

        match conn.deliver(frame) {
            Ok(()) => {
                debug!(invitee, conn_id = conn.id(), inviter = invitation.inviter_id, "invitation delivered");
                RouteOutcome::Delivered
            }
            Err(e) => {
                warn!(
                    invitee,
                    conn_id = conn.id(),
                    code = %RelayError::DeliveryFailure,
                    err = %e,
                    "invitation delivery failed"
                );
                RouteOutcome::DeliveryFailed
            }
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
