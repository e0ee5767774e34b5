// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::identity::IdentityResolver;
use crate::registry::Registry;
use crate::router::InvitationRouter;
use crate::store::PendingInvitationStore;

/// Shared relay state, constructed once and handed to every handler.
pub struct RelayState {
    pub config: RelayConfig,
    pub registry: Arc<Registry>,
    pub resolver: Arc<dyn IdentityResolver>,
    pub router: InvitationRouter,
    pub shutdown: CancellationToken,
}

impl RelayState {
    pub fn new(
        config: RelayConfig,
        resolver: Arc<dyn IdentityResolver>,
        store: Arc<dyn PendingInvitationStore>,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        let router = InvitationRouter::new(Arc::clone(&registry), store);
        Self { config, registry, resolver, router, shutdown }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
