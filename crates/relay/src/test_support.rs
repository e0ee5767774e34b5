// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders, stubs, and assertion helpers.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::error::{AuthError, StoreError};
use crate::identity::IdentityResolver;
use crate::protocol::{Invitation, UserId};
use crate::state::RelayState;
use crate::store::{MemoryStore, PendingInvitation, PendingInvitationStore, StoreFuture};

/// Config with short timings suitable for tests.
pub fn test_config() -> RelayConfig {
    RelayConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        token_secret: "test-secret".to_owned(),
        users: PathBuf::from("users.json"),
        pending_store: None,
        heartbeat_timeout_ms: 15_000,
        sweep_interval_ms: 5_000,
        auth_timeout_ms: 2_000,
        outbound_buffer: 16,
        enforce_inviter: true,
        log_level: "debug".to_owned(),
        log_format: "text".to_owned(),
    }
}

/// Resolver backed by a fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    tokens: HashMap<String, UserId>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }
}

impl IdentityResolver for StaticResolver {
    fn validate<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UserId, AuthError>> + Send + 'a>> {
        Box::pin(async move {
            self.tokens.get(token).copied().ok_or_else(|| AuthError::UnknownUser(token.to_owned()))
        })
    }
}

/// Store whose writes always fail.
pub struct FailingStore;

impl PendingInvitationStore for FailingStore {
    fn enqueue(&self, _invitation: Invitation) -> StoreFuture<'_, ()> {
        Box::pin(async { Err(StoreError::new("store unavailable")) })
    }

    fn pending_for(&self, _invitee: UserId) -> StoreFuture<'_, Vec<PendingInvitation>> {
        Box::pin(async { Ok(vec![]) })
    }
}

/// Builder for constructing `RelayState` in tests with sensible defaults.
pub struct StateBuilder {
    config: RelayConfig,
    resolver: StaticResolver,
    store: Option<Arc<dyn PendingInvitationStore>>,
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBuilder {
    pub fn new() -> Self {
        Self { config: test_config(), resolver: StaticResolver::new(), store: None }
    }

    /// Accept `token` as `user_id`.
    pub fn user(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.resolver = self.resolver.token(token, user_id);
        self
    }

    pub fn store(mut self, store: Arc<dyn PendingInvitationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn heartbeat(mut self, timeout: Duration, interval: Duration) -> Self {
        self.config.heartbeat_timeout_ms = timeout.as_millis() as u64;
        self.config.sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.config.auth_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn outbound_buffer(mut self, n: usize) -> Self {
        self.config.outbound_buffer = n;
        self
    }

    pub fn enforce_inviter(mut self, on: bool) -> Self {
        self.config.enforce_inviter = on;
        self
    }

    pub fn build(self) -> Arc<RelayState> {
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        Arc::new(RelayState::new(
            self.config,
            Arc::new(self.resolver),
            store,
            CancellationToken::new(),
        ))
    }
}

/// Extension trait to convert `Result<T, E: Display>` into `anyhow::Result<T>`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// Spawn the full relay (router + heartbeat monitor) on a random port.
///
/// Cancel `state.shutdown` to stop it; the join handle resolves once every
/// connection is closed and the monitor has exited.
pub async fn spawn_relay_server(
    state: Arc<RelayState>,
) -> anyhow::Result<(std::net::SocketAddr, tokio::task::JoinHandle<anyhow::Result<()>>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(crate::serve(state, listener));
    Ok((addr, handle))
}
