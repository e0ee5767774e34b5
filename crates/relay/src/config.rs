// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Presence-aware invitation relay over WebSocket.
#[derive(Debug, Clone, Parser)]
#[command(name = "relay", version, about)]
pub struct RelayConfig {
    /// Host address to bind to.
    #[arg(long, default_value = "127.0.0.1", env = "RELAY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000, env = "RELAY_PORT")]
    pub port: u16,

    /// HMAC secret used to verify client tokens.
    #[arg(long, env = "RELAY_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: String,

    /// JSON file mapping usernames to user IDs.
    #[arg(long, env = "RELAY_USERS")]
    pub users: PathBuf,

    /// Append pending invitations to this JSON-lines file. In-memory if unset.
    #[arg(long, env = "RELAY_PENDING_STORE")]
    pub pending_store: Option<PathBuf>,

    /// Evict a connection after this long without a frame, in milliseconds.
    #[arg(long, default_value_t = 15000, env = "RELAY_HEARTBEAT_TIMEOUT_MS")]
    pub heartbeat_timeout_ms: u64,

    /// Heartbeat sweep interval in milliseconds. Must not exceed the timeout.
    #[arg(long, default_value_t = 5000, env = "RELAY_SWEEP_INTERVAL_MS")]
    pub sweep_interval_ms: u64,

    /// How long a new connection may take to send its authenticate frame.
    #[arg(long, default_value_t = 10000, env = "RELAY_AUTH_TIMEOUT_MS")]
    pub auth_timeout_ms: u64,

    /// Per-connection outbound queue capacity, in frames.
    #[arg(long, default_value_t = 64, env = "RELAY_OUTBOUND_BUFFER")]
    pub outbound_buffer: usize,

    /// Drop invitations whose inviter_id differs from the sender's identity.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "RELAY_ENFORCE_INVITER")]
    pub enforce_inviter: bool,

    /// Log filter (tracing EnvFilter syntax).
    #[arg(long, default_value = "info", env = "RELAY_LOG_LEVEL")]
    pub log_level: String,

    /// Log format: text or json.
    #[arg(long, default_value = "text", env = "RELAY_LOG_FORMAT")]
    pub log_format: String,
}

impl RelayConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token_secret.is_empty() {
            anyhow::bail!("--token-secret must not be empty");
        }
        if self.heartbeat_timeout_ms == 0 {
            anyhow::bail!("--heartbeat-timeout-ms must be positive");
        }
        if self.sweep_interval_ms == 0 {
            anyhow::bail!("--sweep-interval-ms must be positive");
        }
        // A longer interval lets dead peers linger for up to timeout + interval.
        if self.sweep_interval_ms > self.heartbeat_timeout_ms {
            anyhow::bail!(
                "--sweep-interval-ms ({}) must not exceed --heartbeat-timeout-ms ({})",
                self.sweep_interval_ms,
                self.heartbeat_timeout_ms
            );
        }
        if self.auth_timeout_ms == 0 {
            anyhow::bail!("--auth-timeout-ms must be positive");
        }
        if self.outbound_buffer == 0 {
            anyhow::bail!("--outbound-buffer must be positive");
        }
        match self.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    /// Worst-case delay between a peer going silent and its eviction.
    pub fn max_detection_latency(&self) -> Duration {
        self.heartbeat_timeout() + self.sweep_interval()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
