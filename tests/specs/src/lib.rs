// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `relay` binary as a subprocess with a throwaway user
//! directory and exercises it over HTTP and WebSocket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

static CRYPTO_INIT: Once = Once::new();

/// Shared HMAC secret passed to every spawned relay.
pub const SECRET: &str = "spec-secret";

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `relay` binary.
pub fn relay_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("relay")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Mint a token the spawned relay will accept for `username`.
pub fn token_for(username: &str) -> anyhow::Result<String> {
    relay::identity::encode_token(SECRET.as_bytes(), username, None)
}

/// A running `relay` process that is killed on drop.
pub struct RelayProcess {
    child: Child,
    port: u16,
    dir: tempfile::TempDir,
}

/// Builder for the flags a [`RelayProcess`] is started with.
pub struct RelayBuilder {
    users: Vec<(i64, String)>,
    heartbeat_timeout_ms: u64,
    sweep_interval_ms: u64,
    users_path: Option<PathBuf>,
    persist: bool,
    extra: Vec<String>,
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self {
            users: vec![(1, "alice".to_owned()), (2, "bob".to_owned())],
            heartbeat_timeout_ms: 15_000,
            sweep_interval_ms: 5_000,
            users_path: None,
            persist: false,
            extra: Vec::new(),
        }
    }
}

impl RelayBuilder {
    /// Add a user to the directory file.
    pub fn user(mut self, id: i64, username: &str) -> Self {
        self.users.push((id, username.to_owned()));
        self
    }

    /// Use short heartbeat timings.
    pub fn heartbeat_ms(mut self, timeout: u64, interval: u64) -> Self {
        self.heartbeat_timeout_ms = timeout;
        self.sweep_interval_ms = interval;
        self
    }

    /// Point `--users` at `path` instead of a generated directory file.
    pub fn users_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.users_path = Some(path.into());
        self
    }

    /// Persist pending invitations to `pending.jsonl` in the scratch dir.
    pub fn persist(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Append raw command-line arguments.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra.push(arg.into());
        self
    }

    pub fn spawn(self) -> anyhow::Result<RelayProcess> {
        ensure_crypto();
        let binary = relay_binary();
        anyhow::ensure!(binary.exists(), "relay binary not found at {}", binary.display());

        let dir = tempfile::tempdir()?;
        let users_path =
            self.users_path.clone().unwrap_or_else(|| dir.path().join("users.json"));
        let users: Vec<serde_json::Value> = self
            .users
            .iter()
            .map(|(id, name)| serde_json::json!({ "id": id, "username": name }))
            .collect();
        if self.users_path.is_none() {
            let file = serde_json::json!({ "users": users });
            std::fs::write(&users_path, serde_json::to_vec(&file)?)?;
        }

        let port = free_port()?;
        let mut args: Vec<String> = vec![
            "--host".into(),
            "127.0.0.1".into(),
            "--port".into(),
            port.to_string(),
            "--users".into(),
            users_path.to_string_lossy().into_owned(),
            "--heartbeat-timeout-ms".into(),
            self.heartbeat_timeout_ms.to_string(),
            "--sweep-interval-ms".into(),
            self.sweep_interval_ms.to_string(),
            "--log-format".into(),
            "text".into(),
            "--log-level".into(),
            "warn".into(),
        ];
        if self.persist {
            args.extend([
                "--pending-store".into(),
                dir.path().join("pending.jsonl").to_string_lossy().into_owned(),
            ]);
        }
        args.extend(self.extra);

        let child = Command::new(&binary)
            .args(&args)
            .env("RELAY_TOKEN_SECRET", SECRET)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(RelayProcess { child, port, dir })
    }
}

impl RelayProcess {
    /// Create a builder for custom configuration.
    pub fn build() -> RelayBuilder {
        RelayBuilder::default()
    }

    /// Spawn the relay with default users alice (1) and bob (2).
    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// WebSocket URL.
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    /// Path of the JSON-lines pending store (only written with `persist()`).
    pub fn pending_path(&self) -> PathBuf {
        self.dir.path().join("pending.jsonl")
    }

    /// Poll health until responsive.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("relay did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Poll health until `online` reaches `count`.
    pub async fn wait_online(&self, count: u64, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("relay never reported {count} online users within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                let body: serde_json::Value = resp.json().await?;
                if body["online"].as_u64() == Some(count) {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Wait for the process to exit within `timeout`.
    pub async fn wait_exit(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("relay did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for RelayProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
