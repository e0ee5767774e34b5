// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `relay` binary and exercise
//! the health route and the WebSocket invitation flow.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use relay_specs::{token_for, RelayProcess};

const TIMEOUT: Duration = Duration::from_secs(10);

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn login(relay: &RelayProcess, token: &str) -> anyhow::Result<Ws> {
    let (mut ws, _) = tokio_tungstenite::connect_async(relay.ws_url()).await?;
    let auth = serde_json::json!({ "type": "authenticate", "token": token });
    ws.send(Message::Text(auth.to_string().into())).await?;
    Ok(ws)
}

async fn next_message(ws: &mut Ws) -> anyhow::Result<Message> {
    Ok(tokio::time::timeout(TIMEOUT, ws.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("ws stream ended"))??)
}

async fn close_code(ws: &mut Ws) -> anyhow::Result<u16> {
    match next_message(ws).await? {
        Message::Close(Some(frame)) => Ok(u16::from(frame.code)),
        other => anyhow::bail!("expected close frame, got: {other:?}"),
    }
}

// -- HTTP ---------------------------------------------------------------------

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let relay = RelayProcess::start()?;
    relay.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value =
        reqwest::get(format!("{}/api/v1/health", relay.base_url())).await?.json().await?;

    assert_eq!(resp["status"], "running");
    assert_eq!(resp["online"], 0);
    Ok(())
}

#[tokio::test]
async fn invalid_config_exits_with_code_2() -> anyhow::Result<()> {
    let mut relay = RelayProcess::build().heartbeat_ms(1_000, 5_000).spawn()?;
    let status = relay.wait_exit(TIMEOUT).await?;
    assert_eq!(status.code(), Some(2));
    Ok(())
}

#[tokio::test]
async fn unreadable_user_directory_exits_with_code_1() -> anyhow::Result<()> {
    let mut relay = RelayProcess::build().users_path("/nonexistent/users.json").spawn()?;
    let status = relay.wait_exit(TIMEOUT).await?;
    assert_eq!(status.code(), Some(1));
    Ok(())
}

// -- WebSocket ----------------------------------------------------------------

#[tokio::test]
async fn ws_invitation_roundtrip() -> anyhow::Result<()> {
    let relay = RelayProcess::start()?;
    relay.wait_healthy(TIMEOUT).await?;

    let mut alice = login(&relay, &token_for("alice")?).await?;
    let mut bob = login(&relay, &token_for("bob")?).await?;
    relay.wait_online(2, TIMEOUT).await?;

    let invite = serde_json::json!({
        "inviter_id": 1,
        "invitee_id": 2,
        "group_id": 5,
        "message": "smoke-invite",
    });
    alice.send(Message::Text(invite.to_string().into())).await?;

    let text = match next_message(&mut bob).await? {
        Message::Text(t) => t.to_string(),
        other => anyhow::bail!("expected text ws message, got: {other:?}"),
    };
    let parsed: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(parsed, invite);
    Ok(())
}

#[tokio::test]
async fn ws_rejects_unknown_user() -> anyhow::Result<()> {
    let relay = RelayProcess::start()?;
    relay.wait_healthy(TIMEOUT).await?;

    let mut ws = login(&relay, &token_for("mallory")?).await?;
    assert_eq!(close_code(&mut ws).await?, 4001);
    Ok(())
}

#[tokio::test]
async fn ws_silent_client_is_evicted() -> anyhow::Result<()> {
    let relay = RelayProcess::build().heartbeat_ms(1_000, 200).spawn()?;
    relay.wait_healthy(TIMEOUT).await?;

    let mut alice = login(&relay, &token_for("alice")?).await?;
    relay.wait_online(1, TIMEOUT).await?;

    assert_eq!(close_code(&mut alice).await?, 4008);
    relay.wait_online(0, TIMEOUT).await?;
    Ok(())
}

#[tokio::test]
async fn offline_invitation_is_persisted() -> anyhow::Result<()> {
    let relay = RelayProcess::build().persist().spawn()?;
    relay.wait_healthy(TIMEOUT).await?;

    let mut alice = login(&relay, &token_for("alice")?).await?;
    relay.wait_online(1, TIMEOUT).await?;

    let invite = serde_json::json!({
        "inviter_id": 1,
        "invitee_id": 2,
        "group_id": 8,
        "message": "persisted",
    });
    alice.send(Message::Text(invite.to_string().into())).await?;

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("pending store never received the invitation");
        }
        if let Ok(contents) = std::fs::read_to_string(relay.pending_path()) {
            if let Some(line) = contents.lines().next() {
                let record: serde_json::Value = serde_json::from_str(line)?;
                assert_eq!(record["invitee_id"], 2);
                assert_eq!(record["message"], "persisted");
                assert!(record["id"].is_string());
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
