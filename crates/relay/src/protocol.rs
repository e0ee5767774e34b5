// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire frames for the relay WebSocket.
//!
//! Control frames are internally tagged (`{"type": "heartbeat"}`). Invitation
//! frames predate the envelope and arrive as a bare object, so they are also
//! accepted untagged. Every inbound text frame is decoded exactly once into
//! [`InboundFrame`] and matched exhaustively by the handler.

use serde::{Deserialize, Serialize};

/// Stable identity of an authenticated user.
pub type UserId = i64;

/// A point-to-point request for `invitee_id` to join `group_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub inviter_id: UserId,
    pub invitee_id: UserId,
    pub group_id: i64,
    pub message: String,
}

/// A decoded client-to-server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Authenticate { token: String },
    Heartbeat,
    Invitation(Invitation),
    /// Valid JSON that matches no known shape. Carries the `type` tag, if any.
    Unknown(Option<String>),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedFrame {
    Authenticate { token: String },
    Heartbeat {},
    Invitation(Invitation),
}

impl From<TaggedFrame> for InboundFrame {
    fn from(frame: TaggedFrame) -> Self {
        match frame {
            TaggedFrame::Authenticate { token } => Self::Authenticate { token },
            TaggedFrame::Heartbeat {} => Self::Heartbeat,
            TaggedFrame::Invitation(inv) => Self::Invitation(inv),
        }
    }
}

impl InboundFrame {
    /// Decode a text frame. Fails only when the text is not JSON at all.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        let Some(tag) = value.get("type") else {
            return Ok(match serde_json::from_value::<Invitation>(value) {
                Ok(inv) => Self::Invitation(inv),
                Err(_) => Self::Unknown(None),
            });
        };

        let tag = tag.as_str().map(str::to_owned);
        Ok(match serde_json::from_value::<TaggedFrame>(value) {
            Ok(frame) => frame.into(),
            Err(_) => Self::Unknown(tag),
        })
    }

    /// Short label for logs.
    pub fn kind(&self) -> &str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::Heartbeat => "heartbeat",
            Self::Invitation(_) => "invitation",
            Self::Unknown(Some(tag)) => tag,
            Self::Unknown(None) => "unknown",
        }
    }
}

/// Encode an invitation as the outbound delivery payload.
pub fn encode_invitation(invitation: &Invitation) -> Result<String, serde_json::Error> {
    serde_json::to_string(invitation)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
