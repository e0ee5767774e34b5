// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the relay's connection lifecycle.
///
/// None of these are retried by the relay. Recovery happens through the
/// heartbeat monitor or the next failed read on the affected connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayError {
    /// Transport upgrade failed; no connection was created.
    HandshakeFailed,
    /// Missing, malformed, or rejected authenticate frame.
    AuthenticationFailed,
    /// Peer reset or transport error after authentication.
    ReadError,
    /// Frame that cannot be decoded at all (non-JSON text, binary).
    ProtocolError,
    /// Writing an invitation to a peer connection failed.
    DeliveryFailure,
    /// Persisting a pending invitation failed.
    StoreError,
}

impl RelayError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HandshakeFailed => "HANDSHAKE_FAILED",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::ReadError => "READ_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::DeliveryFailure => "DELIVERY_FAILURE",
            Self::StoreError => "STORE_ERROR",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for RelayError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Why the identity resolver refused a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Not a three-part token, or a part failed to decode.
    Malformed(String),
    /// Header names an algorithm other than HS256.
    UnsupportedAlgorithm(String),
    BadSignature,
    Expired,
    /// Token is valid but names no known user.
    UnknownUser(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(why) => write!(f, "malformed token: {why}"),
            Self::UnsupportedAlgorithm(alg) => write!(f, "unsupported signing algorithm: {alg}"),
            Self::BadSignature => f.write_str("token signature mismatch"),
            Self::Expired => f.write_str("token expired"),
            Self::UnknownUser(name) => write!(f, "user not found: {name}"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Failure to persist a pending invitation.
#[derive(Debug)]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pending store: {}", self.message)
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(e.to_string())
    }
}
