// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::state::RelayState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Users with a live registry entry.
    pub online: usize,
}

/// `GET /api/v1/health`
pub async fn health(State(state): State<Arc<RelayState>>) -> Json<HealthResponse> {
    let status = if state.shutdown.is_cancelled() { "stopping" } else { "running" };
    Json(HealthResponse { status: status.to_owned(), online: state.registry.len() })
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
