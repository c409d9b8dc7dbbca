// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};

use crate::models::{HealthResponse, ReadyChecks, ReadyResponse, SERVICE_NAME};
use crate::state::AppState;

fn check_label(result: &Result<(), String>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(reason) => reason.clone(),
    }
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 only if the workspace root is writable and the builder's
/// infrastructure answers.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let health = state.compiler.check().await;
    let ready = health.is_ready();

    let response = ReadyResponse {
        status: if ready { "ok" } else { "degraded" }.to_string(),
        service: SERVICE_NAME.to_string(),
        checks: ReadyChecks {
            builder_kind: state.compiler.builder_kind().to_string(),
            builder: check_label(&health.builder),
            workspace_root: check_label(&health.workspace_root),
        },
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
