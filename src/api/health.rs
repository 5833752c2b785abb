// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::health as probes;
use crate::lifecycle::unit::{HealthResult, HealthStatus, UnitState};
use crate::state::AppState;
use crate::wallet::PendingTask;

/// Health check response with individual probe results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthReport {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
    /// Unit states of the current service-start attempt.
    pub units: Vec<UnitReport>,
    /// Tasks waiting on the operator.
    pub tasks: Vec<PendingTask>,
    /// Sticky advisory notices.
    pub notices: Vec<PendingTask>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    pub wallet_status: HealthResult,
    pub sync_progress: HealthResult,
    pub backup_status: HealthResult,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnitReport {
    pub name: String,
    #[serde(flatten)]
    pub state: UnitState,
}

/// Health endpoint handler.
///
/// Returns 200 while healthy, 503 when any probe reports failure or an
/// advisory notice is pending.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, body = HealthReport),
        (status = 503, body = HealthReport)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let wallet_status = probes::wallet_status(&state.wallet, state.cli.as_ref()).await;
    let sync_progress = probes::sync_progress(state.cli.as_ref()).await;
    let backup_status = match state.backup.read() {
        Ok(doc) => probes::backup_status(&doc),
        Err(_) => HealthResult::loading("Backup config not available yet"),
    };

    let notices = state.notices.list();
    let degraded = wallet_status.status == HealthStatus::Failure
        || sync_progress.status == HealthStatus::Failure
        || !notices.is_empty();

    let units = state
        .units
        .read()
        .expect("status board lock")
        .snapshot()
        .into_iter()
        .map(|(name, unit_state)| UnitReport {
            name,
            state: unit_state,
        })
        .collect();

    let report = HealthReport {
        status: if degraded { "degraded" } else { "ok" }.to_string(),
        checks: HealthChecks {
            wallet_status,
            sync_progress,
            backup_status,
        },
        units,
        tasks: state.tasks.list(),
        notices,
    };

    let code = if degraded {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report))
}

#[utoipa::path(
    get,
    path = "/v1/tasks",
    tag = "Health",
    responses((status = 200, body = [PendingTask]))
)]
pub async fn list_tasks(State(state): State<AppState>) -> Json<Vec<PendingTask>> {
    Json(state.tasks.list())
}
