// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Action/Task surface.
//!
//! Each config-editing action is a `read`/`write` handler pair over the
//! Config Store, with precondition gating in the handler and, for the two
//! restart-triggering writes, rollback on restart failure.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

pub mod backup;
pub mod health;
pub mod node;
pub mod wallet;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::list_tasks,
        wallet::read_wallet_password,
        wallet::write_wallet_password,
        wallet::manual_unlock,
        wallet::read_auto_unlock,
        wallet::write_auto_unlock,
        wallet::confirm_password_backup,
        wallet::delete_wallet_password,
        wallet::cipher_seed,
        backup::read_backup_targets,
        backup::write_backup_targets,
        backup::toggle_backup_provider,
        backup::manual_backup,
        node::node_info,
        node::tower_info,
        node::reset_transactions,
    ),
    components(schemas(
        wallet::ActionResponse,
        wallet::WalletPasswordState,
        wallet::WalletPasswordRequest,
        wallet::ManualUnlockRequest,
        wallet::AutoUnlockState,
        wallet::AutoUnlockRequest,
        wallet::ConfirmPasswordBackupRequest,
        wallet::CipherSeedResponse,
        backup::ToggleProviderRequest,
        node::NodeInfoResponse,
        node::TowerInfoResponse,
        health::HealthReport,
        health::HealthChecks,
        health::UnitReport,
        crate::backup::reconcile::BackupTargetsInput,
        crate::backup::reconcile::BackupTargetsView,
        crate::lifecycle::unit::HealthResult,
        crate::lifecycle::unit::HealthStatus,
        crate::lifecycle::unit::UnitState,
        crate::wallet::PendingTask,
    ))
)]
struct ApiDoc;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/v1/tasks", get(health::list_tasks))
        .route(
            "/v1/actions/wallet-password",
            get(wallet::read_wallet_password).post(wallet::write_wallet_password),
        )
        .route("/v1/actions/manual-unlock", post(wallet::manual_unlock))
        .route(
            "/v1/actions/auto-unlock",
            get(wallet::read_auto_unlock).post(wallet::write_auto_unlock),
        )
        .route(
            "/v1/actions/confirm-password-backup",
            post(wallet::confirm_password_backup),
        )
        .route(
            "/v1/actions/delete-wallet-password",
            post(wallet::delete_wallet_password),
        )
        .route("/v1/actions/cipher-seed", get(wallet::cipher_seed))
        .route(
            "/v1/actions/reset-transactions",
            post(node::reset_transactions),
        )
        .route("/v1/actions/node-info", get(node::node_info))
        .route("/v1/actions/tower-info", get(node::tower_info))
        .route(
            "/v1/actions/backup-targets",
            get(backup::read_backup_targets).post(backup::write_backup_targets),
        )
        .route(
            "/v1/actions/toggle-backup-provider",
            post(backup::toggle_backup_provider),
        )
        .route("/v1/actions/manual-backup", post(backup::manual_backup))
        .with_state(state);

    routes
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::state_in;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn router_serves_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_in(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // Uninitialized wallet: loading, not degraded.
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_in(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/actions/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
