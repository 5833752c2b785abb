// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Backup configuration actions.

use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use super::wallet::ActionResponse;
use crate::backup::reconcile::{self, BackupTargetsInput, BackupTargetsView, ReconcileError};
use crate::error::ApiError;
use crate::state::AppState;

fn map_reconcile_error(e: ReconcileError) -> ApiError {
    match e {
        ReconcileError::Validation(_) | ReconcileError::Credential(_) => {
            ApiError::unprocessable(e.to_string())
        }
        ReconcileError::TokenExchange(_) => ApiError::unprocessable(e.to_string()),
        ReconcileError::Store(_) => ApiError::internal(e.to_string()),
    }
}

#[utoipa::path(
    get,
    path = "/v1/actions/backup-targets",
    tag = "Backup",
    responses((status = 200, body = BackupTargetsView))
)]
pub async fn read_backup_targets(
    State(state): State<AppState>,
) -> Result<Json<BackupTargetsView>, ApiError> {
    let doc = state
        .backup
        .read_or_init()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(
        reconcile::current_view(&doc).map_err(map_reconcile_error)?,
    ))
}

#[utoipa::path(
    post,
    path = "/v1/actions/backup-targets",
    request_body = BackupTargetsInput,
    tag = "Backup",
    responses((status = 200, body = BackupTargetsView))
)]
pub async fn write_backup_targets(
    State(state): State<AppState>,
    Json(input): Json<BackupTargetsInput>,
) -> Result<Json<BackupTargetsView>, ApiError> {
    let current = state
        .backup
        .read_or_init()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let reconciled = reconcile::reconcile(
        &current,
        &input,
        state.exchanger.as_ref(),
        &state.settings.socks_proxy,
    )
    .await
    .map_err(map_reconcile_error)?;

    let persisted = state
        .backup
        .merge(|d| *d = reconciled.clone())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(
        reconcile::current_view(&persisted).map_err(map_reconcile_error)?,
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ToggleProviderRequest {
    /// The remote identifier (`provider:path`) or `email`.
    pub provider: String,
}

#[utoipa::path(
    post,
    path = "/v1/actions/toggle-backup-provider",
    request_body = ToggleProviderRequest,
    tag = "Backup",
    responses((status = 200, body = ActionResponse))
)]
pub async fn toggle_backup_provider(
    State(state): State<AppState>,
    Json(request): Json<ToggleProviderRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let provider = request.provider.trim().to_string();
    if provider.is_empty() {
        return Err(ApiError::bad_request("Provider is required."));
    }

    let doc = state
        .backup
        .read_or_init()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let now_enabled;
    if provider == "email" {
        if doc.email.is_none() {
            return Err(ApiError::not_found("Email backup is not configured."));
        }
        now_enabled = !doc.email_enabled;
        state
            .backup
            .merge(|d| d.email_enabled = now_enabled)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
    } else if doc.enabled_remotes.contains(&provider) {
        now_enabled = false;
        state
            .backup
            .merge(|d| d.enabled_remotes.retain(|r| *r != provider))
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
    } else if doc.selected_remotes.contains(&provider) {
        now_enabled = true;
        let provider_in = provider.clone();
        state
            .backup
            .merge(move |d| d.enabled_remotes.push(provider_in))
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
    } else {
        return Err(ApiError::not_found("Provider not found."));
    }

    Ok(Json(ActionResponse::new(
        "Provider Toggled",
        format!(
            "{provider} is now {}.",
            if now_enabled { "enabled" } else { "disabled" }
        ),
    )))
}

#[utoipa::path(
    post,
    path = "/v1/actions/manual-backup",
    tag = "Backup",
    responses((status = 200, body = ActionResponse))
)]
pub async fn manual_backup(
    State(state): State<AppState>,
) -> Result<Json<ActionResponse>, ApiError> {
    let artifact = state.settings.channel_backup_path();
    state
        .cli
        .export_channel_backup(&artifact)
        .await
        .map_err(|e| ApiError::unprocessable(format!("Export failed: {e}")))?;
    Ok(Json(ActionResponse::new(
        "Manual Backup Triggered",
        "The backup watcher will now sync the refreshed file.",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::reconcile::{Provider, SftpAuthKind, SftpInput};
    use crate::state::testing::{harness_in, state_in};
    use std::sync::atomic::Ordering;

    fn sftp_input() -> BackupTargetsInput {
        BackupTargetsInput {
            providers: vec![Provider::Sftp],
            sftp: SftpInput {
                host: "1.2.3.4".into(),
                user: "bob".into(),
                pass: "secret".into(),
                auth: Some(SftpAuthKind::Password),
                path: "lnd-backups".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn write_persists_reconciled_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());

        let Json(view) = write_backup_targets(State(state.clone()), Json(sftp_input()))
            .await
            .unwrap();

        assert_eq!(view.providers, vec![Provider::Sftp]);
        assert!(view
            .enabled_remotes
            .contains(&"sftp:lnd-backups".to_string()));

        let doc = state.backup.read().unwrap();
        assert!(doc.auto_backup_enabled);
        assert!(doc.rclone_config.is_some());
    }

    #[tokio::test]
    async fn validation_failure_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());

        let bad = BackupTargetsInput {
            providers: vec![Provider::Nextcloud],
            ..Default::default()
        };
        let err = write_backup_targets(State(state.clone()), Json(bad))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNPROCESSABLE_ENTITY);

        let doc = state.backup.read_or_init().await.unwrap();
        assert!(!doc.auto_backup_enabled);
        assert!(doc.rclone_config.is_none());
    }

    #[tokio::test]
    async fn toggle_flips_enabled_membership() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        write_backup_targets(State(state.clone()), Json(sftp_input()))
            .await
            .unwrap();

        toggle_backup_provider(
            State(state.clone()),
            Json(ToggleProviderRequest {
                provider: "sftp:lnd-backups".into(),
            }),
        )
        .await
        .unwrap();
        let doc = state.backup.read().unwrap();
        assert!(doc.enabled_remotes.is_empty());
        assert!(doc
            .selected_remotes
            .contains(&"sftp:lnd-backups".to_string()));

        toggle_backup_provider(
            State(state.clone()),
            Json(ToggleProviderRequest {
                provider: "sftp:lnd-backups".into(),
            }),
        )
        .await
        .unwrap();
        let doc = state.backup.read().unwrap();
        assert!(doc
            .enabled_remotes
            .contains(&"sftp:lnd-backups".to_string()));
    }

    #[tokio::test]
    async fn toggle_unknown_provider_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());

        let err = toggle_backup_provider(
            State(state),
            Json(ToggleProviderRequest {
                provider: "ghost:path".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn manual_backup_invokes_export() {
        let dir = tempfile::tempdir().unwrap();
        let harness = harness_in(dir.path());
        std::fs::create_dir_all(
            harness
                .state
                .settings
                .channel_backup_path()
                .parent()
                .unwrap(),
        )
        .unwrap();

        manual_backup(State(harness.state.clone())).await.unwrap();
        assert_eq!(harness.cli.export_calls.load(Ordering::SeqCst), 1);
    }
}
