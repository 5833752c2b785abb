// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet security actions.
//!
//! The password-rotation and auto-unlock writes restart the service as a
//! side effect; when the restart cannot be initiated the just-written
//! state is rolled back so the store never diverges from the running
//! reality.

use axum::{extract::State, Json};
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::state::AppState;
use crate::wallet::MANUAL_UNLOCK_TASK;

const MANUAL_UNLOCK_REASON: &str = "LND wallet is locked and auto-unlock is disabled. \
Use the \"Unlock Wallet\" action to provide your password.";

/// Uniform action result.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub title: String,
    pub message: String,
}

impl ActionResponse {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

fn encode_password(plain: &str) -> String {
    Base64::encode_string(plain.as_bytes())
}

fn decode_password(b64: &str) -> Result<String, ApiError> {
    let bytes = Base64::decode_vec(b64)
        .map_err(|_| ApiError::internal("Stored password is not valid base64"))?;
    String::from_utf8(bytes).map_err(|_| ApiError::internal("Stored password is not valid UTF-8"))
}

// ---------------------------------------------------------------------------
// Wallet password (read / rotate)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletPasswordState {
    pub wallet_initialized: bool,
    pub auto_unlock_enabled: bool,
    pub password_stored: bool,
    pub change_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change_error: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/actions/wallet-password",
    tag = "Security",
    responses((status = 200, body = WalletPasswordState))
)]
pub async fn read_wallet_password(
    State(state): State<AppState>,
) -> Result<Json<WalletPasswordState>, ApiError> {
    let doc = state
        .wallet
        .read_or_init()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(WalletPasswordState {
        wallet_initialized: doc.wallet_initialized,
        auto_unlock_enabled: doc.auto_unlock_enabled,
        password_stored: doc.wallet_password.is_some(),
        change_pending: doc.pending_password_change.is_some(),
        last_change_error: doc.password_change_error,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WalletPasswordRequest {
    #[serde(default)]
    pub current_password: Option<String>,
    pub new_password: String,
    pub confirm_password: String,
}

#[utoipa::path(
    post,
    path = "/v1/actions/wallet-password",
    request_body = WalletPasswordRequest,
    tag = "Security",
    responses((status = 200, body = ActionResponse))
)]
pub async fn write_wallet_password(
    State(state): State<AppState>,
    Json(request): Json<WalletPasswordRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    if request.new_password != request.confirm_password {
        return Err(ApiError::bad_request("New passwords do not match."));
    }
    if request.new_password.len() < 8 {
        return Err(ApiError::bad_request(
            "New password must be at least 8 characters.",
        ));
    }

    let doc = state
        .wallet
        .read_or_init()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let new_b64 = encode_password(&request.new_password);

    // Before initialization there is nothing to rotate; the submitted
    // password becomes the initial one used by the init flow.
    if !doc.wallet_initialized {
        state
            .wallet
            .merge(|d| {
                d.wallet_password = Some(new_b64.clone());
                d.pending_password_change = None;
                d.password_change_error = None;
            })
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        return Ok(Json(ActionResponse::new(
            "Initial Password Set",
            "Initial wallet password has been set.",
        )));
    }

    let current = request
        .current_password
        .as_deref()
        .unwrap_or_default()
        .to_string();
    if current.is_empty() {
        return Err(ApiError::bad_request("Current password is required."));
    }
    let current_b64 = encode_password(&current);
    if doc.auto_unlock_enabled {
        if let Some(stored) = &doc.wallet_password {
            if *stored != current_b64 {
                return Err(ApiError::unprocessable("Current password is incorrect."));
            }
        }
    }

    let was_auto_unlock_disabled = !doc.auto_unlock_enabled;
    let snapshot = doc.clone();

    state
        .wallet
        .merge(|d| {
            d.wallet_password = Some(current_b64.clone());
            d.pending_password_change = Some(new_b64.clone());
            d.auto_unlock_enabled = true;
            d.password_change_error = None;
            d.password_backup_confirmed = false;
        })
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if let Err(e) = state.controller.restart().await {
        state
            .wallet
            .merge(|d| *d = snapshot.clone())
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        return Err(ApiError::internal(format!(
            "Failed to initiate password change: {e}"
        )));
    }

    let mut message =
        "Password change initiated. The service is restarting to apply it.".to_string();
    if was_auto_unlock_disabled {
        message.push_str(
            " Auto-unlock was temporarily enabled; disable it again after confirming \
             the new password works.",
        );
    }
    Ok(Json(ActionResponse::new("Password Change Initiated", message)))
}

// ---------------------------------------------------------------------------
// Manual unlock
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct ManualUnlockRequest {
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/v1/actions/manual-unlock",
    request_body = ManualUnlockRequest,
    tag = "Security",
    responses((status = 200, body = ActionResponse))
)]
pub async fn manual_unlock(
    State(state): State<AppState>,
    Json(request): Json<ManualUnlockRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let doc = state
        .wallet
        .read_or_init()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if !doc.wallet_initialized {
        return Err(ApiError::unprocessable("Wallet not initialized."));
    }
    if doc.auto_unlock_enabled {
        return Err(ApiError::conflict(
            "Auto-unlock is enabled; manual unlock is not available.",
        ));
    }

    let password_b64 = encode_password(&request.password);
    state
        .rpc
        .unlock_wallet(&password_b64, doc.unlock_recovery_window())
        .await
        .map_err(|e| ApiError::unprocessable(format!("Unlock failed: {e}")))?;

    Ok(Json(ActionResponse::new(
        "Wallet Unlocked",
        "Wallet has been successfully unlocked with the provided password.",
    )))
}

// ---------------------------------------------------------------------------
// Auto-unlock toggle
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct AutoUnlockState {
    pub enabled: bool,
    pub password_stored: bool,
}

#[utoipa::path(
    get,
    path = "/v1/actions/auto-unlock",
    tag = "Security",
    responses((status = 200, body = AutoUnlockState))
)]
pub async fn read_auto_unlock(
    State(state): State<AppState>,
) -> Result<Json<AutoUnlockState>, ApiError> {
    let doc = state
        .wallet
        .read_or_init()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(AutoUnlockState {
        enabled: doc.auto_unlock_enabled,
        password_stored: doc.wallet_password.is_some(),
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AutoUnlockRequest {
    pub enabled: bool,
    #[serde(default)]
    pub password: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/actions/auto-unlock",
    request_body = AutoUnlockRequest,
    tag = "Security",
    responses((status = 200, body = ActionResponse))
)]
pub async fn write_auto_unlock(
    State(state): State<AppState>,
    Json(request): Json<AutoUnlockRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let doc = state
        .wallet
        .read_or_init()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if !doc.wallet_initialized {
        return Err(ApiError::unprocessable("Wallet not initialized."));
    }
    let snapshot = doc.clone();

    if !request.enabled {
        // Disabling trades availability for keeping the password off the
        // server; it is only allowed once the operator confirmed a backup.
        if !doc.password_backup_confirmed {
            return Err(ApiError::unprocessable(
                "Password backup must be confirmed before disabling auto-unlock.",
            ));
        }

        state
            .wallet
            .merge(|d| {
                d.auto_unlock_enabled = false;
                d.wallet_password = None;
            })
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        state.tasks.create(MANUAL_UNLOCK_TASK, MANUAL_UNLOCK_REASON);

        if let Err(e) = state.controller.restart().await {
            state
                .wallet
                .merge(|d| *d = snapshot.clone())
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?;
            state.tasks.clear(MANUAL_UNLOCK_TASK);
            return Err(ApiError::internal(format!("Failed to restart service: {e}")));
        }

        return Ok(Json(ActionResponse::new(
            "Auto-Unlock Disabled",
            "The password has been deleted from the server. After every restart, \
             unlock the wallet with the Unlock Wallet action.",
        )));
    }

    let mut password_b64 = doc.wallet_password.clone();
    if let Some(provided) = request.password.as_deref().map(str::trim) {
        if !provided.is_empty() {
            if provided.len() < 8 {
                return Err(ApiError::bad_request(
                    "Password must be at least 8 characters.",
                ));
            }
            password_b64 = Some(encode_password(provided));
        }
    }
    let Some(password_b64) = password_b64 else {
        return Err(ApiError::unprocessable(
            "Cannot enable auto-unlock: no wallet password stored and none provided.",
        ));
    };

    state
        .wallet
        .merge(|d| {
            d.auto_unlock_enabled = true;
            d.wallet_password = Some(password_b64.clone());
        })
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    state.tasks.clear(MANUAL_UNLOCK_TASK);

    if let Err(e) = state.controller.restart().await {
        state
            .wallet
            .merge(|d| *d = snapshot.clone())
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        return Err(ApiError::internal(format!("Failed to restart service: {e}")));
    }

    Ok(Json(ActionResponse::new(
        "Auto-Unlock Enabled",
        "The wallet will unlock automatically on startup using the stored password. \
         The service is restarting to apply changes.",
    )))
}

// ---------------------------------------------------------------------------
// Password backup confirmation / deletion
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmPasswordBackupRequest {
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/v1/actions/confirm-password-backup",
    request_body = ConfirmPasswordBackupRequest,
    tag = "Security",
    responses((status = 200, body = ActionResponse))
)]
pub async fn confirm_password_backup(
    State(state): State<AppState>,
    Json(request): Json<ConfirmPasswordBackupRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let doc = state
        .wallet
        .read_or_init()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let Some(stored) = &doc.wallet_password else {
        return Err(ApiError::unprocessable("Wallet password not set."));
    };
    if doc.password_backup_confirmed {
        return Ok(Json(ActionResponse::new(
            "Password Backup Status",
            "Already confirmed.",
        )));
    }

    if request.password != decode_password(stored)? {
        return Err(ApiError::unprocessable("Password does not match."));
    }

    state
        .wallet
        .merge(|d| d.password_backup_confirmed = true)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(ActionResponse::new(
        "Password Backup Confirmed",
        "You may now disable auto-unlock or delete the stored password.",
    )))
}

#[utoipa::path(
    post,
    path = "/v1/actions/delete-wallet-password",
    tag = "Security",
    responses((status = 200, body = ActionResponse))
)]
pub async fn delete_wallet_password(
    State(state): State<AppState>,
) -> Result<Json<ActionResponse>, ApiError> {
    let doc = state
        .wallet
        .read_or_init()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if !doc.wallet_initialized {
        return Err(ApiError::unprocessable("Wallet not initialized."));
    }
    if doc.wallet_password.is_none() {
        return Err(ApiError::unprocessable("Password already deleted."));
    }
    if !doc.password_backup_confirmed {
        return Err(ApiError::unprocessable(
            "Password backup must be confirmed before deleting the password.",
        ));
    }

    state
        .wallet
        .merge(|d| {
            d.wallet_password = None;
            d.password_backup_confirmed = false;
        })
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(ActionResponse::new(
        "Password Deleted",
        "Wallet password has been deleted from the server.",
    )))
}

// ---------------------------------------------------------------------------
// Cipher seed
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct CipherSeedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<Vec<String>>,
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/v1/actions/cipher-seed",
    tag = "Security",
    responses((status = 200, body = CipherSeedResponse))
)]
pub async fn cipher_seed(
    State(state): State<AppState>,
) -> Result<Json<CipherSeedResponse>, ApiError> {
    let doc = state
        .wallet
        .read_or_init()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(match doc.aezeed_cipher_seed {
        Some(mnemonic) => CipherSeedResponse {
            mnemonic: Some(mnemonic),
            message: "Seed for restoring on-chain funds ONLY. This is not a BIP-39 seed \
                      and cannot be imported into wallets other than LND."
                .to_string(),
        },
        None => CipherSeedResponse {
            mnemonic: None,
            message: "No cipher seed found. Wallets created on earlier versions did not \
                      record the seed; it cannot be recovered after the fact."
                .to_string(),
        },
    }))
}
