// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet/app state document and the wallet lifecycle state machine.
//!
//! The document mirrors what the wrapped daemon cannot remember for us:
//! whether its wallet has been initialized, the (base64) unlock password
//! while auto-unlock is on, a staged password change, and the operator's
//! backup confirmations. The nullable fields form an implicit state
//! machine; [`WalletLifecycle::classify`] makes it explicit and rejects
//! invalid combinations up front instead of at the call sites.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::document::{JsonDocument, StoreResult};

/// Default recovery window (in blocks) used when restoring from seed.
pub const DEFAULT_RECOVERY_WINDOW: u32 = 2500;

/// Persisted wallet/app state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WalletDoc {
    /// Set by the backup-restore hook; makes unlock pass a recovery window.
    pub restore: bool,
    /// Mnemonic returned by the daemon at init time, stored verbatim.
    pub aezeed_cipher_seed: Option<Vec<String>>,
    /// Current unlock password, base64-encoded. None when auto-unlock is off.
    pub wallet_password: Option<String>,
    pub recovery_window: u32,
    pub reset_wallet_transactions: bool,
    pub watchtowers: Vec<String>,
    pub wallet_initialized: bool,
    /// Staged new password (base64). While set, `wallet_password` still
    /// holds the pre-change password.
    pub pending_password_change: Option<String>,
    pub password_change_error: Option<String>,
    pub auto_unlock_enabled: bool,
    pub seed_backup_confirmed: bool,
    pub password_backup_confirmed: bool,
}

impl Default for WalletDoc {
    fn default() -> Self {
        Self {
            restore: false,
            aezeed_cipher_seed: None,
            wallet_password: None,
            recovery_window: DEFAULT_RECOVERY_WINDOW,
            reset_wallet_transactions: false,
            watchtowers: Vec::new(),
            wallet_initialized: false,
            pending_password_change: None,
            password_change_error: None,
            auto_unlock_enabled: false,
            seed_backup_confirmed: false,
            password_backup_confirmed: false,
        }
    }
}

impl WalletDoc {
    /// Recovery window to pass to unlock, or None when not restoring.
    pub fn unlock_recovery_window(&self) -> Option<u32> {
        self.restore.then_some(self.recovery_window)
    }
}

/// Invalid field combinations rejected at classification time.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WalletStateError {
    #[error("cannot change password: no current password available")]
    PendingChangeWithoutCurrent,

    #[error("auto-unlock is enabled but no wallet password is stored")]
    AutoUnlockWithoutPassword,
}

/// The wallet lifecycle, derived from the persisted document.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletLifecycle {
    /// Fresh install; first-time initialization must run.
    Uninitialized,
    /// A password change is staged and must be reconciled before start.
    PasswordChangePending {
        /// Current (pre-change) password, base64.
        current: String,
        /// Staged new password, base64.
        pending: String,
    },
    /// Initialized, auto-unlock on: unlock with the stored password.
    AutoUnlock {
        /// Unlock password, base64.
        password: String,
        recovery_window: Option<u32>,
    },
    /// Initialized, auto-unlock off: the operator unlocks manually.
    ManualUnlock,
}

impl WalletLifecycle {
    pub fn classify(doc: &WalletDoc) -> Result<Self, WalletStateError> {
        if !doc.wallet_initialized {
            return Ok(Self::Uninitialized);
        }

        if let Some(pending) = &doc.pending_password_change {
            let current = doc
                .wallet_password
                .clone()
                .ok_or(WalletStateError::PendingChangeWithoutCurrent)?;
            return Ok(Self::PasswordChangePending {
                current,
                pending: pending.clone(),
            });
        }

        if doc.auto_unlock_enabled {
            let password = doc
                .wallet_password
                .clone()
                .ok_or(WalletStateError::AutoUnlockWithoutPassword)?;
            return Ok(Self::AutoUnlock {
                password,
                recovery_window: doc.unlock_recovery_window(),
            });
        }

        Ok(Self::ManualUnlock)
    }
}

/// Typed handle over the wallet state document.
#[derive(Debug)]
pub struct WalletStore {
    doc: JsonDocument<WalletDoc>,
}

impl WalletStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            doc: JsonDocument::new(path),
        }
    }

    pub fn read(&self) -> StoreResult<WalletDoc> {
        self.doc.read()
    }

    pub async fn read_or_init(&self) -> StoreResult<WalletDoc> {
        self.doc.read_or_init().await
    }

    pub async fn merge<F>(&self, patch: F) -> StoreResult<WalletDoc>
    where
        F: FnOnce(&mut WalletDoc),
    {
        self.doc.merge(patch).await
    }
}
