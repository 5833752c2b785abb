// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Unlock/Init Unit
//!
//! Oneshot logic over the process supervisor and the wallet REST API:
//! first-time initialization, pending password-change reconciliation, and
//! startup unlock. Each flow is driven by the explicit
//! [`crate::store::WalletLifecycle`] state rather than ad-hoc field checks.

pub mod init;
pub mod password;
pub mod tasks;
pub mod unlock;

pub use init::initialize_wallet;
pub use password::reconcile_pending_password;
pub use tasks::{PendingTask, TaskRegistry};
pub use unlock::unlock_wallet;

use crate::store::WalletDoc;
use tracing::info;

/// Task id surfaced to the operator while manual unlock is required.
pub const MANUAL_UNLOCK_TASK: &str = "manual-wallet-unlock";

const MANUAL_UNLOCK_REASON: &str = "LND wallet is locked and auto-unlock is disabled. \
Use the \"Unlock Wallet\" action to provide your password. If you have enabled \
auto-unlock, you can safely dismiss this task.";

/// Create or clear the manual-unlock task to match the stored state.
///
/// Runs early in every service start, before the daemon graph is built.
pub fn manage_unlock_task(doc: &WalletDoc, tasks: &TaskRegistry) {
    if doc.auto_unlock_enabled {
        if tasks.clear(MANUAL_UNLOCK_TASK) {
            info!("auto-unlock enabled, cleared manual unlock task");
        }
    } else if doc.wallet_initialized {
        tasks.create(MANUAL_UNLOCK_TASK, MANUAL_UNLOCK_REASON);
        info!("auto-unlock disabled, manual unlock task registered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_created_only_when_initialized_and_auto_unlock_off() {
        let tasks = TaskRegistry::default();

        let uninitialized = WalletDoc::default();
        manage_unlock_task(&uninitialized, &tasks);
        assert!(tasks.list().is_empty());

        let locked_manual = WalletDoc {
            wallet_initialized: true,
            auto_unlock_enabled: false,
            ..Default::default()
        };
        manage_unlock_task(&locked_manual, &tasks);
        assert_eq!(tasks.list().len(), 1);
        assert_eq!(tasks.list()[0].id, MANUAL_UNLOCK_TASK);
    }

    #[test]
    fn task_cleared_when_auto_unlock_enabled() {
        let tasks = TaskRegistry::default();
        tasks.create(MANUAL_UNLOCK_TASK, "stale");

        let doc = WalletDoc {
            wallet_initialized: true,
            auto_unlock_enabled: true,
            wallet_password: Some("cHc=".into()),
            ..Default::default()
        };
        manage_unlock_task(&doc, &tasks);
        assert!(tasks.list().is_empty());
    }
}
