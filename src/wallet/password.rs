// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pending password-change reconciliation.
//!
//! Runs at service start, before the primary daemon: a temp instance is
//! brought up, the change API is invoked with current+new, and on success
//! the pending password is promoted atomically. Auto-unlock is forced on
//! by the promotion: a wallet re-encrypted under the new password cannot
//! be auto-unlocked with a stale stored one, so the new password must be
//! present to avoid a lockout.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::lifecycle::StartError;
use crate::lnd::process::{wait_rest_listening, with_temp_instance, LndLaunch};
use crate::lnd::rest::WalletRpc;
use crate::store::{WalletLifecycle, WalletStore};

/// REST readiness bound for the temp instance: 60 attempts, 1 s apart.
const READY_ATTEMPTS: u32 = 60;
const READY_INTERVAL: Duration = Duration::from_secs(1);

/// Reconcile a staged password change, if any.
///
/// Returns Ok(true) when a change was applied, Ok(false) when nothing was
/// pending. Any failure persists `password_change_error`, clears the
/// pending slot, and aborts this start attempt.
pub async fn reconcile_pending_password(
    store: &WalletStore,
    rpc: &dyn WalletRpc,
    launch: &LndLaunch,
    cancel: &CancellationToken,
) -> Result<bool, StartError> {
    reconcile_with(store, rpc, launch, cancel, READY_ATTEMPTS, READY_INTERVAL).await
}

pub(crate) async fn reconcile_with(
    store: &WalletStore,
    rpc: &dyn WalletRpc,
    launch: &LndLaunch,
    cancel: &CancellationToken,
    ready_attempts: u32,
    ready_interval: Duration,
) -> Result<bool, StartError> {
    let doc = store.read_or_init().await?;
    let (current, pending) = match WalletLifecycle::classify(&doc)? {
        WalletLifecycle::PasswordChangePending { current, pending } => (current, pending),
        _ => return Ok(false),
    };

    info!("pending password change detected, performing change");

    let result = with_temp_instance(launch, cancel, || async {
        wait_rest_listening(launch.rest_port, ready_attempts, ready_interval, cancel).await?;
        rpc.change_password(&current, &pending).await?;
        Ok(())
    })
    .await;

    match result {
        Ok(()) => {
            store
                .merge(|doc| {
                    doc.wallet_password = Some(pending.clone());
                    doc.pending_password_change = None;
                    doc.password_change_error = None;
                    doc.auto_unlock_enabled = true;
                })
                .await?;
            info!("password changed and promoted");
            Ok(true)
        }
        Err(e) => {
            error!(error = %e, "password change failed");
            store
                .merge(|doc| {
                    doc.pending_password_change = None;
                    doc.password_change_error = Some(e.to_string());
                })
                .await?;
            Err(e)
        }
    }
}
