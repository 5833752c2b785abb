// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Startup unlock oneshot.
//!
//! Runs once the primary daemon is ready. Skips cleanly when there is
//! nothing to do (wallet uninitialized, or auto-unlock disabled; in that
//! case the manual-unlock task and the wallet-status health check carry
//! the remediation). Exhausting the attempts is fatal for this start.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::lifecycle::retry::{Retry, RetryError};
use crate::lifecycle::StartError;
use crate::lnd::rest::WalletRpc;
use crate::store::{WalletLifecycle, WalletStore};

pub const UNLOCK_ATTEMPTS: u32 = 5;
pub const UNLOCK_INTERVAL: Duration = Duration::from_secs(5);

/// Unlock the wallet with the stored password, up to 5 attempts spaced 5 s
/// apart, each attempt cancellable.
pub async fn unlock_wallet(
    store: &WalletStore,
    rpc: &dyn WalletRpc,
    cancel: &CancellationToken,
) -> Result<(), StartError> {
    unlock_wallet_with(
        store,
        rpc,
        cancel,
        Retry::new()
            .max_attempts(UNLOCK_ATTEMPTS)
            .interval(UNLOCK_INTERVAL),
    )
    .await
}

pub(crate) async fn unlock_wallet_with(
    store: &WalletStore,
    rpc: &dyn WalletRpc,
    cancel: &CancellationToken,
    retry: Retry,
) -> Result<(), StartError> {
    let doc = store.read_or_init().await?;
    let (password, recovery_window) = match WalletLifecycle::classify(&doc)? {
        WalletLifecycle::Uninitialized => {
            info!("wallet not initialized, skipping unlock");
            return Ok(());
        }
        WalletLifecycle::ManualUnlock => {
            info!("auto-unlock disabled, skipping unlock");
            return Ok(());
        }
        WalletLifecycle::PasswordChangePending { .. } => {
            // Reconciled before the graph is built; reaching here means a
            // concurrent writer staged a change mid-start. The next restart
            // picks it up.
            info!("password change pending, skipping unlock for this start");
            return Ok(());
        }
        WalletLifecycle::AutoUnlock {
            password,
            recovery_window,
        } => (password, recovery_window),
    };

    info!("auto-unlock enabled, unlocking wallet");
    retry
        .run(cancel, || rpc.unlock_wallet(&password, recovery_window))
        .await
        .map_err(|e| match e {
            RetryError::Cancelled => StartError::UnitFailed {
                unit: "unlock-wallet".to_string(),
                message: "cancelled".to_string(),
            },
            RetryError::Exhausted { attempts, last } => StartError::UnitFailed {
                unit: "unlock-wallet".to_string(),
                message: format!(
                    "unlock failed after {attempts} attempts: {last}. Check the stored \
                     password via the Auto-Unlock Wallet action."
                ),
            },
            RetryError::TimedOut { last } => StartError::UnitFailed {
                unit: "unlock-wallet".to_string(),
                message: format!("unlock timed out: {last}"),
            },
        })?;

    info!("wallet unlocked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lnd::rest::RpcError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyRpc {
        unlock_calls: AtomicU32,
        failures_before_success: u32,
    }

    impl FlakyRpc {
        fn new(failures_before_success: u32) -> Self {
            Self {
                unlock_calls: AtomicU32::new(0),
                failures_before_success,
            }
        }
    }

    #[async_trait]
    impl WalletRpc for FlakyRpc {
        async fn gen_seed(&self) -> Result<Vec<String>, RpcError> {
            unreachable!()
        }

        async fn init_wallet(&self, _p: &str, _m: &[String]) -> Result<(), RpcError> {
            unreachable!()
        }

        async fn unlock_wallet(&self, _p: &str, _w: Option<u32>) -> Result<(), RpcError> {
            let n = self.unlock_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures_before_success {
                Err(RpcError::Api("invalid passphrase".to_string()))
            } else {
                Ok(())
            }
        }

        async fn change_password(&self, _c: &str, _n: &str) -> Result<(), RpcError> {
            unreachable!()
        }
    }

    fn fast_retry() -> Retry {
        Retry::new()
            .max_attempts(UNLOCK_ATTEMPTS)
            .interval(Duration::from_millis(2))
    }

    async fn store_with(doc: crate::store::WalletDoc) -> (tempfile::TempDir, WalletStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::new(dir.path().join("store.json"));
        store.merge(|d| *d = doc).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn unlock_retries_then_succeeds() {
        let (_dir, store) = store_with(crate::store::WalletDoc {
            wallet_initialized: true,
            auto_unlock_enabled: true,
            wallet_password: Some("cHc=".into()),
            ..Default::default()
        })
        .await;

        let rpc = FlakyRpc::new(2);
        unlock_wallet_with(&store, &rpc, &CancellationToken::new(), fast_retry())
            .await
            .unwrap();
        assert_eq!(rpc.unlock_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unlock_exhaustion_is_fatal() {
        let (_dir, store) = store_with(crate::store::WalletDoc {
            wallet_initialized: true,
            auto_unlock_enabled: true,
            wallet_password: Some("cHc=".into()),
            ..Default::default()
        })
        .await;

        let rpc = FlakyRpc::new(u32::MAX);
        let result =
            unlock_wallet_with(&store, &rpc, &CancellationToken::new(), fast_retry()).await;

        assert!(matches!(result, Err(StartError::UnitFailed { .. })));
        assert_eq!(rpc.unlock_calls.load(Ordering::SeqCst), UNLOCK_ATTEMPTS);
    }

    #[tokio::test]
    async fn uninitialized_wallet_skips_without_calls() {
        let (_dir, store) = store_with(crate::store::WalletDoc::default()).await;
        let rpc = FlakyRpc::new(0);
        unlock_wallet_with(&store, &rpc, &CancellationToken::new(), fast_retry())
            .await
            .unwrap();
        assert_eq!(rpc.unlock_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn manual_unlock_mode_skips_without_calls() {
        let (_dir, store) = store_with(crate::store::WalletDoc {
            wallet_initialized: true,
            auto_unlock_enabled: false,
            ..Default::default()
        })
        .await;

        let rpc = FlakyRpc::new(0);
        unlock_wallet_with(&store, &rpc, &CancellationToken::new(), fast_retry())
            .await
            .unwrap();
        assert_eq!(rpc.unlock_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_token_stops_attempts() {
        let (_dir, store) = store_with(crate::store::WalletDoc {
            wallet_initialized: true,
            auto_unlock_enabled: true,
            wallet_password: Some("cHc=".into()),
            ..Default::default()
        })
        .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let rpc = FlakyRpc::new(u32::MAX);
        let result = unlock_wallet_with(&store, &rpc, &cancel, fast_retry()).await;

        assert!(result.is_err());
        assert_eq!(rpc.unlock_calls.load(Ordering::SeqCst), 0);
    }
}
