// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! First-time wallet initialization.
//!
//! At-most-once per install: the flow is guarded by `wallet_initialized`,
//! and the flag (together with the mnemonic) is persisted before the init
//! RPC is issued. Re-entering after a crash is therefore a no-op; a crash
//! *before* the flag lands requires manual recovery and is never retried
//! with a fresh seed.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::lifecycle::retry::{Retry, RetryError};
use crate::lifecycle::StartError;
use crate::lnd::process::{with_temp_instance, LndLaunch};
use crate::lnd::rest::WalletRpc;
use crate::store::WalletStore;

/// Poll cadence for `genseed` while the temp daemon's RPC comes up.
const GENSEED_INTERVAL: Duration = Duration::from_secs(5);
const GENSEED_ATTEMPTS: u32 = 60;

/// Initialize the wallet on a fresh install. No-op once initialized.
pub async fn initialize_wallet(
    store: &WalletStore,
    rpc: &dyn WalletRpc,
    launch: &LndLaunch,
    cancel: &CancellationToken,
) -> Result<(), StartError> {
    initialize_wallet_with(store, rpc, launch, cancel, GENSEED_ATTEMPTS, GENSEED_INTERVAL).await
}

pub(crate) async fn initialize_wallet_with(
    store: &WalletStore,
    rpc: &dyn WalletRpc,
    launch: &LndLaunch,
    cancel: &CancellationToken,
    attempts: u32,
    interval: Duration,
) -> Result<(), StartError> {
    let doc = store.read_or_init().await?;
    if doc.wallet_initialized {
        return Ok(());
    }

    let password = doc.wallet_password.clone().ok_or_else(|| StartError::UnitFailed {
        unit: "wallet-init".to_string(),
        message: "no wallet password set; run the Wallet Password action first".to_string(),
    })?;

    info!("fresh install detected, initializing wallet");

    with_temp_instance(launch, cancel, || async {
        let retry = Retry::new().max_attempts(attempts).interval(interval);
        let mnemonic = retry
            .run(cancel, || rpc.gen_seed())
            .await
            .map_err(|e| match e {
                RetryError::Cancelled => StartError::UnitFailed {
                    unit: "wallet-init".to_string(),
                    message: "cancelled while waiting for the seed RPC".to_string(),
                },
                RetryError::Exhausted { attempts, last } => StartError::UnitFailed {
                    unit: "wallet-init".to_string(),
                    message: format!("seed RPC not ready after {attempts} attempts: {last}"),
                },
                RetryError::TimedOut { last } => StartError::UnitFailed {
                    unit: "wallet-init".to_string(),
                    message: format!("seed RPC not ready: {last}"),
                },
            })?;

        // Persist the mnemonic and the guard flag before issuing init, so a
        // crash past this point never regenerates the seed. The two backup
        // confirmations survive untouched.
        store
            .merge(|doc| {
                doc.aezeed_cipher_seed = Some(mnemonic.clone());
                doc.wallet_initialized = true;
                doc.auto_unlock_enabled = true;
            })
            .await?;

        if let Err(e) = rpc.init_wallet(&password, &mnemonic).await {
            warn!(error = %e, "initwallet call failed; wallet marked initialized, manual recovery may be required");
        } else {
            info!("wallet initialized");
        }
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lnd::rest::RpcError;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingRpc {
        genseed_calls: AtomicU32,
        init_calls: AtomicU32,
        genseed_failures_before_success: AtomicU32,
    }

    #[async_trait]
    impl WalletRpc for CountingRpc {
        async fn gen_seed(&self) -> Result<Vec<String>, RpcError> {
            let n = self.genseed_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.genseed_failures_before_success.load(Ordering::SeqCst) {
                return Err(RpcError::Request("rpc not up yet".to_string()));
            }
            Ok((0..24).map(|i| format!("word{i}")).collect())
        }

        async fn init_wallet(&self, _p: &str, _m: &[String]) -> Result<(), RpcError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn unlock_wallet(&self, _p: &str, _w: Option<u32>) -> Result<(), RpcError> {
            unreachable!("unlock is not part of init")
        }

        async fn change_password(&self, _c: &str, _n: &str) -> Result<(), RpcError> {
            unreachable!("changepassword is not part of init")
        }
    }

    fn test_launch(dir: &tempfile::TempDir) -> LndLaunch {
        // `sh` exits immediately on the unknown flag; the flow only needs
        // spawn to succeed because the RPC is mocked.
        LndLaunch {
            bin: "sh".to_string(),
            data_dir: dir.path().to_path_buf(),
            rest_port: 8080,
            extra_args: Vec::new(),
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> WalletStore {
        WalletStore::new(dir.path().join("store.json"))
    }

    #[tokio::test]
    async fn initialized_wallet_makes_zero_network_calls() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .merge(|doc| {
                doc.wallet_initialized = true;
                doc.wallet_password = Some("cHc=".into());
            })
            .await
            .unwrap();

        let rpc = CountingRpc::default();
        let launch = LndLaunch {
            bin: PathBuf::from("/nonexistent/lnd").display().to_string(),
            data_dir: dir.path().to_path_buf(),
            rest_port: 8080,
            extra_args: Vec::new(),
        };

        // A nonexistent binary proves no temp instance is even spawned.
        initialize_wallet(&store, &rpc, &launch, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rpc.genseed_calls.load(Ordering::SeqCst), 0);
        assert_eq!(rpc.init_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fresh_install_persists_seed_and_flags_before_init() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .merge(|doc| {
                doc.wallet_password = Some("cHc=".into());
                doc.seed_backup_confirmed = true;
            })
            .await
            .unwrap();

        let rpc = CountingRpc::default();
        rpc.genseed_failures_before_success.store(2, Ordering::SeqCst);

        initialize_wallet_with(
            &store,
            &rpc,
            &test_launch(&dir),
            &CancellationToken::new(),
            10,
            Duration::from_millis(5),
        )
        .await
        .unwrap();

        let doc = store.read().unwrap();
        assert!(doc.wallet_initialized);
        assert!(doc.auto_unlock_enabled);
        assert_eq!(doc.aezeed_cipher_seed.as_ref().unwrap().len(), 24);
        // Pre-existing confirmation preserved.
        assert!(doc.seed_backup_confirmed);
        assert_eq!(rpc.genseed_calls.load(Ordering::SeqCst), 3);
        assert_eq!(rpc.init_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_password_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let rpc = CountingRpc::default();
        let result = initialize_wallet(
            &store,
            &rpc,
            &test_launch(&dir),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(StartError::UnitFailed { .. })));
        assert_eq!(rpc.genseed_calls.load(Ordering::SeqCst), 0);
    }
}
