// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service start sequence.
//!
//! One invocation of [`run_service`] is one service-start attempt: the
//! pre-graph oneshots (task management, config normalization, wallet init,
//! password-change reconciliation) run first, then the unit graph is
//! assembled from scratch and handed to the executor. Fatal errors abort
//! the attempt; the caller decides whether to retry or exit.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backup::email::CommandMailer;
use crate::backup::sync::BackupSync;
use crate::backup::transport::RcloneTransport;
use crate::health;
use crate::lifecycle::executor::Executor;
use crate::lifecycle::unit::{HealthResult, Unit};
use crate::lifecycle::StartError;
use crate::lnd::process::{self, LndLaunch, LndProcess};
use crate::state::AppState;
use crate::store::LndConf;
use crate::wallet;

const RESTORED_NOTICE: &str = "Backup restoration detected. Running a node after \
restorechanbackup is not recommended: recover and sweep any remaining funds to \
another wallet, then reinstall LND for continued use.";

/// Run one service-start attempt until cancellation or a fatal error.
pub async fn run_service(state: &AppState, cancel: CancellationToken) -> Result<(), StartError> {
    let settings = state.settings.clone();
    info!("starting LND service");

    let wallet_doc = state.wallet.read_or_init().await?;
    wallet::manage_unlock_task(&wallet_doc, &state.tasks);

    // The service depends on fixed local listen addresses and the host's
    // Tor proxy; force them into the daemon config before launch.
    let mut conf = LndConf::load(&settings.lnd_conf_path())?;
    if conf.normalize_for_service(&settings.socks_proxy) {
        conf.save(&settings.lnd_conf_path())?;
        info!("daemon config normalized");
    }

    let base_launch = LndLaunch {
        bin: settings.lnd_bin.clone(),
        data_dir: settings.data_dir.clone(),
        rest_port: settings.rest_port,
        extra_args: Vec::new(),
    };

    wallet::initialize_wallet(&state.wallet, state.rpc.as_ref(), &base_launch, &cancel).await?;
    if wallet::reconcile_pending_password(&state.wallet, state.rpc.as_ref(), &base_launch, &cancel)
        .await?
    {
        // The promotion re-enabled auto-unlock.
        state.tasks.clear(wallet::MANUAL_UNLOCK_TASK);
    }

    let doc = state.wallet.read_or_init().await?;
    let mut executor = Executor::new();

    // Primary daemon; readiness = REST port listening.
    let mut primary_launch = base_launch.clone();
    if doc.reset_wallet_transactions {
        primary_launch
            .extra_args
            .push("--reset-wallet-transactions".to_string());
    }
    let rest_port = settings.rest_port;
    executor.add(Unit::daemon(
        "primary",
        &[],
        Box::new(move |cancel| Box::pin(run_primary(primary_launch, cancel))),
        Arc::new(move || {
            Box::pin(async move {
                if process::rest_port_open(rest_port).await {
                    HealthResult::success("The REST interface is ready to accept connections")
                } else {
                    HealthResult::loading("The REST interface is not ready")
                }
            })
        }),
    ));

    // Startup unlock.
    {
        let store = state.wallet.clone();
        let rpc = state.rpc.clone();
        executor.add(Unit::oneshot(
            "unlock-wallet",
            &["primary"],
            Box::new(move |cancel| {
                let store = store.clone();
                let rpc = rpc.clone();
                Box::pin(async move { wallet::unlock_wallet(&store, rpc.as_ref(), &cancel).await })
            }),
        ));
    }

    // Backup watcher.
    {
        let sync = BackupSync::new(
            state.backup.clone(),
            settings.channel_backup_path(),
            settings.data_dir.join("rclone.conf"),
            state.cli.clone(),
            Arc::new(RcloneTransport::new(settings.rclone_bin.clone())),
            Arc::new(CommandMailer::new(
                settings.mail_bin.clone(),
                settings.data_dir.join("mail"),
            )),
            settings.socks_proxy.clone(),
        );
        let backup_store = state.backup.clone();
        executor.add(Unit::daemon(
            "channel-backup-watcher",
            &["primary"],
            Box::new(move |cancel| {
                Box::pin(async move {
                    sync.run(cancel).await;
                    Ok(())
                })
            }),
            Arc::new(move || {
                let store = backup_store.clone();
                Box::pin(async move {
                    match store.read() {
                        Ok(doc) => health::backup_status(&doc),
                        Err(_) => HealthResult::loading("Backup config not available yet"),
                    }
                })
            }),
        ));
    }

    // Health checks.
    {
        let cli = state.cli.clone();
        executor.add(Unit::health_check(
            "sync-progress",
            &["primary", "unlock-wallet"],
            Arc::new(move || {
                let cli = cli.clone();
                Box::pin(async move { health::sync_progress(cli.as_ref()).await })
            }),
        ));
    }
    {
        let cli = state.cli.clone();
        let store = state.wallet.clone();
        executor.add(Unit::health_check(
            "wallet-status",
            &["primary"],
            Arc::new(move || {
                let cli = cli.clone();
                let store = store.clone();
                Box::pin(async move { health::wallet_status(&store, cli.as_ref()).await })
            }),
        ));
    }

    // Channel-state restore after a backup restoration.
    if doc.restore {
        let cli = state.cli.clone();
        let notices = state.notices.clone();
        let artifact = settings.channel_backup_path();
        executor.add(Unit::oneshot(
            "restore",
            &["primary", "unlock-wallet"],
            Box::new(move |_cancel| {
                let cli = cli.clone();
                let notices = notices.clone();
                let artifact = artifact.clone();
                Box::pin(async move {
                    notices.create("restored", RESTORED_NOTICE);
                    cli.restore_channel_backup(&artifact).await?;
                    info!("channel backup restored");
                    Ok(())
                })
            }),
        ));
    }

    // Reachability advisory, only while no external address is configured.
    if !conf.has_external_address() {
        let conf_path = settings.lnd_conf_path();
        executor.add(Unit::health_check(
            "reachability",
            &["primary"],
            Arc::new(move || {
                let conf_path = conf_path.clone();
                Box::pin(async move {
                    match LndConf::load(&conf_path) {
                        Ok(conf) => health::reachability(&conf),
                        Err(e) => HealthResult::failure(format!("Cannot read daemon config: {e}")),
                    }
                })
            }),
        ));
    }

    // Watchtower client registrations, once synced.
    if !doc.watchtowers.is_empty() {
        let cli = state.cli.clone();
        let towers = doc.watchtowers.clone();
        executor.add(Unit::oneshot(
            "add-watchtowers",
            &["primary", "unlock-wallet", "sync-progress"],
            Box::new(move |cancel| {
                let cli = cli.clone();
                let towers = towers.clone();
                Box::pin(async move {
                    for tower in &towers {
                        if cancel.is_cancelled() {
                            return Ok(());
                        }
                        match cli.add_watchtower(tower).await {
                            Ok(output) => {
                                info!(tower = %tower, result = %output.trim(), "watchtower added")
                            }
                            Err(e) => {
                                warn!(tower = %tower, error = %e, "failed to add watchtower")
                            }
                        }
                    }
                    Ok(())
                })
            }),
        ));
    }

    *state.units.write().expect("status board lock") = executor.status_board();
    executor.run(cancel).await
}

/// The primary daemon body: spawn, then hold until exit or cancellation.
async fn run_primary(launch: LndLaunch, cancel: CancellationToken) -> Result<(), StartError> {
    let mut process = LndProcess::spawn(&launch)?;
    tokio::select! {
        status = process.wait() => {
            let status = status?;
            Err(StartError::UnitFailed {
                unit: "primary".to_string(),
                message: format!("daemon exited with {status}"),
            })
        }
        _ = cancel.cancelled() => {
            process.shutdown().await;
            Ok(())
        }
    }
}
