// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Health probes.
//!
//! The single source of truth for "is this broken and why": every failure
//! message names the action that fixes it. Probes only read; they are
//! safe to call while units are mid-transition, from the lifecycle gate
//! and from the health endpoint alike.

use crate::lifecycle::unit::HealthResult;
use crate::lnd::cli::NodeCli;
use crate::store::{BackupDoc, LndConf, WalletStore};

/// Chain/graph sync progress via `getinfo`.
pub async fn sync_progress(cli: &dyn NodeCli) -> HealthResult {
    match cli.get_info().await {
        Ok(info) => match (info.synced_to_chain, info.synced_to_graph) {
            (true, true) => HealthResult::success("Synced to chain and graph"),
            (false, true) => HealthResult::loading("Synced to graph but not to chain"),
            (true, false) => HealthResult::loading("Synced to chain but not to graph"),
            (false, false) => HealthResult::loading("Not synced to chain or graph"),
        },
        Err(e) => {
            if let Some(stderr) = e.stderr() {
                if stderr.contains("waiting to start") {
                    return HealthResult::starting("LND is starting");
                }
            }
            HealthResult::failure(format!("Error: {e}"))
        }
    }
}

/// Wallet lock state, with remediation depending on the auto-unlock flag.
pub async fn wallet_status(store: &WalletStore, cli: &dyn NodeCli) -> HealthResult {
    let doc = match store.read() {
        Ok(doc) => doc,
        Err(_) => return HealthResult::loading("Wallet state not available yet"),
    };
    if !doc.wallet_initialized {
        return HealthResult::loading("Wallet not initialized");
    }

    match cli.get_info().await {
        Ok(_) => HealthResult::success("Wallet is unlocked"),
        Err(e) => match e.stderr() {
            Some(stderr)
                if stderr.contains("wallet locked") || stderr.contains("wallet is encrypted") =>
            {
                if doc.auto_unlock_enabled {
                    HealthResult::failure(
                        "Wallet is locked but auto-unlock is enabled: the stored password \
                         is not correct. Run the Auto-Unlock Wallet action and enter the \
                         correct password.",
                    )
                } else {
                    HealthResult::failure(
                        "Wallet is locked and auto-unlock is disabled. Run the Unlock \
                         Wallet action and enter your password.",
                    )
                }
            }
            _ => HealthResult::failure(format!("Unknown error: {e}")),
        },
    }
}

/// Whether the backup watcher is actively mirroring.
pub fn backup_status(doc: &BackupDoc) -> HealthResult {
    if doc.auto_backup_enabled {
        HealthResult::success("Active (backing up to configured targets)")
    } else {
        HealthResult::disabled("Disabled. Run the Auto-Backup Channels action to configure targets.")
    }
}

/// Whether other nodes can reach this one.
pub fn reachability(conf: &LndConf) -> HealthResult {
    if conf.has_external_address() {
        HealthResult::success("External address configured")
    } else {
        HealthResult::disabled(
            "Your node can peer with other nodes, but other nodes cannot peer with you. \
             Optionally add a Tor domain, public domain, or public IP address to change \
             this behavior.",
        )
    }
}
