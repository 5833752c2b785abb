// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Backup Sync Daemon
//!
//! Long-lived loop scheduled as a daemon unit once the primary is ready:
//!
//! 1. Wait for the provider-config document to exist.
//! 2. While auto-backup is disabled, wait on a short bounded poll; no
//!    sync work happens while disabled.
//! 3. If enabled but the artifact is missing/empty, ask the daemon to
//!    export one, then re-check.
//! 4. Otherwise wait for the artifact's mtime to change (2 s bounded poll
//!    so cancellation and the disable toggle are observed promptly), then
//!    fan out to every enabled remote and the email branch.
//!
//! Every transfer is independent and best-effort: one remote failing is
//! logged and never blocks the others or aborts the loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::email::Mailer;
use super::rclone_conf::RcloneConf;
use super::transport::{RemoteTransport, TransferProfile};
use crate::lnd::cli::NodeCli;
use crate::store::{BackupDoc, BackupStore};

/// Bounded wait used for the file-change poll and the existence wait.
const CHANGE_POLL: Duration = Duration::from_secs(2);
/// Longer pause while disabled or with nothing configured.
const IDLE_POLL: Duration = Duration::from_secs(10);

/// Outcome of one fan-out sweep, per target.
#[derive(Debug, Default, PartialEq)]
pub struct SweepReport {
    /// (remote identifier, transfer succeeded)
    pub remotes: Vec<(String, bool)>,
    /// None when the email branch was not active.
    pub email: Option<bool>,
}

enum ChangeWait {
    Changed,
    Disabled,
    Cancelled,
}

pub struct BackupSync {
    store: Arc<BackupStore>,
    artifact: PathBuf,
    conf_path: PathBuf,
    cli: Arc<dyn NodeCli>,
    transport: Arc<dyn RemoteTransport>,
    mailer: Arc<dyn Mailer>,
    socks_proxy: String,
    change_poll: Duration,
    idle_poll: Duration,
}

impl BackupSync {
    pub fn new(
        store: Arc<BackupStore>,
        artifact: PathBuf,
        conf_path: PathBuf,
        cli: Arc<dyn NodeCli>,
        transport: Arc<dyn RemoteTransport>,
        mailer: Arc<dyn Mailer>,
        socks_proxy: String,
    ) -> Self {
        Self {
            store,
            artifact,
            conf_path,
            cli,
            transport,
            mailer,
            socks_proxy,
            change_poll: CHANGE_POLL,
            idle_poll: IDLE_POLL,
        }
    }

    /// Shrink the poll intervals (tests).
    pub fn poll_intervals(mut self, change: Duration, idle: Duration) -> Self {
        self.change_poll = change;
        self.idle_poll = idle;
        self
    }

    /// Run until the token fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(artifact = %self.artifact.display(), "backup sync daemon starting");

        while !self.store.exists() {
            if self.pause(self.change_poll, &cancel).await {
                return;
            }
        }

        let mut last_seen = artifact_mtime(&self.artifact);

        loop {
            if cancel.is_cancelled() {
                info!("backup sync daemon shutting down");
                return;
            }

            let doc = match self.store.read() {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(error = %e, "failed to read backup config");
                    if self.pause(self.idle_poll, &cancel).await {
                        return;
                    }
                    continue;
                }
            };

            if !doc.auto_backup_enabled {
                if self.pause(self.idle_poll, &cancel).await {
                    return;
                }
                continue;
            }

            if doc.enabled_remotes.is_empty() && !doc.email_active() {
                if self.pause(self.idle_poll, &cancel).await {
                    return;
                }
                continue;
            }

            if artifact_missing_or_empty(&self.artifact) {
                info!("backup artifact missing or empty, requesting export");
                if let Err(e) = self.cli.export_channel_backup(&self.artifact).await {
                    warn!(error = %e, "channel backup export failed");
                }
                if self.pause(self.change_poll, &cancel).await {
                    return;
                }
                continue;
            }

            match self.wait_for_change(&mut last_seen, &cancel).await {
                ChangeWait::Cancelled => {
                    info!("backup sync daemon shutting down");
                    return;
                }
                ChangeWait::Disabled => continue,
                ChangeWait::Changed => {}
            }

            info!("backup artifact changed, fanning out");
            // Re-read so the sweep uses the freshest remote set.
            match self.store.read() {
                Ok(doc) => {
                    let report = self.sweep(&doc, &cancel).await;
                    let ok = report.remotes.iter().filter(|(_, s)| *s).count();
                    info!(
                        succeeded = ok,
                        attempted = report.remotes.len(),
                        email = ?report.email,
                        "backup sweep finished"
                    );
                }
                Err(e) => warn!(error = %e, "failed to re-read backup config"),
            }
        }
    }

    /// One fan-out pass over every enabled remote plus the email branch.
    pub async fn sweep(&self, doc: &BackupDoc, cancel: &CancellationToken) -> SweepReport {
        let mut report = SweepReport::default();

        let conf_text = match doc.decoded_rclone_config() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "remote config blob is unreadable, skipping remotes");
                String::new()
            }
        };
        let conf = RcloneConf::parse(&conf_text);

        if !doc.enabled_remotes.is_empty() {
            if let Err(e) = std::fs::write(&self.conf_path, &conf_text) {
                warn!(error = %e, "failed to materialize remote config");
            } else {
                for remote in &doc.enabled_remotes {
                    let profile = TransferProfile::for_remote(&conf, remote, &self.socks_proxy);
                    match self
                        .transport
                        .copy(&self.conf_path, &self.artifact, remote, &profile)
                        .await
                    {
                        Ok(()) => {
                            info!(remote = %remote, "backed up to remote");
                            report.remotes.push((remote.clone(), true));
                        }
                        Err(e) => {
                            warn!(remote = %remote, error = %e, "failed to back up to remote");
                            report.remotes.push((remote.clone(), false));
                        }
                    }
                }
            }
        }

        if doc.email_active() {
            if let Some(email) = &doc.email {
                match self.mailer.send_backup(email, &self.artifact, cancel).await {
                    Ok(()) => report.email = Some(true),
                    Err(e) => {
                        warn!(error = %e, "failed to send email backup");
                        report.email = Some(false);
                    }
                }
            }
        }

        report
    }

    /// Bounded-poll wait for an artifact change; re-checks the disable
    /// toggle on every tick.
    async fn wait_for_change(
        &self,
        last_seen: &mut Option<SystemTime>,
        cancel: &CancellationToken,
    ) -> ChangeWait {
        loop {
            if self.pause(self.change_poll, cancel).await {
                return ChangeWait::Cancelled;
            }

            if let Ok(doc) = self.store.read() {
                if !doc.auto_backup_enabled {
                    return ChangeWait::Disabled;
                }
            }

            let mtime = artifact_mtime(&self.artifact);
            if mtime.is_some() && mtime != *last_seen {
                *last_seen = mtime;
                return ChangeWait::Changed;
            }
        }
    }

    /// Sleep unless cancelled; true means cancelled.
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = cancel.cancelled() => true,
        }
    }
}

fn artifact_mtime(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn artifact_missing_or_empty(path: &std::path::Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.len() == 0,
        Err(_) => true,
    }
}
