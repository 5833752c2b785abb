// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Backup Synchronization
//!
//! Everything around mirroring the channel backup artifact to the
//! operator's remote targets:
//!
//! - `sync` - the long-running watcher/fan-out daemon
//! - `transport` - sync-tool invocation with Tor-aware timeout profiles
//! - `email` - SMTP branch via an external mail command
//! - `rclone_conf` - remote-config text, obscuring, key normalization
//! - `reconcile` - user submissions -> config blob + remote identifiers

pub mod email;
pub mod rclone_conf;
pub mod reconcile;
pub mod sync;
pub mod transport;

pub use email::{CommandMailer, MailError, Mailer, SmtpTls};
pub use reconcile::{
    reconcile, BackupTargetsInput, BackupTargetsView, HttpTokenExchanger, Provider,
    ReconcileError, TokenExchanger,
};
pub use sync::{BackupSync, SweepReport};
pub use transport::{RcloneTransport, RemoteTransport, TransferProfile, TransportError};
