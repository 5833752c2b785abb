// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Config Store
//!
//! Durable key-value configuration for the service, split over three
//! independent documents on the mounted data volume:
//!
//! ```text
//! <data dir>/
//!   store.json          # wallet/app state (structured document)
//!   custom-config.json  # backup-provider config (structured document)
//!   lnd.conf            # daemon config (key=value lines, duplicates allowed)
//! ```
//!
//! All writers go through [`JsonDocument::merge`], which serializes
//! read-modify-write cycles through one async mutex and lands writes with a
//! temp-file + rename. Health checks and other readers use [`JsonDocument::read`]
//! and never mutate.

pub mod backup;
pub mod document;
pub mod lnd_conf;
pub mod wallet;

pub use backup::{BackupDoc, BackupStore, EmailSettings};
pub use document::{JsonDocument, StoreError, StoreResult};
pub use lnd_conf::LndConf;
pub use wallet::{WalletDoc, WalletLifecycle, WalletStateError, WalletStore};
