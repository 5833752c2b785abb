// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Backup-provider config document.
//!
//! Holds the base64-encoded remote-config text blob plus the two remote
//! identifier sequences. Invariant: every entry in `enabled_remotes` is a
//! member of `selected_remotes`; [`BackupStore::merge`] re-establishes it
//! after every patch so no writer can persist a violation.

use std::path::PathBuf;

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};

use super::document::{JsonDocument, StoreError, StoreResult};

/// SMTP settings for the email backup branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailSettings {
    pub from: String,
    /// One or more recipients, comma-separated.
    pub to: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
}

impl EmailSettings {
    /// Recipient list, empty entries dropped.
    pub fn recipients(&self) -> Vec<&str> {
        self.to
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .collect()
    }
}

/// Persisted backup-provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupDoc {
    /// Remote-config text blob (rclone format), base64-encoded.
    pub rclone_config: Option<String>,
    /// All configured remote identifiers, `provider:path`.
    pub selected_remotes: Vec<String>,
    /// Subset of `selected_remotes` currently active.
    pub enabled_remotes: Vec<String>,
    pub auto_backup_enabled: bool,
    pub email: Option<EmailSettings>,
    pub email_enabled: bool,
}

impl BackupDoc {
    /// Decode the remote-config blob, empty string when unset.
    pub fn decoded_rclone_config(&self) -> StoreResult<String> {
        match &self.rclone_config {
            None => Ok(String::new()),
            Some(b64) => {
                let bytes = Base64::decode_vec(b64).map_err(|e| {
                    StoreError::NotFound(format!("remote config blob is not valid base64: {e}"))
                })?;
                String::from_utf8(bytes).map_err(|e| {
                    StoreError::NotFound(format!("remote config blob is not valid UTF-8: {e}"))
                })
            }
        }
    }

    /// Encode and store the remote-config text, None when empty.
    pub fn set_rclone_config(&mut self, text: &str) {
        let trimmed = text.trim();
        self.rclone_config = if trimmed.is_empty() {
            None
        } else {
            Some(Base64::encode_string(trimmed.as_bytes()))
        };
    }

    /// Enforce enabled ⊆ selected.
    pub fn prune_enabled(&mut self) {
        self.enabled_remotes
            .retain(|r| self.selected_remotes.contains(r));
    }

    /// Whether the email branch should run.
    pub fn email_active(&self) -> bool {
        self.email_enabled && self.email.is_some()
    }
}

/// Typed handle over the backup config document.
#[derive(Debug)]
pub struct BackupStore {
    doc: JsonDocument<BackupDoc>,
}

impl BackupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            doc: JsonDocument::new(path),
        }
    }

    pub fn exists(&self) -> bool {
        self.doc.exists()
    }

    pub fn read(&self) -> StoreResult<BackupDoc> {
        self.doc.read()
    }

    pub async fn read_or_init(&self) -> StoreResult<BackupDoc> {
        self.doc.read_or_init().await
    }

    pub async fn merge<F>(&self, patch: F) -> StoreResult<BackupDoc>
    where
        F: FnOnce(&mut BackupDoc),
    {
        self.doc
            .merge(|doc| {
                patch(doc);
                doc.prune_enabled();
            })
            .await
    }
}
