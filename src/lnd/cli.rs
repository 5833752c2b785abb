// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `lncli` invocations against the running daemon.
//!
//! Health checks inspect stderr to distinguish "wallet locked" and
//! "waiting to start" from real failures, so [`CliError::Command`] keeps
//! the raw stderr text.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("failed to spawn lncli: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("lncli exited with {exit_code:?}: {stderr}")]
    Command {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("lncli output was invalid: {0}")]
    Parse(#[from] serde_json::Error),
}

impl CliError {
    pub fn stderr(&self) -> Option<&str> {
        match self {
            CliError::Command { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetInfo {
    pub identity_pubkey: String,
    pub alias: String,
    pub synced_to_chain: bool,
    pub synced_to_graph: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TowerInfo {
    pub pubkey: String,
    #[serde(default)]
    pub listeners: Vec<String>,
    #[serde(default)]
    pub uris: Vec<String>,
}

/// CLI surface of the wrapped daemon consumed by this service.
#[async_trait]
pub trait NodeCli: Send + Sync {
    async fn get_info(&self) -> Result<GetInfo, CliError>;

    /// `exportchanbackup --all --output_file <path>` - (re)creates the
    /// backup artifact.
    async fn export_channel_backup(&self, output: &Path) -> Result<(), CliError>;

    /// `restorechanbackup --multi_file <path>`.
    async fn restore_channel_backup(&self, multi_file: &Path) -> Result<(), CliError>;

    /// `wtclient add <uri>`; returns stdout for logging.
    async fn add_watchtower(&self, uri: &str) -> Result<String, CliError>;

    /// `tower info`.
    async fn tower_info(&self) -> Result<TowerInfo, CliError>;
}

#[derive(Debug, Clone)]
pub struct LndCli {
    bin: String,
    rpc_server: String,
}

impl LndCli {
    pub fn new(bin: impl Into<String>, rpc_server: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            rpc_server: rpc_server.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, CliError> {
        let rpc_arg = format!("--rpcserver={}", self.rpc_server);
        let output = Command::new(&self.bin)
            .arg(&rpc_arg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(CliError::Command {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl NodeCli for LndCli {
    async fn get_info(&self) -> Result<GetInfo, CliError> {
        let stdout = self.run(&["getinfo"]).await?;
        Ok(serde_json::from_str(&stdout)?)
    }

    async fn export_channel_backup(&self, output: &Path) -> Result<(), CliError> {
        let path = output.display().to_string();
        self.run(&["exportchanbackup", "--all", "--output_file", &path])
            .await?;
        Ok(())
    }

    async fn restore_channel_backup(&self, multi_file: &Path) -> Result<(), CliError> {
        let path = multi_file.display().to_string();
        self.run(&["restorechanbackup", "--multi_file", &path])
            .await?;
        Ok(())
    }

    async fn add_watchtower(&self, uri: &str) -> Result<String, CliError> {
        self.run(&["wtclient", "add", uri]).await
    }

    async fn tower_info(&self) -> Result<TowerInfo, CliError> {
        let stdout = self.run(&["tower", "info"]).await?;
        Ok(serde_json::from_str(&stdout)?)
    }
}
