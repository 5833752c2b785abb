// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the service. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `LND_DATA_DIR` | LND data directory (mounted volume) | `/root/.lnd` |
//! | `LND_BIN` | Path to the `lnd` binary | `lnd` |
//! | `LNCLI_BIN` | Path to the `lncli` binary | `lncli` |
//! | `LND_RPC_SERVER` | Host passed to `lncli --rpcserver` | `localhost:10009` |
//! | `LND_REST_PORT` | Local REST port (readiness signal) | `8080` |
//! | `RCLONE_BIN` | Path to the `rclone` binary | `rclone` |
//! | `MAIL_BIN` | Path to the mail command used for email backup | `mutt` |
//! | `TOR_SOCKS_PROXY` | SOCKS proxy for anonymity-network remotes | `127.0.0.1:9050` |
//! | `HOST` | Action surface bind address | `127.0.0.1` |
//! | `PORT` | Action surface bind port | `9080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable name for the LND data directory.
pub const LND_DATA_DIR_ENV: &str = "LND_DATA_DIR";

/// Default LND data directory inside the service container.
pub const DEFAULT_LND_DATA_DIR: &str = "/root/.lnd";

/// Local REST port LND listens on; port-listening here is the readiness
/// signal for the primary daemon unit.
pub const DEFAULT_REST_PORT: u16 = 8080;

/// Default gRPC server address passed to `lncli`.
pub const DEFAULT_RPC_SERVER: &str = "localhost:10009";

/// Settings resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub lnd_bin: String,
    pub lncli_bin: String,
    pub rpc_server: String,
    pub rest_port: u16,
    pub rclone_bin: String,
    pub mail_bin: String,
    pub socks_proxy: String,
    pub host: String,
    pub port: u16,
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var(LND_DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_LND_DATA_DIR)),
            lnd_bin: env::var("LND_BIN").unwrap_or_else(|_| "lnd".to_string()),
            lncli_bin: env::var("LNCLI_BIN").unwrap_or_else(|_| "lncli".to_string()),
            rpc_server: env::var("LND_RPC_SERVER")
                .unwrap_or_else(|_| DEFAULT_RPC_SERVER.to_string()),
            rest_port: env::var("LND_REST_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_REST_PORT),
            rclone_bin: env::var("RCLONE_BIN").unwrap_or_else(|_| "rclone".to_string()),
            mail_bin: env::var("MAIL_BIN").unwrap_or_else(|_| "mutt".to_string()),
            socks_proxy: env::var("TOR_SOCKS_PROXY")
                .unwrap_or_else(|_| "127.0.0.1:9050".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(9080),
        }
    }

    /// Base URL of the wrapped daemon's local REST API.
    pub fn rest_base_url(&self) -> String {
        format!("https://localhost:{}", self.rest_port)
    }

    /// Path of the wallet/app state document.
    pub fn wallet_store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    /// Path of the backup-provider config document.
    pub fn backup_store_path(&self) -> PathBuf {
        self.data_dir.join("custom-config.json")
    }

    /// Path of the daemon's own config file (`key=value` lines).
    pub fn lnd_conf_path(&self) -> PathBuf {
        self.data_dir.join("lnd.conf")
    }

    /// Path of the backup artifact whose changes trigger synchronization.
    pub fn channel_backup_path(&self) -> PathBuf {
        channel_backup_path(&self.data_dir)
    }
}

/// The channel backup artifact, owned by LND and read-only to this service.
pub fn channel_backup_path(data_dir: &Path) -> PathBuf {
    data_dir.join("data/chain/bitcoin/mainnet/channel.backup")
}
