// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wrapped daemon interfaces
//!
//! LND itself is a black box. This module holds the narrow surfaces the
//! orchestrator consumes:
//!
//! - `process` - spawning and supervising the daemon binary
//! - `rest` - the local REST API (seed/init/unlock/changepassword)
//! - `cli` - `lncli` invocations (getinfo, channel backup, watchtowers)

pub mod cli;
pub mod process;
pub mod rest;

pub use cli::{CliError, GetInfo, LndCli, NodeCli, TowerInfo};
pub use process::{wait_rest_listening, with_temp_instance, LndLaunch, LndProcess};
pub use rest::{LndRestClient, RpcError, WalletRpc};
