// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::{Arc, RwLock};

use crate::backup::reconcile::TokenExchanger;
use crate::config::Settings;
use crate::lifecycle::controller::ServiceController;
use crate::lifecycle::executor::StatusBoard;
use crate::lnd::cli::NodeCli;
use crate::lnd::rest::WalletRpc;
use crate::store::{BackupStore, WalletStore};
use crate::wallet::TaskRegistry;

/// Shared handles for the action surface and the lifecycle runtime.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub wallet: Arc<WalletStore>,
    pub backup: Arc<BackupStore>,
    /// Pending operator tasks (manual unlock).
    pub tasks: Arc<TaskRegistry>,
    /// Sticky advisory notices (e.g. post-restore warning).
    pub notices: Arc<TaskRegistry>,
    pub rpc: Arc<dyn WalletRpc>,
    pub cli: Arc<dyn NodeCli>,
    pub controller: Arc<dyn ServiceController>,
    pub exchanger: Arc<dyn TokenExchanger>,
    /// Unit states of the current service-start attempt.
    pub units: Arc<RwLock<StatusBoard>>,
}
