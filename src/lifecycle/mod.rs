// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Service Lifecycle
//!
//! The orchestrator that brings the wrapped daemon from "installed" to
//! "serving traffic": named units (daemons, oneshots, health checks) with
//! explicit `requires` edges, executed by [`executor::Executor`] once per
//! service-start attempt. The graph is rebuilt from scratch on every start.
//!
//! ## Modules
//!
//! - `unit` - unit/health data model
//! - `executor` - dependency-gated concurrent execution
//! - `retry` - cancellable retry combinator shared by every retry site
//! - `controller` - restart seam used by the action surface

pub mod controller;
pub mod executor;
pub mod retry;
pub mod unit;

pub use controller::{ControllerError, RestartHandle, ServiceController};
pub use executor::{Executor, StatusBoard};
pub use retry::{Retry, RetryError};
pub use unit::{HealthResult, HealthStatus, Unit, UnitBody, UnitState};

use crate::lnd::cli::CliError;
use crate::lnd::rest::RpcError;
use crate::store::document::StoreError;
use crate::store::wallet::WalletStateError;

/// Errors that abort the current service-start attempt. The surrounding
/// service manager is expected to retry with a full restart.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("unit graph is invalid: {0}")]
    InvalidGraph(String),

    #[error("unit {unit} failed: {message}")]
    UnitFailed { unit: String, message: String },

    #[error("daemon {unit} exited unexpectedly")]
    DaemonExited { unit: String },

    #[error("wallet rpc: {0}")]
    Rpc(#[from] RpcError),

    #[error("node cli: {0}")]
    Cli(#[from] CliError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("wallet state: {0}")]
    WalletState(#[from] WalletStateError),

    #[error("process: {0}")]
    Process(#[from] std::io::Error),
}
