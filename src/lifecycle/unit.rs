// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Unit and health-check data model for the lifecycle graph.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use super::StartError;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Long-running daemon body; must observe the token and return promptly
/// once cancelled. Returning earlier is fatal to the service.
pub type DaemonFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<Result<(), StartError>> + Send>;

/// Oneshot body; may be invoked repeatedly in `until_success` mode.
pub type OneshotFn =
    Box<dyn FnMut(CancellationToken) -> BoxFuture<Result<(), StartError>> + Send>;

/// Read-only health probe; safe to invoke at any time, from any caller.
pub type ProbeFn = Arc<dyn Fn() -> BoxFuture<HealthResult> + Send + Sync>;

/// Health probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Success,
    Loading,
    Starting,
    Disabled,
    Failure,
}

/// A health result carries a human-readable message; for failures the
/// message must name the remediation, not just the error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct HealthResult {
    pub status: HealthStatus,
    pub message: String,
}

impl HealthResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Success,
            message: message.into(),
        }
    }

    pub fn loading(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Loading,
            message: message.into(),
        }
    }

    pub fn starting(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Starting,
            message: message.into(),
        }
    }

    pub fn disabled(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Disabled,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Failure,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == HealthStatus::Success
    }
}

/// Execution state of a unit within one service-start attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase", tag = "state", content = "detail")]
pub enum UnitState {
    Pending,
    Running,
    /// Terminal success for daemons (readiness probe passed) and health
    /// checks (first successful probe). The daemon itself keeps running.
    Ready,
    /// Terminal success for oneshots, and for daemons wound down by
    /// cancellation.
    Done,
    Failed(String),
}

impl UnitState {
    /// Whether dependents gated on this unit may start.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, UnitState::Ready | UnitState::Done)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UnitState::Failed(_))
    }
}

pub enum UnitBody {
    Daemon {
        run: DaemonFn,
        /// Readiness probe polled until its first success.
        ready: ProbeFn,
    },
    Oneshot {
        run: OneshotFn,
        /// When set, retry the body until success or this deadline.
        until_success: Option<Duration>,
    },
    HealthCheck {
        probe: ProbeFn,
    },
}

/// A named, dependency-gated step in the lifecycle graph.
pub struct Unit {
    pub name: String,
    pub requires: Vec<String>,
    pub body: UnitBody,
}

impl Unit {
    pub fn daemon(
        name: impl Into<String>,
        requires: &[&str],
        run: DaemonFn,
        ready: ProbeFn,
    ) -> Self {
        Self {
            name: name.into(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            body: UnitBody::Daemon { run, ready },
        }
    }

    pub fn oneshot(name: impl Into<String>, requires: &[&str], run: OneshotFn) -> Self {
        Self {
            name: name.into(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            body: UnitBody::Oneshot {
                run,
                until_success: None,
            },
        }
    }

    pub fn oneshot_until_success(
        name: impl Into<String>,
        requires: &[&str],
        run: OneshotFn,
        window: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            body: UnitBody::Oneshot {
                run,
                until_success: Some(window),
            },
        }
    }

    pub fn health_check(name: impl Into<String>, requires: &[&str], probe: ProbeFn) -> Self {
        Self {
            name: name.into(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            body: UnitBody::HealthCheck { probe },
        }
    }
}
