// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Restart seam between the action surface and the service runtime.
//!
//! Two actions (password rotation, auto-unlock toggling) restart the
//! service as a side effect of `write`. The restart is asynchronous and may
//! itself fail; callers must roll back the just-written state when it does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("restart failed: {0}")]
    Failed(String),
}

/// Requests a restart of the whole service-start sequence.
#[async_trait]
pub trait ServiceController: Send + Sync {
    async fn restart(&self) -> Result<(), ControllerError>;
}

/// Controller backed by the run loop in `main`: cancels the current run
/// token, which the loop interprets as "rebuild the graph and start again".
#[derive(Debug, Default)]
pub struct RestartHandle {
    requested: AtomicBool,
    current: Mutex<Option<CancellationToken>>,
}

impl RestartHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the token of the run about to start.
    pub fn arm(&self, token: CancellationToken) {
        *self.current.lock().expect("restart handle lock") = Some(token);
        self.requested.store(false, Ordering::SeqCst);
    }

    /// Consume a pending restart request.
    pub fn take_requested(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceController for RestartHandle {
    async fn restart(&self) -> Result<(), ControllerError> {
        let token = self
            .current
            .lock()
            .expect("restart handle lock")
            .clone()
            .ok_or_else(|| ControllerError::Failed("service is not running".to_string()))?;
        self.requested.store(true, Ordering::SeqCst);
        token.cancel();
        Ok(())
    }
}
