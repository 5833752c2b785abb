// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cancellable retry combinator.
//!
//! Every retry site in the service (wallet unlock, readiness polls, DNS
//! resolution, `until_success` oneshots) goes through [`Retry::run`] instead
//! of hand-rolling a sleep/abort loop. The token is re-checked at every
//! iteration boundary, not only at the start.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Retry policy: bounded attempts and/or a wall-clock deadline.
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    max_attempts: Option<u32>,
    interval: Duration,
    timeout: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("cancelled")]
    Cancelled,

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("timed out: {last}")]
    TimedOut { last: E },
}

impl Default for Retry {
    fn default() -> Self {
        Self::new()
    }
}

impl Retry {
    pub fn new() -> Self {
        Self {
            max_attempts: None,
            interval: Duration::from_secs(1),
            timeout: None,
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `op` until it succeeds, the policy is exhausted, or the token
    /// fires.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            attempts += 1;
            let last = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if let Some(max) = self.max_attempts {
                if attempts >= max {
                    return Err(RetryError::Exhausted { attempts, last });
                }
            }
            if let Some(deadline) = deadline {
                if Instant::now() + self.interval >= deadline {
                    return Err(RetryError::TimedOut { last });
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            }
        }
    }
}
