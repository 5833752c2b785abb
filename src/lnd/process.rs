// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Spawning and supervising the wrapped daemon binary.
//!
//! The primary instance is owned by the lifecycle graph; short-lived
//! instances back the init and password-change flows, which must run
//! against a daemon that is not yet (or must not be) the serving one.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::lifecycle::retry::{Retry, RetryError};
use crate::lifecycle::StartError;

/// How to launch the daemon.
#[derive(Debug, Clone)]
pub struct LndLaunch {
    pub bin: String,
    pub data_dir: PathBuf,
    pub rest_port: u16,
    /// Extra flags, e.g. `--reset-wallet-transactions`.
    pub extra_args: Vec<String>,
}

impl LndLaunch {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![format!("--lnddir={}", self.data_dir.display())];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// A running daemon process.
#[derive(Debug)]
pub struct LndProcess {
    child: Child,
}

impl LndProcess {
    pub fn spawn(launch: &LndLaunch) -> std::io::Result<Self> {
        let child = Command::new(&launch.bin)
            .args(launch.args())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        info!(bin = %launch.bin, pid = child.id(), "daemon spawned");
        Ok(Self { child })
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }

    /// Kill and reap the process.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "failed to kill daemon process");
        }
    }
}

/// Readiness probe for the daemon: TCP connect to the local REST port.
pub async fn rest_port_open(port: u16) -> bool {
    TcpStream::connect(("127.0.0.1", port)).await.is_ok()
}

/// Poll the REST port until it listens, bounded by `attempts` at
/// `interval` spacing.
pub async fn wait_rest_listening(
    port: u16,
    attempts: u32,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), StartError> {
    let retry = Retry::new().max_attempts(attempts).interval(interval);
    retry
        .run(cancel, || async {
            if rest_port_open(port).await {
                Ok(())
            } else {
                Err(format!("port {port} is not listening"))
            }
        })
        .await
        .map_err(|e| match e {
            RetryError::Cancelled => StartError::UnitFailed {
                unit: "readiness".to_string(),
                message: "cancelled while waiting for REST port".to_string(),
            },
            RetryError::Exhausted { attempts, last } => StartError::UnitFailed {
                unit: "readiness".to_string(),
                message: format!("REST port not ready after {attempts} attempts: {last}"),
            },
            RetryError::TimedOut { last } => StartError::UnitFailed {
                unit: "readiness".to_string(),
                message: format!("REST port not ready: {last}"),
            },
        })
}

/// Run `f` against a short-lived daemon instance: spawn, run, kill.
///
/// The instance is killed whether `f` succeeds, fails, or the token fires;
/// the daemon flushes wallet state before answering the RPCs used here, so
/// a hard kill afterwards is safe.
pub async fn with_temp_instance<T, F, Fut>(
    launch: &LndLaunch,
    cancel: &CancellationToken,
    f: F,
) -> Result<T, StartError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, StartError>>,
{
    let process = LndProcess::spawn(launch)?;

    let result = tokio::select! {
        result = f() => result,
        _ = cancel.cancelled() => Err(StartError::UnitFailed {
            unit: "temp-instance".to_string(),
            message: "cancelled".to_string(),
        }),
    };

    process.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn launch_args_include_data_dir_and_extras() {
        let launch = LndLaunch {
            bin: "lnd".to_string(),
            data_dir: PathBuf::from("/root/.lnd"),
            rest_port: 8080,
            extra_args: vec!["--reset-wallet-transactions".to_string()],
        };
        assert_eq!(
            launch.args(),
            vec![
                "--lnddir=/root/.lnd".to_string(),
                "--reset-wallet-transactions".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn readiness_succeeds_once_port_listens() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let cancel = CancellationToken::new();
        wait_rest_listening(port, 3, Duration::from_millis(10), &cancel)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn readiness_gives_up_on_closed_port() {
        // Bind and drop to get a (very likely) closed port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let cancel = CancellationToken::new();
        let result = wait_rest_listening(port, 2, Duration::from_millis(5), &cancel).await;
        assert!(matches!(result, Err(StartError::UnitFailed { .. })));
    }

    #[tokio::test]
    async fn readiness_observes_cancellation() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = wait_rest_listening(port, 100, Duration::from_secs(5), &cancel).await;
        assert!(matches!(result, Err(StartError::UnitFailed { .. })));
    }
}
