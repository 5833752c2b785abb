// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Dependency-gated execution of the unit graph.
//!
//! ## Rules
//!
//! - A unit starts only after every unit it `requires` reaches a success
//!   terminal state (daemon ready, oneshot done, health check first
//!   success). Beyond those edges no ordering is guaranteed.
//! - Daemons run until cancellation; a daemon body returning earlier is
//!   fatal and tears the whole graph down. There is no respawn here; a
//!   full service restart is the surrounding manager's job.
//! - Oneshots run once; in `until_success` mode the body is retried on the
//!   gate interval until success or the window elapses.
//! - Health checks are polled on the gate interval only until their first
//!   success (dependency gating); the external health surface polls the
//!   same probes on its own cadence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::retry::{Retry, RetryError};
use super::unit::{Unit, UnitBody, UnitState};
use super::StartError;

const DEFAULT_GATE_INTERVAL: Duration = Duration::from_secs(2);

/// Read-only view of every unit's current state.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    receivers: Arc<std::sync::Mutex<HashMap<String, watch::Receiver<UnitState>>>>,
}

impl StatusBoard {
    fn insert(&self, name: &str, rx: watch::Receiver<UnitState>) {
        self.receivers
            .lock()
            .expect("status board lock")
            .insert(name.to_string(), rx);
    }

    /// Current state of every unit, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, UnitState)> {
        let mut entries: Vec<(String, UnitState)> = self
            .receivers
            .lock()
            .expect("status board lock")
            .iter()
            .map(|(name, rx)| (name.clone(), rx.borrow().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// The lifecycle graph executor. Assembled fresh for every start attempt.
pub struct Executor {
    units: Vec<(Unit, Arc<watch::Sender<UnitState>>)>,
    board: StatusBoard,
    gate_interval: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self {
            units: Vec::new(),
            board: StatusBoard::default(),
            gate_interval: DEFAULT_GATE_INTERVAL,
        }
    }

    /// Shrink the readiness/health gate polling interval (tests).
    pub fn gate_interval(mut self, interval: Duration) -> Self {
        self.gate_interval = interval;
        self
    }

    pub fn add(&mut self, unit: Unit) -> &mut Self {
        let (tx, rx) = watch::channel(UnitState::Pending);
        self.board.insert(&unit.name, rx);
        self.units.push((unit, Arc::new(tx)));
        self
    }

    pub fn status_board(&self) -> StatusBoard {
        self.board.clone()
    }

    /// Run every unit to its terminal state.
    ///
    /// Returns Ok when the graph winds down through cancellation (or all
    /// units complete); returns the first fatal error otherwise, after
    /// cancelling the token to tear down sibling units.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), StartError> {
        self.validate()?;

        let receivers: HashMap<String, watch::Receiver<UnitState>> = self
            .units
            .iter()
            .map(|(unit, tx)| (unit.name.clone(), tx.subscribe()))
            .collect();

        let mut tasks = JoinSet::new();
        for (unit, tx) in self.units {
            let deps: Vec<(String, watch::Receiver<UnitState>)> = unit
                .requires
                .iter()
                .map(|name| (name.clone(), receivers[name].clone()))
                .collect();
            tasks.spawn(run_unit(
                unit,
                tx,
                deps,
                cancel.clone(),
                self.gate_interval,
            ));
        }

        let mut first_error: Option<StartError> = None;
        while let Some(joined) = tasks.join_next().await {
            let unit_result = match joined {
                Ok(r) => r,
                Err(e) => Err(StartError::UnitFailed {
                    unit: "<panicked>".to_string(),
                    message: e.to_string(),
                }),
            };
            if let Err(e) = unit_result {
                warn!(error = %e, "lifecycle unit failed, tearing down");
                cancel.cancel();
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn validate(&self) -> Result<(), StartError> {
        let mut names = std::collections::HashSet::new();
        for (unit, _) in &self.units {
            if !names.insert(unit.name.as_str()) {
                return Err(StartError::InvalidGraph(format!(
                    "duplicate unit name {}",
                    unit.name
                )));
            }
        }
        let edges: HashMap<&str, &Vec<String>> = self
            .units
            .iter()
            .map(|(unit, _)| (unit.name.as_str(), &unit.requires))
            .collect();
        for (unit, _) in &self.units {
            for dep in &unit.requires {
                if !names.contains(dep.as_str()) {
                    return Err(StartError::InvalidGraph(format!(
                        "unit {} requires unknown unit {dep}",
                        unit.name
                    )));
                }
            }
        }

        // Cycle detection: 0 = unvisited, 1 = on stack, 2 = done.
        let mut color: HashMap<&str, u8> = HashMap::new();
        fn visit<'a>(
            name: &'a str,
            edges: &HashMap<&'a str, &'a Vec<String>>,
            color: &mut HashMap<&'a str, u8>,
        ) -> Result<(), StartError> {
            match color.get(name) {
                Some(1) => {
                    return Err(StartError::InvalidGraph(format!(
                        "dependency cycle through unit {name}"
                    )))
                }
                Some(2) => return Ok(()),
                _ => {}
            }
            color.insert(name, 1);
            for dep in edges[name] {
                visit(dep.as_str(), edges, color)?;
            }
            color.insert(name, 2);
            Ok(())
        }
        for (unit, _) in &self.units {
            visit(unit.name.as_str(), &edges, &mut color)?;
        }
        Ok(())
    }
}

async fn run_unit(
    unit: Unit,
    tx: Arc<watch::Sender<UnitState>>,
    deps: Vec<(String, watch::Receiver<UnitState>)>,
    cancel: CancellationToken,
    gate: Duration,
) -> Result<(), StartError> {
    let name = unit.name.clone();

    for (dep_name, mut rx) in deps {
        let dep_ok = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            changed = rx.wait_for(|s| s.satisfies_dependents() || s.is_failed()) => {
                match changed {
                    Ok(state) => !state.is_failed(),
                    Err(_) => false,
                }
            }
        };
        if !dep_ok {
            // The graph is coming down; leave this unit pending.
            info!(unit = %name, dep = %dep_name, "dependency failed, unit not started");
            return Ok(());
        }
    }
    if cancel.is_cancelled() {
        return Ok(());
    }

    tx.send_replace(UnitState::Running);
    info!(unit = %name, "unit started");

    match unit.body {
        UnitBody::Daemon { run, ready } => {
            let mut body = run(cancel.clone());
            let mut is_ready = false;
            loop {
                tokio::select! {
                    result = &mut body => {
                        if cancel.is_cancelled() {
                            tx.send_replace(UnitState::Done);
                            return Ok(());
                        }
                        return match result {
                            Ok(()) => {
                                tx.send_replace(UnitState::Failed(
                                    "daemon exited unexpectedly".to_string(),
                                ));
                                Err(StartError::DaemonExited { unit: name })
                            }
                            Err(e) => {
                                tx.send_replace(UnitState::Failed(e.to_string()));
                                Err(e)
                            }
                        };
                    }
                    _ = tokio::time::sleep(gate), if !is_ready => {
                        if ready().await.is_success() {
                            is_ready = true;
                            tx.send_replace(UnitState::Ready);
                            info!(unit = %name, "daemon ready");
                        }
                    }
                }
            }
        }
        UnitBody::Oneshot {
            mut run,
            until_success,
        } => {
            let result = match until_success {
                None => run(cancel.clone()).await,
                Some(window) => {
                    let retry = Retry::new().interval(gate).timeout(window);
                    retry
                        .run(&cancel, || run(cancel.clone()))
                        .await
                        .map_err(|e| match e {
                            RetryError::Cancelled => StartError::UnitFailed {
                                unit: name.clone(),
                                message: "cancelled".to_string(),
                            },
                            RetryError::Exhausted { attempts, last } => StartError::UnitFailed {
                                unit: name.clone(),
                                message: format!("gave up after {attempts} attempts: {last}"),
                            },
                            RetryError::TimedOut { last } => StartError::UnitFailed {
                                unit: name.clone(),
                                message: format!("timed out: {last}"),
                            },
                        })
                }
            };
            match result {
                Ok(()) => {
                    tx.send_replace(UnitState::Done);
                    info!(unit = %name, "oneshot complete");
                    Ok(())
                }
                Err(_) if cancel.is_cancelled() => {
                    tx.send_replace(UnitState::Done);
                    Ok(())
                }
                Err(e) => {
                    tx.send_replace(UnitState::Failed(e.to_string()));
                    Err(e)
                }
            }
        }
        UnitBody::HealthCheck { probe } => loop {
            let result = probe().await;
            if result.is_success() {
                tx.send_replace(UnitState::Ready);
                info!(unit = %name, "health check satisfied");
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(gate) => {}
                _ = cancel.cancelled() => {
                    tx.send_replace(UnitState::Done);
                    return Ok(());
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::unit::{HealthResult, Unit};
    use rand::Rng;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::time::sleep;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Started(String),
        Finished(String),
    }

    type Log = Arc<Mutex<Vec<Event>>>;

    fn logging_oneshot(name: &str, requires: &[&str], log: Log, delay: Duration) -> Unit {
        let unit_name = name.to_string();
        Unit::oneshot(
            name,
            requires,
            Box::new(move |_cancel| {
                let log = log.clone();
                let unit_name = unit_name.clone();
                Box::pin(async move {
                    log.lock().unwrap().push(Event::Started(unit_name.clone()));
                    sleep(delay).await;
                    log.lock().unwrap().push(Event::Finished(unit_name));
                    Ok(())
                })
            }),
        )
    }

    fn assert_ordered(log: &[Event], before: &str, after: &str) {
        let finished = log
            .iter()
            .position(|e| *e == Event::Finished(before.to_string()))
            .unwrap_or_else(|| panic!("{before} never finished"));
        let started = log
            .iter()
            .position(|e| *e == Event::Started(after.to_string()))
            .unwrap_or_else(|| panic!("{after} never started"));
        assert!(
            finished < started,
            "{after} started before {before} finished: {log:?}"
        );
    }

    #[tokio::test]
    async fn requires_edges_hold_under_random_completion_orderings() {
        for _ in 0..8 {
            let log: Log = Arc::new(Mutex::new(Vec::new()));
            let mut rng = rand::rng();
            let delay = |rng: &mut rand::rngs::ThreadRng| {
                Duration::from_millis(rng.random_range(1..20))
            };

            let mut executor = Executor::new().gate_interval(Duration::from_millis(5));
            executor.add(logging_oneshot("b", &[], log.clone(), delay(&mut rng)));
            executor.add(logging_oneshot("c", &[], log.clone(), delay(&mut rng)));
            executor.add(logging_oneshot("a", &["b"], log.clone(), delay(&mut rng)));
            executor.add(logging_oneshot("d", &["a", "c"], log.clone(), delay(&mut rng)));
            executor.add(logging_oneshot("e", &[], log.clone(), delay(&mut rng)));

            executor.run(CancellationToken::new()).await.unwrap();

            let log = log.lock().unwrap().clone();
            assert_ordered(&log, "b", "a");
            assert_ordered(&log, "a", "d");
            assert_ordered(&log, "c", "d");
        }
    }

    #[tokio::test]
    async fn daemon_readiness_gates_dependents() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let ready_flag = Arc::new(AtomicBool::new(false));

        let flag_in_daemon = ready_flag.clone();
        let daemon = Unit::daemon(
            "primary",
            &[],
            Box::new(move |cancel| {
                let flag = flag_in_daemon.clone();
                Box::pin(async move {
                    sleep(Duration::from_millis(30)).await;
                    flag.store(true, Ordering::SeqCst);
                    cancel.cancelled().await;
                    Ok(())
                })
            }),
            Arc::new({
                let flag = ready_flag.clone();
                move || {
                    let flag = flag.clone();
                    Box::pin(async move {
                        if flag.load(Ordering::SeqCst) {
                            HealthResult::success("listening")
                        } else {
                            HealthResult::loading("starting")
                        }
                    })
                }
            }),
        );

        let cancel = CancellationToken::new();
        let mut executor = Executor::new().gate_interval(Duration::from_millis(5));
        executor.add(daemon);
        executor.add(logging_oneshot(
            "dependent",
            &["primary"],
            log.clone(),
            Duration::from_millis(1),
        ));
        let board = executor.status_board();

        let runner = tokio::spawn(executor.run(cancel.clone()));

        // Dependent must not start before the daemon flips ready.
        sleep(Duration::from_millis(15)).await;
        assert!(log.lock().unwrap().is_empty());

        sleep(Duration::from_millis(120)).await;
        let log_now = log.lock().unwrap().clone();
        assert!(log_now.contains(&Event::Started("dependent".to_string())));
        assert!(board
            .snapshot()
            .iter()
            .any(|(name, state)| name == "primary" && *state == UnitState::Ready));

        cancel.cancel();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn daemon_exit_is_fatal() {
        let mut executor = Executor::new().gate_interval(Duration::from_millis(5));
        executor.add(Unit::daemon(
            "primary",
            &[],
            Box::new(|_cancel| Box::pin(async { Ok(()) })),
            Arc::new(|| Box::pin(async { HealthResult::loading("never") })),
        ));

        let result = executor.run(CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(StartError::DaemonExited { unit }) if unit == "primary"
        ));
    }

    #[tokio::test]
    async fn failed_unit_cancels_siblings() {
        let sibling_saw_cancel = Arc::new(AtomicBool::new(false));
        let flag = sibling_saw_cancel.clone();

        let mut executor = Executor::new().gate_interval(Duration::from_millis(5));
        executor.add(Unit::daemon(
            "sibling",
            &[],
            Box::new(move |cancel| {
                let flag = flag.clone();
                Box::pin(async move {
                    cancel.cancelled().await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                })
            }),
            Arc::new(|| Box::pin(async { HealthResult::success("up") })),
        ));
        executor.add(Unit::oneshot(
            "failing",
            &[],
            Box::new(|_cancel| {
                Box::pin(async {
                    Err(StartError::UnitFailed {
                        unit: "failing".to_string(),
                        message: "boom".to_string(),
                    })
                })
            }),
        ));

        let result = executor.run(CancellationToken::new()).await;
        assert!(result.is_err());
        assert!(sibling_saw_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn until_success_retries_until_window_or_success() {
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let attempts_in = attempts.clone();

        let mut executor = Executor::new().gate_interval(Duration::from_millis(2));
        executor.add(Unit::oneshot_until_success(
            "flaky",
            &[],
            Box::new(move |_cancel| {
                let attempts = attempts_in.clone();
                Box::pin(async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(StartError::UnitFailed {
                            unit: "flaky".to_string(),
                            message: "transient".to_string(),
                        })
                    } else {
                        Ok(())
                    }
                })
            }),
            Duration::from_secs(5),
        ));

        executor.run(CancellationToken::new()).await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn health_check_gates_dependent_oneshot() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let healthy = Arc::new(AtomicBool::new(false));

        let healthy_in = healthy.clone();
        let mut executor = Executor::new().gate_interval(Duration::from_millis(5));
        executor.add(Unit::health_check(
            "probe",
            &[],
            Arc::new(move || {
                let healthy = healthy_in.clone();
                Box::pin(async move {
                    if healthy.load(Ordering::SeqCst) {
                        HealthResult::success("ok")
                    } else {
                        HealthResult::loading("warming up")
                    }
                })
            }),
        ));
        executor.add(logging_oneshot(
            "gated",
            &["probe"],
            log.clone(),
            Duration::from_millis(1),
        ));

        let runner = tokio::spawn(executor.run(CancellationToken::new()));
        sleep(Duration::from_millis(20)).await;
        assert!(log.lock().unwrap().is_empty());

        healthy.store(true, Ordering::SeqCst);
        runner.await.unwrap().unwrap();
        assert!(log
            .lock()
            .unwrap()
            .contains(&Event::Started("gated".to_string())));
    }

    #[test]
    fn validation_rejects_unknown_and_cyclic_requires() {
        let mut executor = Executor::new();
        executor.add(Unit::oneshot(
            "a",
            &["ghost"],
            Box::new(|_| Box::pin(async { Ok(()) })),
        ));
        let err = futures_block(executor.run(CancellationToken::new()));
        assert!(matches!(err, Err(StartError::InvalidGraph(_))));

        let mut executor = Executor::new();
        executor.add(Unit::oneshot(
            "a",
            &["b"],
            Box::new(|_| Box::pin(async { Ok(()) })),
        ));
        executor.add(Unit::oneshot(
            "b",
            &["a"],
            Box::new(|_| Box::pin(async { Ok(()) })),
        ));
        let err = futures_block(executor.run(CancellationToken::new()));
        assert!(matches!(err, Err(StartError::InvalidGraph(_))));
    }

    fn futures_block<T>(fut: impl std::future::Future<Output = T>) -> T {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(fut)
    }
}
