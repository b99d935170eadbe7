//! Launch driver: one task per attempt, one terminal outcome
//!
//! The driver task owns the supervised process for the whole attempt. The
//! caller observes progress through cloneable watch channels, so spawn,
//! probing and termination never block the calling task.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ServiceSpec;
use crate::runtime::probe::{self, ProbePolicy, ProbeVerdict};
use crate::runtime::process::SupervisedProcess;

/// Reason string carried by a caller-initiated cancellation
pub const CANCELLED_REASON: &str = "cancelled";

/// Cadence for liveness checks on a ready, parked service
const PARK_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Terminal result of a launch attempt, produced exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The service is up and serving at `url`
    Ready { url: String },
    /// The launch failed; `log_tail` carries captured child output when
    /// the process got far enough to produce any
    Failed {
        reason: String,
        exit_code: Option<i32>,
        log_tail: Vec<String>,
    },
    /// The process stayed alive but never became reachable in time
    TimedOut,
}

impl LaunchOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, LaunchOutcome::Ready { .. })
    }

    fn failed(reason: impl Into<String>) -> Self {
        LaunchOutcome::Failed {
            reason: reason.into(),
            exit_code: None,
            log_tail: Vec::new(),
        }
    }
}

/// Coarse state of a launch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStatus {
    /// Spawning the child process
    Starting,
    /// Child spawned, waiting for readiness
    Probing,
    /// Service is up; the process stays alive for the caller to use
    Ready,
    /// The attempt failed or timed out
    Failed,
    /// A previously ready service has exited or been stopped
    Stopped,
}

/// Caller-side view of a launch attempt.
///
/// Cheap to clone; every clone observes the same status and outcome.
#[derive(Debug, Clone)]
pub struct LaunchHandle {
    service_id: String,
    status_rx: watch::Receiver<LaunchStatus>,
    outcome_rx: watch::Receiver<Option<LaunchOutcome>>,
    cancel_tx: watch::Sender<bool>,
}

impl LaunchHandle {
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Current status snapshot
    pub fn status(&self) -> LaunchStatus {
        *self.status_rx.borrow()
    }

    /// Terminal outcome, if the attempt has resolved
    pub fn outcome(&self) -> Option<LaunchOutcome> {
        self.outcome_rx.borrow().clone()
    }

    /// Abandon the launch. Mid-flight this terminates the process and
    /// resolves the outcome as `Failed("cancelled")`; after `Ready` it
    /// stops the running service.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Wait for the terminal outcome
    pub async fn wait(&self) -> LaunchOutcome {
        let mut rx = self.outcome_rx.clone();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // driver went away without publishing
                return LaunchOutcome::failed(CANCELLED_REASON);
            }
        }
    }
}

/// Launcher configuration
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Grace period between SIGTERM and SIGKILL when stopping a child
    pub stop_grace: Duration,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(5),
        }
    }
}

/// Starts launch attempts and hands back observable handles
pub struct Launcher {
    config: LauncherConfig,
}

impl Launcher {
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }

    /// Start a launch attempt; returns immediately with a handle
    pub fn launch(&self, id: &str, spec: ServiceSpec) -> LaunchHandle {
        let (handle, _task) = spawn_driver(id.to_string(), spec, self.config.stop_grace);
        handle
    }
}

/// Spawn the driver task for one launch attempt
pub(crate) fn spawn_driver(
    id: String,
    spec: ServiceSpec,
    stop_grace: Duration,
) -> (LaunchHandle, JoinHandle<()>) {
    let (status_tx, status_rx) = watch::channel(LaunchStatus::Starting);
    let (outcome_tx, outcome_rx) = watch::channel(None);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let handle = LaunchHandle {
        service_id: id.clone(),
        status_rx,
        outcome_rx,
        cancel_tx: cancel_tx.clone(),
    };

    let task = tokio::spawn(drive(id, spec, stop_grace, status_tx, outcome_tx, cancel_rx));
    (handle, task)
}

async fn drive(
    id: String,
    spec: ServiceSpec,
    stop_grace: Duration,
    status_tx: watch::Sender<LaunchStatus>,
    outcome_tx: watch::Sender<Option<LaunchOutcome>>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let mut process = match SupervisedProcess::spawn(&id, &spec) {
        Ok(process) => process,
        Err(e) => {
            // no process was created, so there is nothing to probe or clean up
            log::error!("[{}] Spawn failed: {}", id, e);
            let _ = status_tx.send(LaunchStatus::Failed);
            let _ = outcome_tx.send(Some(LaunchOutcome::failed(e.to_string())));
            return;
        }
    };

    let _ = status_tx.send(LaunchStatus::Probing);

    let (host, port) = match spec.ready_target() {
        Ok(target) => target,
        Err(e) => {
            log::error!("[{}] Invalid ready URL: {}", id, e);
            process.stop(stop_grace).await;
            let _ = status_tx.send(LaunchStatus::Failed);
            let _ = outcome_tx.send(Some(LaunchOutcome::failed(e.to_string())));
            return;
        }
    };

    let policy = ProbePolicy::from(&spec.probe);
    let verdict = probe::await_ready(&mut process, &host, port, policy, &mut cancel_rx).await;

    match verdict {
        ProbeVerdict::Ready => {
            log::info!("[{}] Ready at {}", id, spec.ready_url);
            let _ = status_tx.send(LaunchStatus::Ready);
            let _ = outcome_tx.send(Some(LaunchOutcome::Ready {
                url: spec.ready_url.clone(),
            }));
            park(&id, &mut process, stop_grace, &status_tx, &mut cancel_rx).await;
        }
        ProbeVerdict::TimedOut => {
            log::warn!("[{}] Readiness probe timed out", id);
            process.stop(stop_grace).await;
            let _ = status_tx.send(LaunchStatus::Failed);
            let _ = outcome_tx.send(Some(LaunchOutcome::TimedOut));
        }
        ProbeVerdict::Exited(code) => {
            log::warn!("[{}] Process exited before becoming ready: {:?}", id, code);
            // already exited; stop just reaps and drains the output readers
            process.stop(stop_grace).await;
            let _ = status_tx.send(LaunchStatus::Failed);
            let _ = outcome_tx.send(Some(LaunchOutcome::Failed {
                reason: "exited before ready".to_string(),
                exit_code: code,
                log_tail: process.log_tail(),
            }));
        }
        ProbeVerdict::Cancelled => {
            log::info!("[{}] Launch cancelled", id);
            process.stop(stop_grace).await;
            let _ = status_tx.send(LaunchStatus::Failed);
            let _ = outcome_tx.send(Some(LaunchOutcome::failed(CANCELLED_REASON)));
        }
    }
}

/// Keep a ready service under supervision until it exits or is stopped
async fn park(
    id: &str,
    process: &mut SupervisedProcess,
    stop_grace: Duration,
    status_tx: &watch::Sender<LaunchStatus>,
    cancel_rx: &mut watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    process.stop(stop_grace).await;
                    let _ = status_tx.send(LaunchStatus::Stopped);
                    return;
                }
            }
            _ = tokio::time::sleep(PARK_CHECK_INTERVAL) => {
                if let Some(code) = process.check_exit() {
                    log::info!("[{}] Service exited with code: {:?}", id, code);
                    let _ = status_tx.send(LaunchStatus::Stopped);
                    return;
                }
            }
        }
    }
}
