//! Readiness probing for launched services

use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::config::ProbeConfig;
use crate::runtime::process::SupervisedProcess;

/// Per-attempt connect timeout under the polling policy
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Liveness check cadence while a fixed delay elapses, so an early exit
/// is reported without waiting out the full delay
const FIXED_DELAY_SLICE: Duration = Duration::from_secs(1);

/// Runtime form of a probe policy with resolved durations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePolicy {
    /// Wait, then declare readiness if the process is still alive
    FixedDelay { delay: Duration },
    /// Poll the endpoint until reachable or the timeout elapses
    Poll {
        interval: Duration,
        timeout: Duration,
    },
}

impl From<&ProbeConfig> for ProbePolicy {
    fn from(config: &ProbeConfig) -> Self {
        match *config {
            ProbeConfig::FixedDelay { delay_ms } => ProbePolicy::FixedDelay {
                delay: Duration::from_millis(delay_ms),
            },
            ProbeConfig::Poll {
                interval_ms,
                timeout_ms,
            } => ProbePolicy::Poll {
                interval: Duration::from_millis(interval_ms),
                timeout: Duration::from_millis(timeout_ms),
            },
        }
    }
}

/// Terminal verdict of a readiness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// The endpoint accepted a connection (or the fixed delay elapsed with
    /// the process alive)
    Ready,
    /// The endpoint never became reachable within the budget
    TimedOut,
    /// The process exited before becoming ready
    Exited(Option<i32>),
    /// The caller cancelled the launch
    Cancelled,
}

/// Wait until the service behind `process` is ready according to `policy`.
///
/// Never returns an error: every failure mode is folded into the verdict.
/// `cancel` flips to `true` when the caller abandons the launch.
pub async fn await_ready(
    process: &mut SupervisedProcess,
    host: &str,
    port: u16,
    policy: ProbePolicy,
    cancel: &mut watch::Receiver<bool>,
) -> ProbeVerdict {
    if *cancel.borrow() {
        return ProbeVerdict::Cancelled;
    }
    match policy {
        ProbePolicy::FixedDelay { delay } => fixed_delay(process, delay, cancel).await,
        ProbePolicy::Poll { interval, timeout } => {
            poll(process, host, port, interval, timeout, cancel).await
        }
    }
}

async fn fixed_delay(
    process: &mut SupervisedProcess,
    delay: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> ProbeVerdict {
    let deadline = Instant::now() + delay;
    loop {
        if let Some(code) = process.check_exit() {
            return ProbeVerdict::Exited(code);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    return ProbeVerdict::Cancelled;
                }
            }
            _ = tokio::time::sleep(remaining.min(FIXED_DELAY_SLICE)) => {}
        }
    }

    match process.check_exit() {
        None => ProbeVerdict::Ready,
        Some(code) => ProbeVerdict::Exited(code),
    }
}

async fn poll(
    process: &mut SupervisedProcess,
    host: &str,
    port: u16,
    interval: Duration,
    timeout: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> ProbeVerdict {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(code) = process.check_exit() {
            return ProbeVerdict::Exited(code);
        }

        if Instant::now() >= deadline {
            return ProbeVerdict::TimedOut;
        }

        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => return ProbeVerdict::Ready,
            Ok(Err(e)) => log::trace!("probe connect to {}:{} failed: {}", host, port, e),
            Err(_) => log::trace!("probe connect to {}:{} timed out", host, port),
        }

        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    return ProbeVerdict::Cancelled;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
