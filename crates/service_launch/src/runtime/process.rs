//! Supervised child process abstraction

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::config::ServiceSpec;

/// Maximum number of captured output lines kept per process
const LOG_TAIL_LINES: usize = 100;

/// How long to wait for the output readers after the child has exited
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors that prevent a process from being created
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("artifact not found: {0}")]
    ArtifactMissing(PathBuf),

    #[error("working directory is not a directory: {0}")]
    BadWorkingDir(PathBuf),

    #[error("service '{0}' has an empty command")]
    EmptyCommand(String),

    #[error("failed to spawn '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A supervised child process.
///
/// Owned exclusively by the launch driver that created it. stdout and stderr
/// are drained continuously into a bounded tail buffer so the child never
/// blocks on a full pipe.
pub struct SupervisedProcess {
    name: String,
    child: Child,
    pid: Option<u32>,
    exit: Option<Option<i32>>,
    tail: Arc<Mutex<VecDeque<String>>>,
    readers: Vec<JoinHandle<()>>,
}

impl SupervisedProcess {
    /// Spawn a child process for the given service spec.
    ///
    /// Must be called from within a tokio runtime (output readers are
    /// spawned as tasks).
    pub fn spawn(name: &str, spec: &ServiceSpec) -> Result<Self, SpawnError> {
        if spec.command.is_empty() {
            return Err(SpawnError::EmptyCommand(name.to_string()));
        }

        if let Some(artifact) = &spec.artifact {
            if !artifact.exists() {
                return Err(SpawnError::ArtifactMissing(artifact.clone()));
            }
        }

        if let Some(dir) = &spec.working_dir {
            if !dir.is_dir() {
                return Err(SpawnError::BadWorkingDir(dir.clone()));
            }
        }

        log::info!("[{}] Starting: {}", name, spec.command.join(" "));

        let mut cmd = Command::new(&spec.command[0]);
        cmd.args(&spec.command[1..])
            .envs(&spec.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| SpawnError::Io {
            name: name.to_string(),
            source: e,
        })?;

        let pid = child.id();
        log::info!("[{}] Process started with PID: {:?}", name, pid);

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(LOG_TAIL_LINES)));
        let mut readers = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            let tail = tail.clone();
            readers.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    push_line(&tail, line);
                }
            }));
        }

        if let Some(stderr) = child.stderr.take() {
            let tail = tail.clone();
            readers.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    push_line(&tail, line);
                }
            }));
        }

        Ok(Self {
            name: name.to_string(),
            child,
            pid,
            exit: None,
            tail,
            readers,
        })
    }

    /// Process ID of the child, if it was captured at spawn time
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Non-blocking exit query: `Some(code)` once the process has exited
    pub fn check_exit(&mut self) -> Option<Option<i32>> {
        if let Some(code) = self.exit {
            return Some(code);
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                let code = status.code();
                log::info!("[{}] Process exited with code: {:?}", self.name, code);
                self.exit = Some(code);
                Some(code)
            }
            Ok(None) => None,
            Err(e) => {
                log::error!("[{}] Error checking process status: {}", self.name, e);
                None
            }
        }
    }

    /// Check if the process is still running
    pub fn is_alive(&mut self) -> bool {
        self.check_exit().is_none()
    }

    /// Stop the process gracefully (SIGTERM, then SIGKILL after the grace
    /// period). Idempotent once the process has exited.
    pub async fn stop(&mut self, grace: Duration) {
        if self.check_exit().is_none() {
            log::info!("[{}] Stopping process...", self.name);

            #[cfg(unix)]
            {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;

                if let Some(pid) = self.pid {
                    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                }
            }

            #[cfg(not(unix))]
            {
                let _ = self.child.start_kill();
            }

            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => {
                    let code = status.code();
                    log::info!("[{}] Process exited with code: {:?}", self.name, code);
                    self.exit = Some(code);
                }
                Ok(Err(e)) => {
                    log::error!("[{}] Error waiting for process: {}", self.name, e);
                    self.exit = Some(None);
                }
                Err(_) => {
                    log::warn!(
                        "[{}] Process did not exit gracefully, forcing kill",
                        self.name
                    );
                    let _ = self.child.start_kill();
                    match tokio::time::timeout(grace, self.child.wait()).await {
                        Ok(Ok(status)) => self.exit = Some(status.code()),
                        _ => self.exit = Some(None),
                    }
                }
            }
        }

        // Pipes hit EOF once the child is gone; collect the readers so the
        // tail buffer is complete before anyone snapshots it.
        for reader in self.readers.drain(..) {
            let _ = tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await;
        }
    }

    /// Snapshot of the most recent captured output lines
    pub fn log_tail(&self) -> Vec<String> {
        let tail = self.tail.lock().unwrap_or_else(|e| e.into_inner());
        tail.iter().cloned().collect()
    }
}

fn push_line(tail: &Arc<Mutex<VecDeque<String>>>, line: String) {
    let mut tail = tail.lock().unwrap_or_else(|e| e.into_inner());
    if tail.len() == LOG_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use std::collections::HashMap;

    fn sh_spec(script: &str) -> ServiceSpec {
        ServiceSpec {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            working_dir: None,
            env: HashMap::new(),
            artifact: None,
            ready_url: "http://127.0.0.1:1/".to_string(),
            probe: ProbeConfig::default(),
        }
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let spec = sh_spec("echo out; echo err >&2; exit 5");
        let mut process = SupervisedProcess::spawn("test", &spec).unwrap();

        let mut code = None;
        for _ in 0..100 {
            if let Some(c) = process.check_exit() {
                code = Some(c);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(code, Some(Some(5)));

        // drains the readers
        process.stop(Duration::from_secs(1)).await;

        let tail = process.log_tail();
        assert!(tail.contains(&"out".to_string()), "tail: {:?}", tail);
        assert!(tail.contains(&"err".to_string()), "tail: {:?}", tail);
    }

    #[tokio::test]
    async fn missing_artifact_is_rejected_before_spawn() {
        let mut spec = sh_spec("sleep 5");
        spec.artifact = Some(PathBuf::from("/nonexistent/artifact/index.html"));
        let result = SupervisedProcess::spawn("test", &spec);
        assert!(matches!(result, Err(SpawnError::ArtifactMissing(_))));
    }

    #[tokio::test]
    async fn stop_terminates_a_running_process() {
        let spec = sh_spec("sleep 30");
        let mut process = SupervisedProcess::spawn("test", &spec).unwrap();
        assert!(process.is_alive());

        process.stop(Duration::from_secs(2)).await;
        assert!(!process.is_alive());

        // idempotent
        process.stop(Duration::from_secs(2)).await;
    }
}
