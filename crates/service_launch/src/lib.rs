//! Service Launch Orchestrator
//!
//! Starts externally-provided local web services on demand, supervises
//! their startup without blocking the caller, and reports a single
//! terminal outcome per launch attempt.
//!
//! # Overview
//!
//! - Define services in a YAML service file (command, working directory,
//!   ready URL, probe policy)
//! - Launch a service as a supervised child process
//! - Probe its endpoint until it is ready, or give up on timeout
//! - De-duplicate concurrent launches per service id
//! - Terminate every supervised process at teardown
//!
//! # Example Service File
//!
//! ```yaml
//! version: "1.0"
//!
//! services:
//!   sign-web:
//!     command: ["python3", "-m", "http.server", "5501"]
//!     artifact: "sign_to_speech/index.html"
//!     ready_url: "http://127.0.0.1:5501/sign_to_speech/index.html"
//!
//!   speech-app:
//!     command: ["python3", "speech_to_sign_app.py"]
//!     working_dir: "speech_to_sign"
//!     ready_url: "http://127.0.0.1:8000/"
//!     probe:
//!       policy: fixed-delay
//!       delay_ms: 4000
//! ```

pub mod cli;
pub mod config;
pub mod runtime;

pub use cli::LaunchArgs;
pub use config::{ProbeConfig, ServiceFile, ServiceFileError, ServiceSpec};
pub use runtime::{
    LaunchHandle, LaunchOutcome, LaunchRegistry, LaunchStatus, Launcher, LauncherConfig,
    ProbePolicy, ProbeVerdict, SpawnError, SupervisedProcess, CANCELLED_REASON,
};
