//! Registry of in-flight and running launches
//!
//! Guarantees at most one live launch per service id: a second request for
//! the same id while a launch is in flight (or its service is still
//! running) shares the existing handle instead of spawning a duplicate.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ServiceSpec;
use crate::runtime::launcher::{
    spawn_driver, LaunchHandle, LaunchOutcome, LaunchStatus, LauncherConfig,
};

struct LaunchRecord {
    handle: LaunchHandle,
    task: Option<JoinHandle<()>>,
}

impl LaunchRecord {
    /// A record is live while its outcome is pending, or while a ready
    /// service's process is still running.
    fn is_live(&self) -> bool {
        match self.handle.outcome() {
            None => true,
            Some(LaunchOutcome::Ready { .. }) => self.handle.status() == LaunchStatus::Ready,
            Some(_) => false,
        }
    }
}

/// Tracks at most one live launch per service id
pub struct LaunchRegistry {
    config: LauncherConfig,
    records: Mutex<HashMap<String, LaunchRecord>>,
}

impl LaunchRegistry {
    pub fn new(config: LauncherConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Request a launch for `id`. If a live launch already exists its
    /// handle is returned unchanged; otherwise a fresh attempt starts.
    pub async fn request_launch(&self, id: &str, spec: ServiceSpec) -> LaunchHandle {
        let mut records = self.records.lock().await;

        if let Some(record) = records.get(id) {
            if record.is_live() {
                log::debug!("[{}] Launch already active, sharing handle", id);
                return record.handle.clone();
            }
        }

        let (handle, task) = spawn_driver(id.to_string(), spec, self.config.stop_grace);
        records.insert(
            id.to_string(),
            LaunchRecord {
                handle: handle.clone(),
                task: Some(task),
            },
        );
        handle
    }

    /// Cancel the launch for `id`, if one is tracked
    pub async fn cancel(&self, id: &str) -> bool {
        let records = self.records.lock().await;
        match records.get(id) {
            Some(record) => {
                record.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of all currently live launches
    pub async fn active_ids(&self) -> Vec<String> {
        let records = self.records.lock().await;
        records
            .iter()
            .filter(|(_, record)| record.is_live())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Terminate every tracked service and wait for the drivers to finish,
    /// bounded by `grace` per launch. After this returns no supervised
    /// child is left running.
    pub async fn shutdown_all(&self, grace: Duration) {
        let mut records = self.records.lock().await;
        log::info!("Shutting down {} tracked launches...", records.len());

        for record in records.values() {
            record.handle.cancel();
        }

        for (id, record) in records.iter_mut() {
            if let Some(task) = record.task.take() {
                if tokio::time::timeout(grace, task).await.is_err() {
                    log::warn!("[{}] Driver did not stop within grace period", id);
                }
            }
        }

        records.clear();
        log::info!("All launches shut down");
    }
}
