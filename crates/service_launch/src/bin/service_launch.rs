//! Service launch CLI
//!
//! Usage:
//!   service_launch services.yaml
//!   service_launch services.yaml -s sign-web
//!   service_launch services.yaml --validate

use service_launch::{LaunchArgs, LaunchOutcome, LaunchRegistry, LauncherConfig, ServiceFile};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    let env = env_logger::Env::default().default_filter_or(log_level);
    env_logger::init_from_env(env);

    // Load service file
    log::info!("Loading service file: {}", args.service_file);
    let service_file = match ServiceFile::from_file(&args.service_file) {
        Ok(sf) => sf,
        Err(e) => {
            log::error!("Failed to load service file: {}", e);
            std::process::exit(1);
        }
    };

    // Validate only mode
    if args.validate {
        println!("Service file '{}' is valid", args.service_file);
        println!("  Version: {}", service_file.version);
        println!("  Services: {}", service_file.service_ids().join(", "));
        return;
    }

    // Resolve which services to launch
    let ids: Vec<String> = match args.selected() {
        Some(selected) => {
            for id in selected {
                if !service_file.services.contains_key(id) {
                    log::error!("Unknown service '{}'", id);
                    std::process::exit(1);
                }
            }
            selected.to_vec()
        }
        None => service_file.service_ids(),
    };

    let registry = Arc::new(LaunchRegistry::new(LauncherConfig::default()));

    // Create shutdown channel and Ctrl+C handler
    let (shutdown_tx, mut shutdown_rx) = watch::channel(());
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, initiating shutdown...");
        let _ = shutdown_tx.send(());
    })
    .expect("Error setting Ctrl+C handler");

    // Launch services and report each outcome
    let mut any_ready = false;
    for id in &ids {
        let spec = service_file.services[id].clone();
        let handle = registry.request_launch(id, spec).await;

        match handle.wait().await {
            LaunchOutcome::Ready { url } => {
                log::info!("[{}] Running at {}", id, url);
                any_ready = true;
                if !args.no_open {
                    if let Err(e) = open::that(&url) {
                        log::warn!("[{}] Could not open browser: {}", id, e);
                    }
                }
            }
            LaunchOutcome::TimedOut => {
                log::error!("[{}] Did not become ready in time", id);
            }
            LaunchOutcome::Failed {
                reason,
                exit_code,
                log_tail,
            } => {
                log::error!("[{}] Launch failed: {} (exit code: {:?})", id, reason, exit_code);
                for line in log_tail {
                    log::error!("[{}] | {}", id, line);
                }
            }
        }
    }

    if !any_ready {
        registry.shutdown_all(Duration::from_secs(10)).await;
        std::process::exit(1);
    }

    // Keep the services running until Ctrl+C
    log::info!("Services running; press Ctrl+C to stop");
    let _ = shutdown_rx.changed().await;

    registry.shutdown_all(Duration::from_secs(10)).await;
    log::info!("Service launcher exiting");
}
