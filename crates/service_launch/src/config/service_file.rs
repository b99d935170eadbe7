//! Service file YAML schema definitions

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use url::Url;

/// Root service file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceFile {
    /// Service file format version
    #[serde(default = "default_version")]
    pub version: String,

    /// Service definitions (ordered map for deterministic launch order)
    pub services: IndexMap<String, ServiceSpec>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Static description of a launchable service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Command line: executable followed by its arguments
    pub command: Vec<String>,

    /// Working directory for the process
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Environment variables specific to this service
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// File that must exist before the service can be launched
    /// (e.g. the static artifact a file server is expected to serve)
    #[serde(default)]
    pub artifact: Option<PathBuf>,

    /// URL the service serves once ready; the probe connects to its host:port
    pub ready_url: String,

    /// Readiness probe policy
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// Readiness probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum ProbeConfig {
    /// Wait a configured delay, then assume readiness if the process is alive.
    /// Simple but racy; kept for services with no reachable health signal.
    FixedDelay { delay_ms: u64 },

    /// Poll the ready URL until it accepts connections or the timeout elapses.
    /// Recommended default.
    Poll {
        #[serde(default = "default_interval_ms")]
        interval_ms: u64,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_interval_ms() -> u64 {
    250
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig::Poll {
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ServiceSpec {
    /// Resolve the host and port the readiness probe connects to
    pub fn ready_target(&self) -> Result<(String, u16), ServiceFileError> {
        let url = Url::parse(&self.ready_url).map_err(|e| {
            ServiceFileError::Validation(format!("invalid ready_url '{}': {}", self.ready_url, e))
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| {
                ServiceFileError::Validation(format!(
                    "ready_url '{}' has no host",
                    self.ready_url
                ))
            })?
            .to_string();
        let port = url.port_or_known_default().ok_or_else(|| {
            ServiceFileError::Validation(format!("ready_url '{}' has no port", self.ready_url))
        })?;
        Ok((host, port))
    }
}

impl ServiceFile {
    /// Load a service file from a YAML file
    pub fn from_file(path: &str) -> Result<Self, ServiceFileError> {
        let content = std::fs::read_to_string(path).map_err(|e| ServiceFileError::Io {
            path: path.to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a service file from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ServiceFileError> {
        let service_file: ServiceFile =
            serde_yaml::from_str(content).map_err(ServiceFileError::Parse)?;
        service_file.validate()?;
        Ok(service_file)
    }

    /// Validate the service file configuration
    pub fn validate(&self) -> Result<(), ServiceFileError> {
        for (id, spec) in &self.services {
            if spec.command.is_empty() {
                return Err(ServiceFileError::Validation(format!(
                    "Service '{}': 'command' must not be empty",
                    id
                )));
            }

            spec.ready_target().map_err(|e| {
                ServiceFileError::Validation(format!("Service '{}': {}", id, e))
            })?;

            if let ProbeConfig::Poll {
                interval_ms,
                timeout_ms,
            } = spec.probe
            {
                if interval_ms == 0 {
                    return Err(ServiceFileError::Validation(format!(
                        "Service '{}': probe interval_ms must be positive",
                        id
                    )));
                }
                if timeout_ms == 0 {
                    return Err(ServiceFileError::Validation(format!(
                        "Service '{}': probe timeout_ms must be positive",
                        id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Get all service ids in file order
    pub fn service_ids(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }
}

/// Errors that can occur when loading a service file
#[derive(Debug, thiserror::Error)]
pub enum ServiceFileError {
    #[error("Failed to read service file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse service file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_service_file() {
        let yaml = r#"
version: "1.0"
services:
  static-web:
    command: ["python3", "-m", "http.server", "5501"]
    ready_url: "http://127.0.0.1:5501/"
  app:
    command: ["python3", "app.py"]
    working_dir: "app"
    ready_url: "http://127.0.0.1:8000/"
    probe:
      policy: fixed-delay
      delay_ms: 4000
"#;
        let service_file = ServiceFile::from_yaml(yaml).unwrap();
        assert_eq!(service_file.services.len(), 2);
        assert!(service_file.services.contains_key("static-web"));

        let app = &service_file.services["app"];
        assert!(matches!(
            app.probe,
            ProbeConfig::FixedDelay { delay_ms: 4000 }
        ));
    }

    #[test]
    fn test_default_probe_is_polling() {
        let yaml = r#"
services:
  web:
    command: ["server"]
    ready_url: "http://localhost:9000/"
"#;
        let service_file = ServiceFile::from_yaml(yaml).unwrap();
        let web = &service_file.services["web"];
        assert!(matches!(
            web.probe,
            ProbeConfig::Poll {
                interval_ms: 250,
                timeout_ms: 10_000
            }
        ));
    }

    #[test]
    fn test_ready_target_resolution() {
        let yaml = r#"
services:
  web:
    command: ["server"]
    ready_url: "http://127.0.0.1:5501/sign_to_speech/index.html"
"#;
        let service_file = ServiceFile::from_yaml(yaml).unwrap();
        let target = service_file.services["web"].ready_target().unwrap();
        assert_eq!(target, ("127.0.0.1".to_string(), 5501));
    }

    #[test]
    fn test_ready_target_known_default_port() {
        let yaml = r#"
services:
  web:
    command: ["server"]
    ready_url: "http://localhost/"
"#;
        let service_file = ServiceFile::from_yaml(yaml).unwrap();
        let target = service_file.services["web"].ready_target().unwrap();
        assert_eq!(target.1, 80);
    }

    #[test]
    fn test_validation_empty_command() {
        let yaml = r#"
services:
  bad:
    command: []
    ready_url: "http://127.0.0.1:8000/"
"#;
        let result = ServiceFile::from_yaml(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_bad_url() {
        let yaml = r#"
services:
  bad:
    command: ["server"]
    ready_url: "not a url"
"#;
        let result = ServiceFile::from_yaml(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_zero_interval() {
        let yaml = r#"
services:
  bad:
    command: ["server"]
    ready_url: "http://127.0.0.1:8000/"
    probe:
      policy: poll
      interval_ms: 0
"#;
        let result = ServiceFile::from_yaml(yaml);
        assert!(result.is_err());
    }
}
