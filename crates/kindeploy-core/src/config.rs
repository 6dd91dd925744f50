use crate::error::{DeployError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ToolsConfig
// ---------------------------------------------------------------------------

/// Executables used for each external collaborator. Plain names are resolved
/// on PATH; absolute paths are used as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_docker")]
    pub docker: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
}

fn default_docker() -> String {
    "docker".to_string()
}

fn default_kind() -> String {
    "kind".to_string()
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            docker: default_docker(),
            kind: default_kind(),
            kubectl: default_kubectl(),
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Upper bound for the deployment to report `Available`.
    #[serde(default = "default_ready_secs")]
    pub ready_secs: u64,
    /// How long a fresh port-forward must survive before it counts as live.
    #[serde(default = "default_forward_grace_secs")]
    pub forward_grace_secs: u64,
    /// Liveness poll interval while forwarding.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Wait after SIGTERM before escalating to SIGKILL.
    #[serde(default = "default_terminate_grace_secs")]
    pub terminate_grace_secs: u64,
    /// Wait after SIGKILL before giving up on confirmation.
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,
}

fn default_ready_secs() -> u64 {
    180
}

fn default_forward_grace_secs() -> u64 {
    4
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_terminate_grace_secs() -> u64 {
    3
}

fn default_kill_grace_secs() -> u64 {
    2
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            ready_secs: default_ready_secs(),
            forward_grace_secs: default_forward_grace_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            terminate_grace_secs: default_terminate_grace_secs(),
            kill_grace_secs: default_kill_grace_secs(),
        }
    }
}

impl TimeoutsConfig {
    pub fn ready(&self) -> Duration {
        Duration::from_secs(self.ready_secs)
    }

    pub fn forward_grace(&self) -> Duration {
        Duration::from_secs(self.forward_grace_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.terminate_grace_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,
    #[serde(default = "default_secret_name")]
    pub secret_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Offered at the port prompt when the user just presses enter.
    #[serde(default = "default_port")]
    pub default_port: u16,
    /// Bind address for `kubectl port-forward --address`.
    #[serde(default = "default_forward_address")]
    pub forward_address: String,
    #[serde(default = "default_true")]
    pub auto_install: bool,
    #[serde(default = "default_true")]
    pub open_browser: bool,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

fn default_cluster_name() -> String {
    "go-cluster".to_string()
}

fn default_secret_name() -> String {
    "app-secret".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_forward_address() -> String {
    "0.0.0.0".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            secret_name: default_secret_name(),
            namespace: default_namespace(),
            default_port: default_port(),
            forward_address: default_forward_address(),
            auto_install: true,
            open_browser: true,
            tools: ToolsConfig::default(),
            timeouts: TimeoutsConfig::default(),
        }
    }
}

impl Config {
    /// Resolve the configuration source.
    ///
    /// Priority:
    /// 1. `explicit` (from `--config` / `KINDEPLOY_CONFIG`), which must exist
    /// 2. `kindeploy.yaml` in `cwd`
    /// 3. Built-in defaults
    ///
    /// Returns the config and the file it came from, if any.
    pub fn resolve(explicit: Option<&Path>, cwd: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(DeployError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }

        let local = cwd.join(paths::CONFIG_FILE);
        if local.is_file() {
            return Ok((Self::from_file(&local)?, Some(local)));
        }

        Ok((Self::default(), None))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        // An empty file is a valid "all defaults" config.
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Result<()> {
        paths::validate_resource_name("cluster_name", &self.cluster_name)?;
        paths::validate_resource_name("secret_name", &self.secret_name)?;
        paths::validate_resource_name("namespace", &self.namespace)?;

        if self.default_port == 0 {
            return Err(DeployError::Config(
                "default_port must be between 1 and 65535".to_string(),
            ));
        }
        if self.forward_address.parse::<IpAddr>().is_err() {
            return Err(DeployError::Config(format!(
                "forward_address '{}' is not an IP address",
                self.forward_address
            )));
        }
        if self.timeouts.ready_secs == 0 {
            return Err(DeployError::Config(
                "timeouts.ready_secs must be greater than zero".to_string(),
            ));
        }
        for (field, value) in [
            ("tools.docker", &self.tools.docker),
            ("tools.kind", &self.tools.kind),
            ("tools.kubectl", &self.tools.kubectl),
        ] {
            if value.trim().is_empty() {
                return Err(DeployError::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}
