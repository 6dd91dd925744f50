use crate::runner::{CommandError, CommandOutput};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("'{tool}' not found in PATH")]
    ToolMissing { tool: String },

    #[error("failed to install {tool}: {reason}")]
    ToolInstallFailed { tool: String, reason: String },

    #[error("unsupported operating system: {0}")]
    UnsupportedPlatform(String),

    #[error("docker daemon is not reachable")]
    DaemonUnreachable {
        #[source]
        source: CommandError,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to build image '{image}'")]
    BuildFailed {
        image: String,
        #[source]
        source: CommandError,
    },

    #[error("kind cluster '{cluster}' is unavailable")]
    ClusterUnavailable {
        cluster: String,
        #[source]
        source: CommandError,
    },

    #[error("failed to load image '{image}' into kind cluster '{cluster}'")]
    ImageLoadFailed {
        image: String,
        cluster: String,
        #[source]
        source: CommandError,
    },

    #[error("failed to apply {manifest}")]
    ApplyFailed {
        manifest: String,
        #[source]
        source: CommandError,
    },

    #[error("failed to create secret '{secret}' from {env_file}")]
    SecretSyncFailed {
        secret: String,
        env_file: String,
        #[source]
        source: CommandError,
    },

    #[error("deployment '{deployment}' did not become ready within {timeout_secs}s")]
    ReadinessTimeout {
        deployment: String,
        app: String,
        namespace: String,
        timeout_secs: u64,
        output: Option<CommandOutput>,
    },

    #[error("port-forward for svc/{service} on port {port} {reason}")]
    ForwardingFailed {
        service: String,
        port: u16,
        reason: String,
        output: Option<CommandOutput>,
    },

    #[error("interrupted")]
    Interrupted,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, DeployError>;

impl DeployError {
    /// Map a runner failure into the taxonomy. A missing executable and an
    /// observed cancellation keep their own kinds regardless of the step.
    pub fn from_command(err: CommandError, kind: impl FnOnce(CommandError) -> Self) -> Self {
        match err {
            CommandError::Missing { program } => DeployError::ToolMissing { tool: program },
            CommandError::Cancelled { .. } => DeployError::Interrupted,
            other => kind(other),
        }
    }

    /// Captured stdout/stderr of the external command behind this failure.
    pub fn captured_output(&self) -> Option<&CommandOutput> {
        match self {
            DeployError::DaemonUnreachable { source }
            | DeployError::BuildFailed { source, .. }
            | DeployError::ClusterUnavailable { source, .. }
            | DeployError::ImageLoadFailed { source, .. }
            | DeployError::ApplyFailed { source, .. }
            | DeployError::SecretSyncFailed { source, .. } => source.output(),
            DeployError::ReadinessTimeout { output, .. }
            | DeployError::ForwardingFailed { output, .. } => output.as_ref(),
            _ => None,
        }
    }

    /// One actionable remediation hint, if this failure has one.
    pub fn hint(&self) -> Option<String> {
        let hint = match self {
            DeployError::ToolMissing { tool } => {
                format!("install '{tool}' and make sure it is on your PATH, or set it under `tools:` in kindeploy.yaml")
            }
            DeployError::ToolInstallFailed { tool, .. } => {
                format!("install '{tool}' manually, then re-run kindeploy")
            }
            DeployError::UnsupportedPlatform(_) => {
                "supported hosts are Linux, macOS and Windows".to_string()
            }
            DeployError::DaemonUnreachable { .. } => {
                "start the Docker daemon and try again ('docker info' should succeed)".to_string()
            }
            DeployError::BuildFailed { .. } => {
                "check the Dockerfile and the sources in the target folder".to_string()
            }
            DeployError::ClusterUnavailable { cluster, .. } => {
                format!("check 'kind get clusters' and try 'kind create cluster --name={cluster}' manually")
            }
            DeployError::ImageLoadFailed { .. } => {
                "make sure the Docker daemon is running and the image exists locally ('docker images')".to_string()
            }
            DeployError::ApplyFailed { .. } => {
                "ensure kubectl can reach your kind cluster ('kubectl get nodes')".to_string()
            }
            DeployError::SecretSyncFailed { env_file, .. } => {
                format!("ensure '{env_file}' contains KEY=VALUE pairs with no spaces around '='")
            }
            DeployError::ReadinessTimeout { app, namespace, .. } => {
                format!("check pod status: 'kubectl get pods -l app={app} -n {namespace}'")
            }
            DeployError::ForwardingFailed { service, port, .. } => format!(
                "make sure local port {port} is free, then try: kubectl port-forward svc/{service} {port}:{port} --address 0.0.0.0"
            ),
            _ => return None,
        };
        Some(hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> CommandError {
        CommandError::Failed {
            command: "docker build -t x .".into(),
            output: CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "no Dockerfile".into(),
            },
        }
    }

    #[test]
    fn missing_executable_maps_to_tool_missing() {
        let err = DeployError::from_command(
            CommandError::Missing {
                program: "kind".into(),
            },
            |source| DeployError::BuildFailed {
                image: "x".into(),
                source,
            },
        );
        assert!(matches!(err, DeployError::ToolMissing { tool } if tool == "kind"));
    }

    #[test]
    fn cancellation_maps_to_interrupted() {
        let err = DeployError::from_command(
            CommandError::Cancelled {
                command: "kubectl wait".into(),
            },
            |source| DeployError::ApplyFailed {
                manifest: "deployment.yaml".into(),
                source,
            },
        );
        assert!(matches!(err, DeployError::Interrupted));
    }

    #[test]
    fn failed_command_keeps_step_kind_and_output() {
        let err = DeployError::from_command(failed(), |source| DeployError::BuildFailed {
            image: "x-image:latest".into(),
            source,
        });
        assert!(matches!(err, DeployError::BuildFailed { .. }));
        assert_eq!(err.captured_output().unwrap().stderr, "no Dockerfile");
        assert!(err.hint().is_some());
    }

    #[test]
    fn readiness_hint_names_label_and_namespace() {
        let err = DeployError::ReadinessTimeout {
            deployment: "web-deployment".into(),
            app: "web".into(),
            namespace: "dev".into(),
            timeout_secs: 5,
            output: None,
        };
        let hint = err.hint().unwrap();
        assert!(hint.contains("-l app=web"));
        assert!(hint.contains("-n dev"));
    }

    #[test]
    fn interrupted_has_no_hint() {
        assert!(DeployError::Interrupted.hint().is_none());
    }
}
