//! Environment preparation: host detection, tool discovery, best-effort
//! installation and the container daemon check.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::{Config, ToolsConfig};
use crate::error::{DeployError, Result};
use crate::runner::{RunMode, Runner, ToolCommand};

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn detect() -> Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Result<Self> {
        match os {
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::MacOs),
            "windows" => Ok(Platform::Windows),
            other => Err(DeployError::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
        }
    }
}

// ---------------------------------------------------------------------------
// Tool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Docker,
    Kubectl,
    Kind,
}

impl Tool {
    /// Order in which tools are checked.
    pub const ALL: [Tool; 3] = [Tool::Docker, Tool::Kubectl, Tool::Kind];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Docker => "docker",
            Tool::Kubectl => "kubectl",
            Tool::Kind => "kind",
        }
    }

    /// Executable configured for this tool.
    pub fn binary<'a>(&self, tools: &'a ToolsConfig) -> &'a str {
        match self {
            Tool::Docker => &tools.docker,
            Tool::Kubectl => &tools.kubectl,
            Tool::Kind => &tools.kind,
        }
    }

    /// Where to go when the tool has to be installed by hand.
    pub fn manual_guidance(&self) -> &'static str {
        match self {
            Tool::Docker => "https://docs.docker.com/desktop/",
            Tool::Kubectl => "https://kubernetes.io/docs/tasks/tools/",
            Tool::Kind => "https://kind.sigs.k8s.io/docs/user/quick-start/#installation",
        }
    }
}

/// Shell commands that install `tool` on `platform`, run in order. Empty when
/// the platform has no automatic install.
pub fn install_plan(tool: Tool, platform: Platform) -> Vec<&'static str> {
    match (platform, tool) {
        (Platform::Linux, Tool::Docker) => vec![
            "sudo apt-get update",
            "sudo apt-get install -y ca-certificates curl gnupg lsb-release",
            "sudo install -m 0755 -d /etc/apt/keyrings",
            "curl -fsSL https://download.docker.com/linux/ubuntu/gpg | sudo gpg --dearmor --yes -o /etc/apt/keyrings/docker.gpg",
            "sudo chmod a+r /etc/apt/keyrings/docker.gpg",
            r#"echo "deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/docker.gpg] https://download.docker.com/linux/ubuntu $(lsb_release -cs) stable" | sudo tee /etc/apt/sources.list.d/docker.list > /dev/null"#,
            "sudo apt-get update",
            "sudo apt-get install -y docker-ce docker-ce-cli containerd.io docker-buildx-plugin",
            "sudo systemctl start docker",
            "sudo systemctl enable docker",
            "sudo usermod -aG docker \"$USER\" || echo 'could not add user to the docker group; log out and back in after adding it manually'",
        ],
        (Platform::Linux, Tool::Kubectl) => vec![
            "sudo apt-get update",
            "sudo apt-get install -y apt-transport-https ca-certificates curl gnupg",
            "sudo install -m 0755 -d /etc/apt/keyrings",
            "curl -fsSL https://pkgs.k8s.io/core:/stable:/v1.30/deb/Release.key | sudo gpg --dearmor --yes -o /etc/apt/keyrings/kubernetes-apt-keyring.gpg",
            r#"echo "deb [signed-by=/etc/apt/keyrings/kubernetes-apt-keyring.gpg] https://pkgs.k8s.io/core:/stable:/v1.30/deb/ /" | sudo tee /etc/apt/sources.list.d/kubernetes.list > /dev/null"#,
            "sudo apt-get update",
            "sudo apt-get install -y kubectl",
        ],
        (Platform::Linux, Tool::Kind) => vec![
            r#"case "$(uname -m)" in aarch64|arm64) a=arm64 ;; *) a=amd64 ;; esac; curl -fsSLo ./kind "https://kind.sigs.k8s.io/dl/v0.23.0/kind-linux-$a""#,
            "chmod +x ./kind",
            "sudo mv ./kind /usr/local/bin/kind",
        ],
        (Platform::MacOs, Tool::Docker) => vec!["brew install --cask docker"],
        (Platform::MacOs, Tool::Kubectl) => vec!["brew install kubectl"],
        (Platform::MacOs, Tool::Kind) => vec!["brew install kind"],
        (Platform::Windows, _) => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub tool: Tool,
    pub path: PathBuf,
    /// True when the tool was installed during this run.
    pub installed: bool,
}

/// Progress reported while preparing tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareEvent<'a> {
    Found { tool: Tool, path: &'a PathBuf },
    Installing { tool: Tool },
    Running { command: &'a str },
    Line(&'a str),
    Installed { tool: Tool },
}

/// Make sure docker, kubectl and kind can be executed, installing missing
/// ones when `config.auto_install` is set and the platform supports it.
pub async fn prepare_tools(
    config: &Config,
    platform: Platform,
    runner: &Runner,
    mut on_event: impl FnMut(PrepareEvent<'_>),
) -> Result<Vec<ToolStatus>> {
    let mut statuses = Vec::with_capacity(Tool::ALL.len());
    for tool in Tool::ALL {
        let binary = tool.binary(&config.tools);
        if let Ok(path) = which::which(binary) {
            on_event(PrepareEvent::Found { tool, path: &path });
            statuses.push(ToolStatus {
                tool,
                path,
                installed: false,
            });
            continue;
        }

        let plan = install_plan(tool, platform);
        if !config.auto_install || plan.is_empty() {
            return Err(DeployError::ToolMissing {
                tool: binary.to_string(),
            });
        }
        match platform {
            Platform::MacOs if which::which("brew").is_err() => {
                return Err(DeployError::ToolMissing {
                    tool: "brew".to_string(),
                });
            }
            Platform::Linux if which::which("sudo").is_err() => {
                tracing::warn!("'sudo' not found; install commands that need root may fail");
            }
            _ => {}
        }

        on_event(PrepareEvent::Installing { tool });
        for command in plan {
            on_event(PrepareEvent::Running { command });
            let code =
                stream_shell(command, runner, |line| on_event(PrepareEvent::Line(line))).await?;
            if code != Some(0) {
                return Err(DeployError::ToolInstallFailed {
                    tool: tool.name().to_string(),
                    reason: match code {
                        Some(code) => format!("`{command}` exited with code {code}"),
                        None => format!("`{command}` was terminated by a signal"),
                    },
                });
            }
        }

        let path = which::which(binary).map_err(|_| DeployError::ToolInstallFailed {
            tool: tool.name().to_string(),
            reason: format!("'{binary}' is still not on PATH after installation"),
        })?;
        on_event(PrepareEvent::Installed { tool });
        statuses.push(ToolStatus {
            tool,
            path,
            installed: true,
        });
    }
    Ok(statuses)
}

/// Run `command` through `sh -c`, handing each stdout/stderr line to
/// `on_line` as it arrives. Returns the exit code.
pub async fn stream_shell(
    command: &str,
    runner: &Runner,
    mut on_line: impl FnMut(&str),
) -> Result<Option<i32>> {
    let cancel = runner.cancel_token();
    if cancel.is_cancelled() {
        return Err(DeployError::Interrupted);
    }

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => on_line(&line),
                None => break,
            },
            _ = cancel.cancelled() => return Err(DeployError::Interrupted),
        }
    }

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = cancel.cancelled() => return Err(DeployError::Interrupted),
    };
    Ok(status.code())
}

/// Fail unless `docker info` succeeds.
pub async fn ensure_daemon(config: &Config, runner: &Runner) -> Result<()> {
    let cmd = ToolCommand::new(&config.tools.docker).arg("info");
    runner
        .run(&cmd, RunMode::Abort)
        .await
        .map(|_| ())
        .map_err(|e| {
            DeployError::from_command(e, |source| DeployError::DaemonUnreachable { source })
        })
}
