//! Local kind cluster: existence check, creation and image loading.

use crate::config::ToolsConfig;
use crate::error::{DeployError, Result};
use crate::runner::{CommandError, RunMode, Runner, ToolCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    Existing,
    Created,
}

/// Cluster names listed by `kind get clusters`, or `None` when the listing
/// itself failed.
async fn list_clusters(
    tools: &ToolsConfig,
    runner: &Runner,
    name: &str,
) -> Result<Option<Vec<String>>> {
    let cmd = ToolCommand::new(&tools.kind).args(["get", "clusters"]);
    let output = runner
        .run(&cmd, RunMode::Probe)
        .await
        .map_err(|e| cluster_unavailable(e, name))?;
    if !output.success() {
        tracing::warn!(
            code = ?output.code,
            stderr = %output.stderr.trim(),
            "listing kind clusters failed"
        );
        return Ok(None);
    }
    Ok(Some(
        output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
    ))
}

/// Make sure the named cluster exists. A failed listing falls through to
/// creation rather than aborting.
pub async fn ensure_cluster(
    tools: &ToolsConfig,
    runner: &Runner,
    name: &str,
) -> Result<ClusterStatus> {
    if let Some(clusters) = list_clusters(tools, runner, name).await? {
        if clusters.iter().any(|c| c == name) {
            tracing::info!(cluster = name, "kind cluster exists");
            return Ok(ClusterStatus::Existing);
        }
    }

    tracing::info!(cluster = name, "creating kind cluster");
    let cmd = ToolCommand::new(&tools.kind)
        .args(["create", "cluster"])
        .arg(format!("--name={name}"));
    runner
        .run(&cmd, RunMode::Abort)
        .await
        .map_err(|e| cluster_unavailable(e, name))?;
    Ok(ClusterStatus::Created)
}

fn cluster_unavailable(e: CommandError, cluster: &str) -> DeployError {
    DeployError::from_command(e, |source| DeployError::ClusterUnavailable {
        cluster: cluster.to_string(),
        source,
    })
}

/// `kind load docker-image <tag> --name=<cluster>`.
pub async fn load_image(
    tools: &ToolsConfig,
    runner: &Runner,
    image: &str,
    cluster: &str,
) -> Result<()> {
    let cmd = ToolCommand::new(&tools.kind)
        .args(["load", "docker-image", image])
        .arg(format!("--name={cluster}"));
    runner
        .run(&cmd, RunMode::Abort)
        .await
        .map(|_| ())
        .map_err(|e| {
            DeployError::from_command(e, |source| DeployError::ImageLoadFailed {
                image: image.to_string(),
                cluster: cluster.to_string(),
                source,
            })
        })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    /// A fake `kind` that records each invocation and answers `get clusters`
    /// with `listing`.
    fn fake_kind(dir: &Path, listing: &str) -> ToolsConfig {
        let log = dir.join("calls.log");
        let path = dir.join("kind");
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> '{log}'\nif [ \"$1\" = get ]; then\n:\n{listing}\nfi\nexit 0\n",
            log = log.display()
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        ToolsConfig {
            kind: path.display().to_string(),
            ..ToolsConfig::default()
        }
    }

    fn calls(dir: &Path) -> String {
        std::fs::read_to_string(dir.join("calls.log")).unwrap_or_default()
    }

    fn runner() -> Runner {
        Runner::new(CancellationToken::new())
    }

    #[tokio::test]
    async fn existing_cluster_is_reused() {
        let dir = TempDir::new().unwrap();
        let tools = fake_kind(dir.path(), "echo other\necho go-cluster");
        let status = ensure_cluster(&tools, &runner(), "go-cluster").await.unwrap();
        assert_eq!(status, ClusterStatus::Existing);
        assert!(!calls(dir.path()).contains("create"));
    }

    #[tokio::test]
    async fn absent_cluster_is_created() {
        let dir = TempDir::new().unwrap();
        let tools = fake_kind(dir.path(), "echo other");
        let status = ensure_cluster(&tools, &runner(), "go-cluster").await.unwrap();
        assert_eq!(status, ClusterStatus::Created);
        assert!(calls(dir.path()).contains("create cluster --name=go-cluster"));
    }

    #[tokio::test]
    async fn failed_listing_falls_back_to_creation() {
        let dir = TempDir::new().unwrap();
        let tools = fake_kind(dir.path(), "exit 1");
        let status = ensure_cluster(&tools, &runner(), "go-cluster").await.unwrap();
        assert_eq!(status, ClusterStatus::Created);
    }

    #[tokio::test]
    async fn load_passes_cluster_name() {
        let dir = TempDir::new().unwrap();
        let tools = fake_kind(dir.path(), "");
        load_image(&tools, &runner(), "web-image:latest", "go-cluster").await.unwrap();
        assert!(calls(dir.path()).contains("load docker-image web-image:latest --name=go-cluster"));
    }
}
