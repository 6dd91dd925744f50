//! Container image probe and build.

use crate::config::ToolsConfig;
use crate::error::{DeployError, Result};
use crate::runner::{CommandOutput, RunMode, Runner, ToolCommand};
use crate::target::DeploymentTarget;

/// True when `docker images -q <tag>` lists an image. A failing probe is
/// logged and treated as "not present".
pub async fn image_exists(tools: &ToolsConfig, runner: &Runner, tag: &str) -> Result<bool> {
    let cmd = ToolCommand::new(&tools.docker).args(["images", "-q", tag]);
    let output = runner
        .run(&cmd, RunMode::Probe)
        .await
        .map_err(|e| DeployError::from_command(e, |source| DeployError::BuildFailed {
            image: tag.to_string(),
            source,
        }))?;
    if !output.success() {
        tracing::warn!(image = tag, code = ?output.code, "image probe failed, assuming absent");
        return Ok(false);
    }
    Ok(!output.stdout.trim().is_empty())
}

/// `docker build -t <tag> .` inside the target folder.
pub async fn build_image(
    tools: &ToolsConfig,
    runner: &Runner,
    target: &DeploymentTarget,
) -> Result<CommandOutput> {
    let cmd = ToolCommand::new(&tools.docker)
        .args(["build", "-t", target.image_tag.as_str(), "."])
        .current_dir(&target.folder);
    tracing::info!(image = %target.image_tag, folder = %target.folder.display(), "building image");
    runner
        .run(&cmd, RunMode::Abort)
        .await
        .map_err(|e| DeployError::from_command(e, |source| DeployError::BuildFailed {
            image: target.image_tag.clone(),
            source,
        }))
}
