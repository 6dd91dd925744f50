//! Syncing the local `.env` file into a cluster secret.

use crate::config::ToolsConfig;
use crate::envfile::{self, EnvLint};
use crate::error::{DeployError, Result};
use crate::paths;
use crate::runner::{CommandError, RunMode, Runner, ToolCommand};
use crate::target::DeploymentTarget;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretOutcome {
    /// No `.env` in the folder; the secret was left untouched.
    Skipped { existing: bool },
    /// The secret was replaced from `.env`.
    Synced { keys: Vec<String>, lint: Vec<EnvLint> },
}

/// Replace the target's secret with the contents of its `.env` file.
pub async fn sync_secret(
    tools: &ToolsConfig,
    runner: &Runner,
    target: &DeploymentTarget,
) -> Result<SecretOutcome> {
    let env_path = paths::env_file_path(&target.folder);
    let namespace_arg = format!("--namespace={}", target.namespace);

    if !env_path.is_file() {
        let probe = ToolCommand::new(&tools.kubectl)
            .args(["get", "secret", target.secret_name.as_str(), namespace_arg.as_str()]);
        // Informational only; any failure reads as "not there".
        let existing = match runner.run(&probe, RunMode::Probe).await {
            Ok(output) => output.success(),
            Err(CommandError::Cancelled { .. }) => return Err(DeployError::Interrupted),
            Err(e) => {
                tracing::debug!(error = %e, "secret probe failed");
                false
            }
        };
        tracing::info!(secret = %target.secret_name, existing, "no .env file, skipping secret");
        return Ok(SecretOutcome::Skipped { existing });
    }

    let content = std::fs::read_to_string(&env_path)?;
    let lint = envfile::lint_env(&content);
    for problem in &lint {
        tracing::warn!(line = problem.line, "{}: {}", paths::ENV_FILE, problem.message);
    }
    let keys = envfile::parse_env_key_names(&content);

    let delete = ToolCommand::new(&tools.kubectl).args([
        "delete",
        "secret",
        target.secret_name.as_str(),
        namespace_arg.as_str(),
        "--ignore-not-found=true",
    ]);
    let deleted = runner
        .run(&delete, RunMode::Probe)
        .await
        .map_err(|e| DeployError::from_command(e, |source| secret_failed(target, source)))?;
    // Not-found is already tolerated by the flag; anything else surfaces at create.
    if !deleted.success() {
        tracing::warn!(
            secret = %target.secret_name,
            stderr = %deleted.stderr.trim(),
            "could not delete previous secret"
        );
    }

    let env_arg = format!("--from-env-file={}", paths::ENV_FILE);
    let create = ToolCommand::new(&tools.kubectl)
        .args([
            "create",
            "secret",
            "generic",
            target.secret_name.as_str(),
            env_arg.as_str(),
            namespace_arg.as_str(),
        ])
        .current_dir(&target.folder);
    runner
        .run(&create, RunMode::Abort)
        .await
        .map_err(|e| DeployError::from_command(e, |source| secret_failed(target, source)))?;

    tracing::info!(secret = %target.secret_name, keys = keys.len(), "secret synced");
    Ok(SecretOutcome::Synced { keys, lint })
}

fn secret_failed(target: &DeploymentTarget, source: CommandError) -> DeployError {
    DeployError::SecretSyncFailed {
        secret: target.secret_name.clone(),
        env_file: paths::ENV_FILE.to_string(),
        source,
    }
}
