//! Submitting the manifests and waiting for the workload to become ready.

use std::time::Duration;

use crate::config::ToolsConfig;
use crate::error::{DeployError, Result};
use crate::paths;
use crate::runner::{CommandError, CommandOutput, RunMode, Runner, ToolCommand};
use crate::target::DeploymentTarget;

/// Slack past kubectl's own `--timeout` before the in-process bound gives
/// up on it. kubectl starts its timer only after reaching the API server.
pub const WAIT_MARGIN: Duration = Duration::from_secs(5);

/// Create the target namespace unless it already exists. `default` always
/// exists and is never probed.
pub async fn ensure_namespace(
    tools: &ToolsConfig,
    runner: &Runner,
    namespace: &str,
) -> Result<bool> {
    if namespace == "default" {
        return Ok(false);
    }
    let manifest = format!("namespace/{namespace}");
    let map = |e: CommandError| {
        DeployError::from_command(e, |source| DeployError::ApplyFailed {
            manifest: manifest.clone(),
            source,
        })
    };

    let probe = ToolCommand::new(&tools.kubectl).args(["get", "namespace", namespace]);
    if runner.run(&probe, RunMode::Probe).await.map_err(map)?.success() {
        return Ok(false);
    }

    tracing::info!(namespace, "creating namespace");
    let create = ToolCommand::new(&tools.kubectl).args(["create", "namespace", namespace]);
    runner.run(&create, RunMode::Abort).await.map_err(map)?;
    Ok(true)
}

/// Apply the workload manifest, then the service manifest.
pub async fn apply_manifests(
    tools: &ToolsConfig,
    runner: &Runner,
    target: &DeploymentTarget,
) -> Result<()> {
    for manifest in [paths::DEPLOYMENT_MANIFEST, paths::SERVICE_MANIFEST] {
        let cmd = ToolCommand::new(&tools.kubectl)
            .args(["apply", "-f", manifest])
            .arg(format!("--namespace={}", target.namespace))
            .current_dir(&target.folder);
        tracing::info!(manifest, namespace = %target.namespace, "applying");
        runner.run(&cmd, RunMode::Abort).await.map_err(|e| {
            DeployError::from_command(e, |source| DeployError::ApplyFailed {
                manifest: manifest.to_string(),
                source,
            })
        })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

/// Progress of the readiness wait. `Ready` and `TimedOut` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Applied,
    Waiting,
    Ready,
    TimedOut,
}

/// Block until the deployment reports `Available`. kubectl is given
/// `timeout`; the in-process bound adds [`WAIT_MARGIN`] so kubectl's own
/// timeout message is captured, and only a hung kubectl is killed. Never
/// retried.
pub async fn wait_ready(
    tools: &ToolsConfig,
    runner: &Runner,
    target: &DeploymentTarget,
    timeout: Duration,
    mut on_state: impl FnMut(ReadinessState),
) -> Result<()> {
    let secs = timeout.as_secs().max(1);
    let deployment = target.deployment_name();
    let cmd = ToolCommand::new(&tools.kubectl)
        .args(["wait", "--for=condition=available"])
        .arg(format!("deployment/{deployment}"))
        .arg(format!("--namespace={}", target.namespace))
        .arg(format!("--timeout={secs}s"));

    on_state(ReadinessState::Waiting);
    tracing::info!(deployment = %deployment, timeout_secs = secs, "waiting for readiness");

    let timed_out = |output: Option<CommandOutput>| DeployError::ReadinessTimeout {
        deployment: deployment.clone(),
        app: target.name.clone(),
        namespace: target.namespace.clone(),
        timeout_secs: secs,
        output,
    };

    // Dropping the run future on the in-process bound kills kubectl.
    let bound = Duration::from_secs(secs) + WAIT_MARGIN;
    let result = match tokio::time::timeout(bound, runner.run(&cmd, RunMode::Abort)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(DeployError::from_command(e, |source| {
            timed_out(source.output().cloned())
        })),
        Err(_) => Err(timed_out(None)),
    };

    match &result {
        Ok(()) => on_state(ReadinessState::Ready),
        Err(DeployError::ReadinessTimeout { .. }) => on_state(ReadinessState::TimedOut),
        Err(_) => {}
    }
    result
}

/// Commands for inspecting a deployment that never became ready.
pub fn readiness_diagnostics(target: &DeploymentTarget) -> Vec<String> {
    let (app, ns, deployment) = (&target.name, &target.namespace, target.deployment_name());
    vec![
        format!("kubectl get pods -l app={app} -n {ns}"),
        format!("kubectl logs -l app={app} -n {ns}"),
        format!("kubectl describe deployment {deployment} -n {ns}"),
        format!("kubectl describe pods -l app={app} -n {ns}"),
    ]
}

/// Commands that remove everything a run created in the cluster.
pub fn manual_cleanup_commands(target: &DeploymentTarget) -> Vec<String> {
    let ns = &target.namespace;
    vec![
        format!("kubectl delete deployment {} -n {ns}", target.deployment_name()),
        format!("kubectl delete service {} -n {ns}", target.service_name()),
        format!("kubectl delete secret {} -n {ns} --ignore-not-found", target.secret_name),
    ]
}
