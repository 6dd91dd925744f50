use crate::output::{detail, print_kv, rule, step};
use crate::prompt::Prompter;
use crate::root;
use clap::Args;
use kindeploy_core::apply::{self, ReadinessState};
use kindeploy_core::cluster::{self, ClusterStatus};
use kindeploy_core::config::Config;
use kindeploy_core::forward::{self, CleanupReport, ForwardSpec, MonitorOutcome, PortForward};
use kindeploy_core::image;
use kindeploy_core::manifest::{self, WriteStatus};
use kindeploy_core::port;
use kindeploy_core::runner::Runner;
use kindeploy_core::secret::{self, SecretOutcome};
use kindeploy_core::target::DeploymentTarget;
use kindeploy_core::tools::{self, Platform, PrepareEvent, Tool};
use kindeploy_core::{DeployError, Result};
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Every flag pre-answers a prompt or overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct DeployArgs {
    /// Folder containing the Go service (prompted when omitted)
    #[arg(long)]
    pub folder: Option<PathBuf>,

    /// Port served by the app and forwarded to localhost (prompted when omitted)
    #[arg(long)]
    pub port: Option<String>,

    /// Rebuild the image even if it already exists, without asking
    #[arg(long)]
    pub rebuild: bool,

    /// Never try to install missing tools
    #[arg(long)]
    pub skip_install: bool,

    /// Don't open the browser once forwarding is live
    #[arg(long)]
    pub no_browser: bool,

    /// kind cluster name
    #[arg(long)]
    pub cluster: Option<String>,

    /// Namespace for the deployment, service and secret
    #[arg(long)]
    pub namespace: Option<String>,

    /// Readiness timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl DeployArgs {
    fn apply_to(&self, config: &mut Config) {
        if self.skip_install {
            config.auto_install = false;
        }
        if self.no_browser {
            config.open_browser = false;
        }
        if let Some(cluster) = &self.cluster {
            config.cluster_name = cluster.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(secs) = self.timeout {
            config.timeouts.ready_secs = secs;
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(config_path: Option<&Path>, cwd: &Path, args: DeployArgs) -> anyhow::Result<()> {
    let (mut config, source) = Config::resolve(config_path, cwd)?;
    args.apply_to(&mut config);
    config.validate()?;
    if let Some(path) = &source {
        tracing::info!(path = %path.display(), "loaded config");
    }

    println!("kindeploy: Go service -> local kind cluster");
    rule();

    let rt = tokio::runtime::Runtime::new()?;
    let cancel = CancellationToken::new();

    let result = rt.block_on(async {
        tokio::spawn(cancel_on_signal(cancel.clone()));

        let runner = Runner::new(cancel.clone());
        let mut forward: Option<PortForward> = None;
        let outcome = pipeline(&config, &args, cwd, &runner, &mut forward).await;

        // The single finalizer: runs on success, failure and interrupt alike.
        let report = forward::cleanup(
            forward.take(),
            config.timeouts.terminate_grace(),
            config.timeouts.kill_grace(),
        )
        .await;
        print_cleanup(report);
        outcome
    });

    // A prompt thread blocked on stdin must not keep the process alive.
    rt.shutdown_background();

    match result {
        Ok(()) => Ok(()),
        Err(DeployError::Interrupted) => {
            println!("Interrupted. Exiting.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
    println!();
    cancel.cancel();
}

/// Run a blocking prompt off the runtime, abandoning it on cancellation.
async fn ask<T, F>(cancel: &CancellationToken, question: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::select! {
        joined = tokio::task::spawn_blocking(question) => {
            joined.map_err(|e| DeployError::Io(std::io::Error::other(e)))?
        }
        _ = cancel.cancelled() => Err(DeployError::Interrupted),
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

async fn pipeline(
    config: &Config,
    args: &DeployArgs,
    cwd: &Path,
    runner: &Runner,
    forward: &mut Option<PortForward>,
) -> Result<()> {
    let cancel = runner.cancel_token().clone();

    // Tools and daemon.
    let platform = Platform::detect()?;
    step(format!("Checking required tools ({})", platform.as_str()));
    let prepared = tools::prepare_tools(config, platform, runner, print_prepare_event).await;
    let statuses = match prepared {
        Ok(statuses) => statuses,
        Err(e) => {
            if platform == Platform::Windows {
                print_manual_guidance();
            }
            return Err(e);
        }
    };
    let installed: Vec<&str> = statuses
        .iter()
        .filter(|s| s.installed)
        .map(|s| s.tool.name())
        .collect();
    if !installed.is_empty() {
        detail(format!("installed during this run: {}", installed.join(", ")));
    }
    step("Checking the Docker daemon");
    tools::ensure_daemon(config, runner).await?;
    detail("docker daemon is running");

    // Inputs.
    let folder = match &args.folder {
        Some(folder) => root::resolve_folder(folder, cwd)?,
        None => {
            let cwd = cwd.to_path_buf();
            ask(&cancel, move || Prompter::stdio().folder(&cwd)).await?
        }
    };
    let port = match &args.port {
        Some(raw) => port::select_port(raw, config.default_port)
            .map_err(|e| DeployError::InvalidInput(e.to_string()))?,
        None => {
            let default = config.default_port;
            ask(&cancel, move || Prompter::stdio().port(default, port::port_in_use)).await?
        }
    };
    let target = DeploymentTarget::new(&folder, port, config);
    print_summary(&target);

    // Files.
    step(format!("Writing build files in {}", target.folder.display()));
    let report = manifest::generate(&target)?;
    for file in &report.files {
        let name = file.path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        match file.status {
            WriteStatus::Kept => detail(format!("{name}: kept existing")),
            status => detail(format!("{name}: {}", status.as_str())),
        }
    }
    if report.synthesized_entry_point() {
        detail("no main.go found, wrote a default HTTP server");
    }

    // Cluster.
    step(format!("Ensuring kind cluster '{}'", target.cluster_name));
    match cluster::ensure_cluster(&config.tools, runner, &target.cluster_name).await? {
        ClusterStatus::Existing => detail("cluster already exists"),
        ClusterStatus::Created => detail("cluster created"),
    }
    if apply::ensure_namespace(&config.tools, runner, &target.namespace).await? {
        detail(format!("namespace '{}' created", target.namespace));
    }

    // Secret.
    step(format!("Syncing secret '{}'", target.secret_name));
    match secret::sync_secret(&config.tools, runner, &target).await? {
        SecretOutcome::Skipped { existing } => {
            detail("no .env file, skipping secret creation");
            if existing {
                detail(format!(
                    "secret '{}' from an earlier run stays in place",
                    target.secret_name
                ));
            }
        }
        SecretOutcome::Synced { keys, lint } => {
            for problem in &lint {
                detail(format!("warning: .env line {}: {}", problem.line, problem.message));
            }
            detail(format!("secret created with keys: {}", keys.join(", ")));
        }
    }

    // Image.
    step(format!("Preparing image '{}'", target.image_tag));
    let exists = image::image_exists(&config.tools, runner, &target.image_tag).await?;
    let rebuild = if !exists || args.rebuild {
        true
    } else {
        detail("image already exists locally");
        ask(&cancel, || Prompter::stdio().confirm("    Rebuild image anyway?")).await?
    };
    if rebuild {
        image::build_image(&config.tools, runner, &target).await?;
        detail("image built");
    } else {
        detail("reusing existing image");
    }

    step(format!("Loading image into '{}'", target.cluster_name));
    cluster::load_image(&config.tools, runner, &target.image_tag, &target.cluster_name).await?;

    // Deploy and wait.
    step("Applying manifests");
    apply::apply_manifests(&config.tools, runner, &target).await?;
    let mut state = ReadinessState::Applied;
    tracing::info!(?state, "manifests applied");

    step(format!(
        "Waiting for '{}' to become ready (max {}s)",
        target.deployment_name(),
        config.timeouts.ready_secs
    ));
    let waited = apply::wait_ready(&config.tools, runner, &target, config.timeouts.ready(), |s| {
        tracing::info!(from = ?state, to = ?s, "readiness");
        state = s;
    })
    .await;
    if let Err(e) = waited {
        if matches!(e, DeployError::ReadinessTimeout { .. }) {
            print_readiness_help(&target);
        }
        return Err(e);
    }
    detail("deployment is ready");

    // Forward.
    step(format!(
        "Forwarding {}:{} -> svc/{}:{}",
        config.forward_address,
        target.port,
        target.service_name(),
        target.port
    ));
    let live = forward.insert(PortForward::start(ForwardSpec::new(&target, config))?);
    if let Err(e) = live.wait_live(config.timeouts.forward_grace(), &cancel).await {
        if matches!(e, DeployError::ForwardingFailed { .. }) {
            print_forward_help(&target);
        }
        return Err(e);
    }
    if config.forward_address == "0.0.0.0" {
        detail("warning: the service is now reachable from your local network");
    }

    if config.open_browser {
        let url = target.local_url();
        detail(format!("opening {url}"));
        if let Err(e) = open::that(&url) {
            tracing::warn!(error = %e, "could not open browser");
            detail(format!("could not open a browser: {e}"));
        }
    }
    print_final_instructions(&target, &config.forward_address);

    match live.monitor(config.timeouts.poll_interval(), &cancel).await? {
        MonitorOutcome::Cancelled => Err(DeployError::Interrupted),
        MonitorOutcome::Exited(output) => Err(DeployError::ForwardingFailed {
            service: target.service_name(),
            port: target.port,
            reason: "stopped unexpectedly".to_string(),
            output: Some(output),
        }),
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_prepare_event(event: PrepareEvent<'_>) {
    match event {
        PrepareEvent::Found { tool, path } => {
            detail(format!("{} found at {}", tool.name(), path.display()))
        }
        PrepareEvent::Installing { tool } => {
            detail(format!("{} not found, installing", tool.name()))
        }
        PrepareEvent::Running { command } => detail(format!("$ {command}")),
        PrepareEvent::Line(line) => println!("      {line}"),
        PrepareEvent::Installed { tool } => detail(format!("{} installed", tool.name())),
    }
}

fn print_manual_guidance() {
    detail("automatic installation is not available on Windows; install these manually:");
    for tool in Tool::ALL {
        detail(format!("  {}: {}", tool.name(), tool.manual_guidance()));
    }
}

fn print_summary(target: &DeploymentTarget) {
    println!();
    step("Configuration");
    print_kv(&[
        ("app folder", target.folder.display().to_string()),
        ("app name", target.name.clone()),
        ("port", target.port.to_string()),
        ("image", target.image_tag.clone()),
        ("kind cluster", target.cluster_name.clone()),
        ("namespace", target.namespace.clone()),
        ("secret", target.secret_name.clone()),
    ]);
    rule();
}

fn print_readiness_help(target: &DeploymentTarget) {
    println!();
    detail("inspect the rollout with:");
    for cmd in apply::readiness_diagnostics(target) {
        detail(format!("  {cmd}"));
    }
    detail("remove what was deployed with:");
    for cmd in apply::manual_cleanup_commands(target) {
        detail(format!("  {cmd}"));
    }
}

fn print_forward_help(target: &DeploymentTarget) {
    println!();
    detail("the app is running in the cluster but is not reachable locally");
    detail(format!(
        "common causes: local port {} is taken, or svc/{} has no ready pods",
        target.port,
        target.service_name()
    ));
    detail(format!(
        "check pods with: kubectl get pods -l {} -n {}",
        target.selector(),
        target.namespace
    ));
}

fn print_final_instructions(target: &DeploymentTarget, address: &str) {
    println!();
    println!("{}", "=".repeat(60));
    println!("Deployed '{}' and started port-forwarding.", target.name);
    println!("  on this machine:  {}", target.local_url());
    if address == "0.0.0.0" {
        println!("  on your network:  http://<this-machine-ip>:{}", target.port);
    }
    rule();
    println!("Press Ctrl+C to stop port-forwarding and exit.");
    println!("{}", "=".repeat(60));
}

fn print_cleanup(report: CleanupReport) {
    let message = match report {
        CleanupReport::NothingToDo => return,
        CleanupReport::AlreadyExited => "port-forward had already exited",
        CleanupReport::Terminated => "port-forward stopped",
        CleanupReport::Killed => "port-forward ignored termination and was killed",
        CleanupReport::Unconfirmed => "could not confirm the port-forward stopped",
    };
    step("Cleaning up");
    detail(message);
}
