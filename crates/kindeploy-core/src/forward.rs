//! Background `kubectl port-forward` process and its single finalizer.
//!
//! A [`PortForward`] is the only handle to the forwarding child. The driver
//! keeps it in an `Option` and passes that to [`cleanup`] on every exit path,
//! so at most one forwarder exists and it never outlives the run.

use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{DeployError, Result};
use crate::runner::{CommandOutput, ToolCommand};
use crate::target::DeploymentTarget;

/// How long to wait for the output readers once the child has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Interval between exit checks while waiting for termination.
const EXIT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSpec {
    pub kubectl: String,
    pub service: String,
    pub namespace: String,
    pub port: u16,
    pub address: String,
}

impl ForwardSpec {
    pub fn new(target: &DeploymentTarget, config: &Config) -> Self {
        Self {
            kubectl: config.tools.kubectl.clone(),
            service: target.service_name(),
            namespace: target.namespace.clone(),
            port: target.port,
            address: config.forward_address.clone(),
        }
    }

    pub fn command(&self) -> ToolCommand {
        ToolCommand::new(&self.kubectl)
            .arg("port-forward")
            .arg(format!("svc/{}", self.service))
            .arg(format!("{0}:{0}", self.port))
            .arg(format!("--namespace={}", self.namespace))
            .arg(format!("--address={}", self.address))
    }

    fn failed(&self, reason: impl Into<String>, output: Option<CommandOutput>) -> DeployError {
        DeployError::ForwardingFailed {
            service: self.service.clone(),
            port: self.port,
            reason: reason.into(),
            output,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardState {
    Starting,
    Live,
    FailedFast,
}

#[derive(Debug)]
pub enum MonitorOutcome {
    /// The session was cancelled while the forwarder was still alive.
    Cancelled,
    /// The forwarder exited on its own.
    Exited(CommandOutput),
}

pub struct PortForward {
    spec: ForwardSpec,
    child: Child,
    state: ForwardState,
    stdout: Arc<Mutex<String>>,
    stderr: Arc<Mutex<String>>,
    readers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for PortForward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortForward")
            .field("spec", &self.spec)
            .field("pid", &self.child.id())
            .field("state", &self.state)
            .finish()
    }
}

fn drain_into<R>(reader: R, buf: Arc<Mutex<String>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Ok(mut b) = buf.lock() {
                if !b.is_empty() {
                    b.push('\n');
                }
                b.push_str(&line);
            }
        }
    })
}

impl PortForward {
    /// Spawn the forwarder. The returned handle is in `Starting`; call
    /// [`PortForward::wait_live`] to confirm it survives the grace period.
    pub fn start(spec: ForwardSpec) -> Result<Self> {
        let cmd = spec.command();
        tracing::info!(command = %cmd, "starting port-forward");
        let child = cmd.to_command().spawn().map_err(|e| {
            DeployError::from_command(cmd.spawn_error(e), |source| {
                spec.failed(format!("could not be started: {source}"), None)
            })
        })?;
        Ok(Self::from_child(spec, child))
    }

    fn from_child(spec: ForwardSpec, mut child: Child) -> Self {
        let stdout = Arc::new(Mutex::new(String::new()));
        let stderr = Arc::new(Mutex::new(String::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(drain_into(out, Arc::clone(&stdout)));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(drain_into(err, Arc::clone(&stderr)));
        }
        Self {
            spec,
            child,
            state: ForwardState::Starting,
            stdout,
            stderr,
            readers,
        }
    }

    /// Wrap an arbitrary command as a forwarder.
    #[cfg(test)]
    pub(crate) fn from_command(spec: ForwardSpec, cmd: &ToolCommand) -> Self {
        let child = cmd.to_command().spawn().unwrap();
        Self::from_child(spec, child)
    }

    pub fn state(&self) -> ForwardState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Sleep through the grace period, then check the child is still
    /// running. Exited means `FailedFast`; alive means `Live`.
    pub async fn wait_live(&mut self, grace: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(grace) => {}
            _ = cancel.cancelled() => return Err(DeployError::Interrupted),
        }
        match self.try_exited().await? {
            Some(output) => {
                self.state = ForwardState::FailedFast;
                let reason = match output.code {
                    Some(code) => format!("exited with code {code} during startup"),
                    None => "was killed during startup".to_string(),
                };
                Err(self.spec.failed(reason, Some(output)))
            }
            None => {
                self.state = ForwardState::Live;
                tracing::info!(port = self.spec.port, pid = ?self.pid(), "port-forward is live");
                Ok(())
            }
        }
    }

    /// Poll liveness every `interval` until the child exits or `cancel` fires.
    pub async fn monitor(
        &mut self,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<MonitorOutcome> {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => return Ok(MonitorOutcome::Cancelled),
            }
            if let Some(output) = self.try_exited().await? {
                tracing::warn!(code = ?output.code, "port-forward exited");
                return Ok(MonitorOutcome::Exited(output));
            }
        }
    }

    /// Captured output so far, with `code` when the child has exited.
    pub fn captured_output(&self, code: Option<i32>) -> CommandOutput {
        let read = |buf: &Arc<Mutex<String>>| buf.lock().map(|b| b.clone()).unwrap_or_default();
        CommandOutput {
            code,
            stdout: read(&self.stdout),
            stderr: read(&self.stderr),
        }
    }

    /// `Some(output)` once the child has exited, after its output is drained.
    async fn try_exited(&mut self) -> Result<Option<CommandOutput>> {
        match self.child.try_wait()? {
            Some(status) => Ok(Some(self.finish(status).await)),
            None => Ok(None),
        }
    }

    async fn finish(&mut self, status: ExitStatus) -> CommandOutput {
        for reader in self.readers.drain(..) {
            let _ = tokio::time::timeout(DRAIN_TIMEOUT, reader).await;
        }
        self.captured_output(status.code())
    }

    /// Wait up to `limit` for the child to exit.
    async fn exited_within(&mut self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "could not check port-forward status");
                    return false;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }

    /// Ask the child to exit. On unix this is SIGTERM; elsewhere there is no
    /// graceful request and the child is killed outright.
    fn request_termination(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let Some(pid) = self.child.id() else {
                return Ok(());
            };
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
                Err(e) => Err(std::io::Error::from(e)),
            }
        }
        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReport {
    /// No forwarder was ever started.
    NothingToDo,
    /// The forwarder had already exited.
    AlreadyExited,
    /// Exited after the graceful request.
    Terminated,
    /// Exited only after a forced kill.
    Killed,
    /// Still not confirmed gone after the forced kill.
    Unconfirmed,
}

/// Stop the forwarder if there is one. Graceful first, forced after
/// `terminate_grace`, then give up after `kill_grace`. Never fails.
pub async fn cleanup(
    forward: Option<PortForward>,
    terminate_grace: Duration,
    kill_grace: Duration,
) -> CleanupReport {
    let Some(mut forward) = forward else {
        return CleanupReport::NothingToDo;
    };
    if forward.exited_within(Duration::ZERO).await {
        return CleanupReport::AlreadyExited;
    }

    let pid = forward.pid();
    tracing::info!(?pid, "stopping port-forward");
    match forward.request_termination() {
        Ok(()) => {
            if forward.exited_within(terminate_grace).await {
                tracing::info!(?pid, "port-forward terminated");
                return CleanupReport::Terminated;
            }
            tracing::warn!(?pid, "port-forward ignored termination, killing");
        }
        Err(e) => tracing::warn!(?pid, error = %e, "termination request failed, killing"),
    }

    if let Err(e) = forward.child.start_kill() {
        tracing::warn!(?pid, error = %e, "kill failed");
    }
    if forward.exited_within(kill_grace).await {
        tracing::info!(?pid, "port-forward killed");
        CleanupReport::Killed
    } else {
        tracing::error!(?pid, "port-forward may still be running");
        CleanupReport::Unconfirmed
    }
}
