//! Graceful shutdown and forced termination of sessions

use crate::session::LspSession;
use lspr_config::LspSettings;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Deadlines for the shutdown sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownPolicy {
    /// Deadline for the `shutdown` request
    pub request_timeout: Duration,
    /// How long the process gets to exit after `exit`
    pub exit_grace: Duration,
    /// How long to wait for a killed process to be reaped
    pub kill_timeout: Duration,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self::from(&LspSettings::default())
    }
}

impl From<&LspSettings> for ShutdownPolicy {
    fn from(settings: &LspSettings) -> Self {
        Self {
            request_timeout: settings.shutdown_timeout(),
            exit_grace: settings.exit_grace(),
            kill_timeout: settings.kill_timeout(),
        }
    }
}

/// Shut a session down: `shutdown` request, `exit` notification, a grace
/// period, then a forced kill if the process is still running.
///
/// Never fails; every failure on the graceful path falls through to the kill.
/// A session that already terminated and was reaped is left alone.
pub async fn shutdown_session(session: &LspSession, policy: &ShutdownPolicy) {
    let pid = session.pid();

    if session.begin_shutdown() {
        debug!(session = %session.key(), pid, "Shutting down LSP session");

        match session
            .send_request("shutdown", Value::Null, policy.request_timeout)
            .await
        {
            Ok(_) => debug!(pid, "Sent LSP shutdown request"),
            Err(e) => warn!(
                pid,
                error = %e,
                "LSP shutdown request failed, continuing with exit"
            ),
        }

        if let Err(e) = session.send_notification("exit", Value::Null).await {
            warn!(pid, error = %e, "Failed to send LSP exit notification");
        }
    }

    if let Some(mut child) = session.take_process().await {
        match timeout(policy.exit_grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid, exit_status = %status, "LSP server process exited gracefully");
            }
            Ok(Err(e)) => {
                warn!(pid, error = %e, "Failed to wait for LSP server process");
                kill_and_reap(&mut child, pid, policy.kill_timeout).await;
            }
            Err(_) => {
                debug!(
                    pid,
                    exit_grace_ms = policy.exit_grace.as_millis() as u64,
                    "LSP server still running after exit, killing"
                );
                kill_and_reap(&mut child, pid, policy.kill_timeout).await;
            }
        }
    }

    session.mark_terminated();
}

/// Kill a session without the protocol exchange. Used when startup fails.
pub(crate) async fn force_terminate(session: &LspSession) {
    session.begin_shutdown();
    if let Some(mut child) = session.take_process().await {
        kill_and_reap(&mut child, session.pid(), session.options().shutdown.kill_timeout).await;
    }
    session.mark_terminated();
}

async fn kill_and_reap(child: &mut Child, pid: Option<u32>, kill_timeout: Duration) {
    // The server leads its own process group; take its descendants down too.
    #[cfg(unix)]
    if let Some(pid) = pid {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => debug!(pid, "Sent SIGKILL to process group"),
            Err(e) => debug!(pid, error = %e, "Failed to signal process group"),
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(pid, error = %e, "Failed to kill LSP server process");
    }

    match timeout(kill_timeout, child.wait()).await {
        Ok(Ok(status)) => debug!(pid, exit_status = %status, "LSP server process reaped"),
        Ok(Err(e)) => warn!(pid, error = %e, "Failed to reap LSP server process"),
        Err(_) => warn!(
            pid,
            kill_timeout_ms = kill_timeout.as_millis() as u64,
            "Timeout waiting for killed LSP server process"
        ),
    }

    #[cfg(unix)]
    if let Some(pid) = pid {
        reap_process_group(pid);
    }
}

/// Collect any exited members of the server's process group that are our
/// children, so none linger as zombies.
#[cfg(unix)]
fn reap_process_group(pid: u32) {
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(-(pid as i32));
    let mut reaped_count = 0;
    loop {
        match waitpid(pgid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => reaped_count += 1,
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(_) => {}
        }
    }
    if reaped_count > 0 {
        debug!(pgid = pid, reaped_count, "Reaped process group children");
    }
}
