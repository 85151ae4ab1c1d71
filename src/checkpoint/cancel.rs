//! Cooperative cancellation.
//!
//! The engine owns one `CancelToken` and hands clones to every checkpoint.
//! Any thread may trip it; checkpoints poll it at safe points. Subprocesses
//! started through `run_command` get their own process group so that a
//! cancel can signal the whole group (SIGTERM, then SIGKILL after a grace
//! period) instead of leaving grandchildren behind.

use anyhow::Context;
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::CheckpointError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm the token for a new run.
    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// `Err(Cancelled)` once the token has been tripped.
    pub fn check(&self) -> Result<(), CheckpointError> {
        if self.is_cancelled() {
            Err(CheckpointError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep up to `d`, waking early on cancel.
    pub fn sleep(&self, d: Duration) -> Result<(), CheckpointError> {
        let deadline = Instant::now() + d;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// Spawn `cmd` in a fresh process group and wait for it, polling `token`.
/// On cancel the group is terminated and `Err(Cancelled)` is returned.
#[cfg(unix)]
pub fn run_command(
    cmd: &mut Command,
    token: &CancelToken,
    grace: Duration,
) -> Result<ExitStatus, CheckpointError> {
    use std::os::unix::process::CommandExt;

    token.check()?;
    cmd.process_group(0);
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn '{}'", program))?;
    log::debug!("spawned '{}' as pid {}", program, child.id());

    loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("wait for '{}'", program))?
        {
            return Ok(status);
        }
        if token.is_cancelled() {
            log::warn!("cancel requested; terminating process group of '{}'", program);
            terminate_group(&mut child, grace);
            return Err(CheckpointError::Cancelled);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn terminate_group(child: &mut std::process::Child, grace: Duration) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    let _ = killpg(pgid, Signal::SIGTERM);

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            // Leader gone; still sweep stragglers left in the group.
            let _ = killpg(pgid, Signal::SIGKILL);
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }
    let _ = killpg(pgid, Signal::SIGKILL);
    let _ = child.wait();
}

/// Like `run_command`, but a non-zero exit status is a failure.
#[cfg(unix)]
pub fn run_command_checked(
    cmd: &mut Command,
    token: &CancelToken,
    grace: Duration,
) -> Result<(), CheckpointError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let status = run_command(cmd, token, grace)?;
    if status.success() {
        Ok(())
    } else {
        Err(CheckpointError::failed(format!("'{}' exited with {}", program, status)))
    }
}
