//! External process execution with a process-wide child registry.
//!
//! Every child spawned through this module is registered until it exits so
//! that [`terminate_all`] can kill whatever is still running when the user
//! interrupts the bundler.

use crate::bundler::error::{Error, Result};
use std::{
    collections::BTreeSet,
    process::{Output, Stdio},
    sync::{LazyLock, Mutex},
};
use tokio::process::Command;

static CHILDREN: LazyLock<Mutex<BTreeSet<u32>>> = LazyLock::new(|| Mutex::new(BTreeSet::new()));

/// Keeps a child registered for as long as it lives.
struct Registration(u32);

impl Registration {
    fn new(pid: u32) -> Self {
        CHILDREN
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(pid);
        Self(pid)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        CHILDREN
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.0);
    }
}

/// Renders a command the way a user would type it.
pub fn describe(command: &Command) -> String {
    let command = command.as_std();
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `command` capturing its output, failing on a non-zero exit status.
pub async fn output(command: &mut Command) -> Result<Output> {
    let output = output_unchecked(command).await?;
    if !output.status.success() {
        return Err(Error::CommandExited {
            command: describe(command),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(output)
}

/// Runs `command` capturing its output, whatever its exit status.
pub async fn output_unchecked(command: &mut Command) -> Result<Output> {
    let description = describe(command);
    log::debug!("Running {}", description);

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|error| Error::CommandFailed {
            command: description.clone(),
            error,
        })?;

    let _registration = child.id().map(Registration::new);
    child
        .wait_with_output()
        .await
        .map_err(|error| Error::CommandFailed {
            command: description,
            error,
        })
}

/// Runs `command` with inherited stdio, failing on a non-zero exit status.
pub async fn status(command: &mut Command) -> Result<()> {
    let description = describe(command);
    log::debug!("Running {}", description);

    let mut child = command
        .kill_on_drop(true)
        .spawn()
        .map_err(|error| Error::CommandFailed {
            command: description.clone(),
            error,
        })?;

    let _registration = child.id().map(Registration::new);
    let status = child.wait().await.map_err(|error| Error::CommandFailed {
        command: description.clone(),
        error,
    })?;

    if !status.success() {
        return Err(Error::CommandExited {
            command: description,
            status,
            stderr: String::new(),
        });
    }
    Ok(())
}

/// Number of children currently registered.
pub fn running_children() -> usize {
    CHILDREN
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .len()
}

/// Force-terminates every registered child.
pub fn terminate_all() {
    let children: Vec<u32> = CHILDREN
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .iter()
        .copied()
        .collect();

    for pid in children {
        log::debug!("Terminating child process {}", pid);
        force_kill(pid);
    }
}

#[cfg(unix)]
fn force_kill(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGKILL) {
        log::debug!("Failed to kill process {}: {}", pid, e);
    }
}

#[cfg(windows)]
fn force_kill(pid: u32) {
    let result = std::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = result {
        log::debug!("Failed to kill process {}: {}", pid, e);
    }
}

#[cfg(not(any(unix, windows)))]
fn force_kill(_pid: u32) {}
