//! Locating the R interpreter and launching backend processes
//!
//! Launches are fire-and-forget from the caller's point of view: [`launch`]
//! returns as soon as the child is scheduled. The spawned task owns the child,
//! waits for it to exit and publishes what happened on a watch channel. There
//! is no restart and no readiness probe, so a crashed backend stays down
//! unless something above this layer reacts to [`LaunchMonitor`].

use crate::error::BackendError;
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Interpreter executable looked up on the search path
pub const DEFAULT_INTERPRETER: &str = "R";

/// Flags passed before `-e <script>`: no workspace save, no banner or echo
pub const INTERPRETER_FLAGS: [&str; 2] = ["--no-save", "--slave"];

/// Find `name` on `search_path`, or on `$PATH` when `search_path` is `None`.
///
/// Relative entries of `search_path` (including empty ones) are resolved
/// against `cwd`, so the returned path is the file that will be executed.
pub fn locate_interpreter(
    name: &str,
    search_path: Option<&OsStr>,
    cwd: &Path,
) -> Result<PathBuf, BackendError> {
    let not_found = || BackendError::InterpreterNotFound {
        name: name.to_string(),
    };

    if name.is_empty() {
        return Err(not_found());
    }

    let found = match search_path {
        None => which::which(name),
        Some(paths) => {
            let resolved = env::join_paths(env::split_paths(paths).map(|dir| {
                if dir.is_absolute() {
                    dir
                } else {
                    cwd.join(dir)
                }
            }))
            .map_err(|_| not_found())?;
            which::which_in(name, Some(resolved), cwd)
        }
    };

    let path = found.map_err(|e| {
        debug!(interpreter = name, error = %e, "Interpreter lookup failed");
        not_found()
    })?;

    Ok(if path.is_absolute() { path } else { cwd.join(path) })
}

/// Build `interpreter --no-save --slave -e <script>` with all output discarded
fn interpreter_command(program: &Path, script: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(INTERPRETER_FLAGS);
    cmd.arg("-e").arg(script);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());
    cmd
}

/// What is known about a launched backend process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStatus {
    /// The launch task is queued but has not spawned the child yet
    Scheduled,
    /// The child process is running
    Running { pid: u32 },
    /// The child exited; `code` is `None` when killed by a signal
    Exited { code: Option<i32> },
    /// The child could not be spawned or waited on
    Failed { reason: String },
}

impl LaunchStatus {
    /// True once the child has exited or failed to start
    pub fn is_finished(&self) -> bool {
        matches!(self, LaunchStatus::Exited { .. } | LaunchStatus::Failed { .. })
    }
}

/// Read side of a launch, handed back to whoever started the backend
#[derive(Debug, Clone)]
pub struct LaunchMonitor {
    port: u16,
    rx: watch::Receiver<LaunchStatus>,
}

impl LaunchMonitor {
    /// Port the launched backend was told to bind
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Latest known status
    pub fn status(&self) -> LaunchStatus {
        self.rx.borrow().clone()
    }

    /// Wait until the child exits or fails to start.
    pub async fn finished(&mut self) -> LaunchStatus {
        let finished = self
            .rx
            .wait_for(LaunchStatus::is_finished)
            .await
            .map(|status| LaunchStatus::clone(&status))
            .ok();

        // Launch task went away without reporting; return whatever it left
        finished.unwrap_or_else(|| self.rx.borrow().clone())
    }
}

/// Start `interpreter --no-save --slave -e <script>` in the background.
///
/// Must be called from within a tokio runtime. The child's output is discarded.
pub fn launch(interpreter: &Path, script: String, port: u16) -> LaunchMonitor {
    let (tx, rx) = watch::channel(LaunchStatus::Scheduled);
    let program = interpreter.to_path_buf();

    tokio::spawn(async move {
        let mut cmd = interpreter_command(&program, &script);

        debug!(program = %program.display(), port, "Spawning backend process");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(program = %program.display(), port, error = %e, "Failed to spawn backend process");
                tx.send_replace(LaunchStatus::Failed {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let pid = child.id().unwrap_or(0);
        info!(pid, port, "Backend process spawned");
        tx.send_replace(LaunchStatus::Running { pid });

        match child.wait().await {
            Ok(status) => {
                if status.success() {
                    info!(pid, port, "Backend process exited");
                } else {
                    warn!(pid, port, ?status, "Backend process exited with failure");
                }
                tx.send_replace(LaunchStatus::Exited {
                    code: status.code(),
                });
            }
            Err(e) => {
                error!(pid, port, error = %e, "Error waiting for backend process");
                tx.send_replace(LaunchStatus::Failed {
                    reason: e.to_string(),
                });
            }
        }
    });

    LaunchMonitor { port, rx }
}
