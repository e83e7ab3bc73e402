use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::error::SessionError;

/// Program and argv for a session, plus the text shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCommand {
    pub program: String,
    pub args: Vec<String>,
    pub display: String,
}

impl SessionCommand {
    /// With `shell`, the command line runs under `sh -c`; otherwise it is split with
    /// POSIX shell quoting rules and executed directly.
    pub fn parse(command: &str, shell: bool) -> Result<Self, SessionError> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Err(SessionError::InvalidCommand {
                reason: "command must not be empty".to_string(),
            });
        }

        if shell {
            return Ok(Self {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), trimmed.to_string()],
                display: trimmed.to_string(),
            });
        }

        let mut argv = shlex::split(trimmed).ok_or_else(|| SessionError::InvalidCommand {
            reason: format!("unbalanced quoting in {trimmed:?}"),
        })?;
        if argv.is_empty() {
            return Err(SessionError::InvalidCommand {
                reason: "command must not be empty".to_string(),
            });
        }

        let program = argv.remove(0);
        Ok(Self {
            program,
            args: argv,
            display: trimmed.to_string(),
        })
    }
}

/// Uniform handle over one child's standard streams. No pseudo-terminal is allocated.
pub struct ProcessPipe {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl ProcessPipe {
    pub fn spawn(command: &SessionCommand, cwd: Option<&Path>) -> Result<Self, SessionError> {
        let spawn_error = |source| SessionError::Spawn {
            command: command.display.clone(),
            source,
        };

        let mut builder = Command::new(&command.program);
        builder
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(cwd) = cwd {
            builder.current_dir(cwd);
        }

        // Own process group so close() can signal the whole tree.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            builder.process_group(0);
        }

        let mut child = builder.spawn().map_err(spawn_error)?;
        let missing = |stream: &str| {
            spawn_error(std::io::Error::other(format!("child {stream} was not captured")))
        };

        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        debug!(pid = child.id(), command = %command.display, "spawned session process");
        Ok(Self {
            child,
            stdin,
            stdout,
            stderr,
        })
    }
}

/// Sends SIGTERM to the child's process group, waits up to `grace`, then SIGKILLs.
pub(crate) fn terminate(child: &mut Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    let pid = child.id();
    signal_group(pid, Signal::Term);

    match child.wait_timeout(grace) {
        Ok(Some(status)) => {
            debug!(pid, ?status, "session process exited after SIGTERM");
            return;
        }
        Ok(None) => debug!(pid, "session process ignored SIGTERM; killing"),
        Err(error) => warn!(pid, %error, "waiting for session process failed; killing"),
    }

    signal_group(pid, Signal::Kill);
    let _ = child.kill();
    let _ = child.wait();
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: Signal) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    let signal = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };

    // SAFETY: kill(2) with a negative pid only signals the process group created for
    // this child; it has no memory-safety preconditions.
    unsafe {
        libc::kill(-pgid, signal);
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: Signal) {}
