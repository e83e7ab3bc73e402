use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};
use wait_timeout::ChildExt;

use crate::error::ToolError;
use crate::workspace::Workspace;

pub const RUN_MAX_OUTPUT_BYTES: usize = 100 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunCommandArgs {
    pub command: String,
    #[serde(default)]
    pub timeout_sec: Option<u64>,
    #[serde(default)]
    pub cwd: Option<String>,
}

/// Runs `command` under `sh -c` in the workspace, killing its process group on
/// timeout. Non-zero exits and timeouts are failures carrying the same report.
pub fn run_command(
    workspace: &Workspace,
    args: &RunCommandArgs,
    default_timeout: Duration,
) -> Result<String, ToolError> {
    if args.command.trim().is_empty() {
        return Err(ToolError::invalid_arguments(
            crate::schema::RUN_COMMAND,
            "command must not be empty",
        ));
    }

    let timeout = args
        .timeout_sec
        .map_or(default_timeout, Duration::from_secs);
    let cwd = match &args.cwd {
        Some(cwd) => {
            let path = workspace.resolve_existing(cwd)?;
            if !path.is_dir() {
                return Err(ToolError::invalid_path(cwd, "expected a directory"));
            }
            path
        }
        None => workspace.root().to_path_buf(),
    };

    let mut builder = Command::new("sh");
    builder
        .arg("-c")
        .arg(&args.command)
        .current_dir(&cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        builder.process_group(0);
    }

    let mut child = builder
        .spawn()
        .map_err(|error| ToolError::CommandFailed(format!("failed to launch command: {error}")))?;
    debug!(pid = child.id(), command = %args.command, "command started");

    let stdout = collect_pipe(child.stdout.take());
    let stderr = collect_pipe(child.stderr.take());

    let (timed_out, status) = match child.wait_timeout(timeout) {
        Ok(Some(status)) => (false, status),
        Ok(None) => {
            kill_tree(&mut child);
            let status = child.wait().map_err(|error| {
                ToolError::CommandFailed(format!(
                    "command timed out after {}s and wait failed: {error}",
                    timeout.as_secs()
                ))
            })?;
            (true, status)
        }
        Err(error) => {
            kill_tree(&mut child);
            let _ = child.wait();
            return Err(ToolError::CommandFailed(format!(
                "failed waiting for command: {error}"
            )));
        }
    };

    let status_label = if timed_out {
        format!("timeout after {}s", timeout.as_secs())
    } else {
        format_exit_status(status)
    };
    let report = truncate_to_byte_limit(
        format!(
            "status: {status_label}\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&join_pipe(stdout)),
            String::from_utf8_lossy(&join_pipe(stderr))
        ),
        RUN_MAX_OUTPUT_BYTES,
    );

    info!(command = %args.command, status = %status_label, "command finished");
    if !timed_out && status.success() {
        Ok(report)
    } else {
        Err(ToolError::CommandFailed(report))
    }
}

fn collect_pipe(pipe: Option<impl Read + Send + 'static>) -> Option<JoinHandle<Vec<u8>>> {
    let mut pipe = pipe?;
    thread::Builder::new()
        .name("run-command-pipe".to_string())
        .spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            bytes
        })
        .ok()
}

fn join_pipe(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn kill_tree(child: &mut std::process::Child) {
    #[cfg(unix)]
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) on the negated pid targets only the process group created
        // for this child; it has no memory-safety preconditions.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

fn format_exit_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit_code={code}"),
        None => "exit_code=terminated_by_signal".to_string(),
    }
}

fn truncate_to_byte_limit(content: String, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content;
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !content.is_char_boundary(cutoff) {
        cutoff -= 1;
    }

    let mut truncated = content[..cutoff].to_string();
    truncated.push_str("\n[truncated]");
    truncated
}
