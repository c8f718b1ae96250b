//! Runs resolved command specs as child processes, never through a shell (§4.2).

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::model::CommandSpec;

/// Grace period between SIGTERM and SIGKILL for a command that overran its timeout.
pub(crate) const KILL_GRACE: Duration = Duration::from_secs(2);

/// Captured result of one child-process invocation.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// The signal that killed the child, if it died from one instead of exiting
    /// normally (e.g. OOM-killed, segfault). Unix-only; always `None` elsewhere.
    pub signal: Option<i32>,
    pub duration_ms: u64,
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Spawn `spec.executable` directly (no `/bin/sh -c`), feed `stdin_data` if
/// present and close stdin, capture stdout/stderr as lossy UTF-8, and enforce
/// `spec.timeout_ms` with a SIGTERM-then-SIGKILL escalation.
///
/// Returns [`Error::SpawnError`] only when the OS refuses to start the
/// process; a non-zero exit or a timeout are reported through their own
/// variants so callers can feed them to the classifier.
pub async fn execute(spec: &CommandSpec, stdin_data: Option<&str>) -> Result<ExecutionOutput> {
    let start = Instant::now();

    let mut command = Command::new(&spec.executable);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(if stdin_data.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    let mut child = command.spawn().map_err(|err| Error::SpawnError(err.to_string()))?;

    if let Some(data) = stdin_data {
        let mut stdin = child.stdin.take().expect("stdin piped at spawn");
        let data = data.to_owned();
        // Detached: a provider that starts streaming before it has finished
        // reading stdin shouldn't deadlock the read side below.
        tokio::spawn(async move {
            let _ = stdin.write_all(data.as_bytes()).await;
            drop(stdin);
        });
    }

    let mut stdout_pipe = child.stdout.take().expect("stdout piped at spawn");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped at spawn");

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    let timeout_dur = Duration::from_millis(spec.timeout_ms);
    let status = match timeout(timeout_dur, child.wait()).await {
        Ok(status) => status.map_err(|err| Error::SpawnError(err.to_string()))?,
        Err(_) => {
            terminate(&mut child).await;
            return Err(Error::Timeout { timeout_ms: spec.timeout_ms });
        }
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    Ok(ExecutionOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        exit_code: status.code(),
        signal: exit_signal(&status),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// SIGTERM, wait [`KILL_GRACE`], then SIGKILL if the child is still alive.
async fn terminate(child: &mut Child) {
    send_signal(child, libc::SIGTERM);

    if timeout(KILL_GRACE, child.wait()).await.is_ok() {
        return;
    }

    send_signal(child, libc::SIGKILL);
    let _ = child.wait().await;
}

#[cfg(unix)]
pub(crate) fn send_signal(child: &Child, signal: libc::c_int) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, signal);
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn send_signal(child: &mut Child, _signal: libc::c_int) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn spec(executable: &str, args: &[&str], timeout_ms: u64) -> CommandSpec {
        CommandSpec {
            executable: executable.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: HashMap::new(),
            cwd: None,
            timeout_ms,
        }
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let output = execute(&spec("/bin/echo", &["hello"], 5_000), None).await.unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.exit_code, Some(0));
    }

    #[tokio::test]
    async fn feeds_and_closes_stdin() {
        let output = execute(&spec("/bin/cat", &[], 5_000), Some("from stdin")).await.unwrap();
        assert_eq!(output.stdout, "from stdin");
    }

    #[tokio::test]
    async fn reports_non_zero_exit_code() {
        let output = execute(&spec("/bin/sh", &["-c", "exit 7"], 5_000), None).await.unwrap();
        assert_eq!(output.exit_code, Some(7));
    }

    #[tokio::test]
    async fn reports_signal_for_self_killed_child() {
        let output = execute(&spec("/bin/sh", &["-c", "kill -KILL $$"], 5_000), None).await.unwrap();
        assert_eq!(output.exit_code, None);
        assert_eq!(output.signal, Some(libc::SIGKILL));
    }

    #[tokio::test]
    async fn spawn_failure_surfaces_spawn_error() {
        let result = execute(&spec("/no/such/executable", &[], 5_000), None).await;
        assert!(matches!(result, Err(Error::SpawnError(_))));
    }

    #[tokio::test]
    async fn timeout_kills_long_running_child() {
        let result = execute(&spec("/bin/sleep", &["5"], 50), None).await;
        assert!(matches!(result, Err(Error::Timeout { timeout_ms: 50 })));
    }
}
