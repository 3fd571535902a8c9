//! Run shell commands with bounded concurrency; outputs come back in input order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{utils::task_error, FunnelError};
use crate::task_queue::limiter;
use crate::utils::log_debug;

/// How commands are run.
#[derive(Clone, Debug)]
pub struct ExecOptions {
    pub shell: String,
    pub timeout: Option<Duration>,
    pub cwd: PathBuf,
}

/// Captured result of one successful command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
}

/// `$SHELL` (or `sh`) on Unix, `cmd` on Windows.
pub fn default_shell() -> String {
    #[cfg(windows)]
    {
        "cmd".to_string()
    }
    #[cfg(not(windows))]
    {
        std::env::var("SHELL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "sh".to_string())
    }
}

fn shell_flag(shell: &str) -> &'static str {
    let name = std::path::Path::new(shell)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(shell);
    if name.eq_ignore_ascii_case("cmd") {
        "/c"
    } else {
        "-c"
    }
}

/// One command per line; blank lines and `#` comments are skipped.
pub fn parse_commands(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

/// Run a single command. Non-zero exit, spawn failure and timeout are task errors
/// tagged with `index`.
pub async fn run_command(index: usize, command: String, options: &ExecOptions) -> Result<CommandOutput, FunnelError> {
    log_debug(&format!("#{} starting: {}", index + 1, command));
    let mut cmd = Command::new(&options.shell);
    cmd.arg(shell_flag(&options.shell))
        .arg(&command)
        .current_dir(&options.cwd)
        .kill_on_drop(true);
    let child = cmd.output();

    let output = match options.timeout {
        Some(limit) => match tokio::time::timeout(limit, child).await {
            Ok(result) => result,
            Err(_) => {
                return Err(task_error(
                    "exec",
                    Some(index),
                    &format!("`{}` timed out after {:?}", command, limit),
                ))
            }
        },
        None => child.await,
    }
    .map_err(|e| task_error("exec", Some(index), &format!("could not start `{}`: {}", command, e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        let mut message = format!("`{}` failed with {}", command, output.status);
        if let Some(line) = last_line(&stderr) {
            message.push_str(": ");
            message.push_str(line);
        }
        return Err(task_error("exec", Some(index), &message));
    }
    log_debug(&format!("#{} finished: {}", index + 1, command));
    Ok(CommandOutput {
        command,
        stdout,
        stderr,
    })
}

/// Run every command, at most `concurrency` at a time. `on_settled` is called
/// once per command as it finishes, in completion order.
pub async fn run_commands<S>(
    concurrency: usize,
    commands: Vec<String>,
    options: ExecOptions,
    on_settled: S,
) -> Result<Vec<CommandOutput>, FunnelError>
where
    S: Fn() + Send + Sync + 'static,
{
    let options = Arc::new(options);
    let on_settled = Arc::new(on_settled);
    limiter(
        concurrency,
        commands.into_iter().enumerate(),
        move |(index, command): (usize, String)| {
            let options = Arc::clone(&options);
            let on_settled = Arc::clone(&on_settled);
            async move {
                let result = run_command(index, command, &options).await;
                on_settled();
                result
            }
        },
    )
    .await
}
