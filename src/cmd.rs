use std::path::Path;
use std::process::{Command, Output, Stdio};

use crate::error::{DeployError, DeployResult};

/// Run a command and capture its output. Fails if the command
/// returns a non-zero exit code.
pub fn run(program: &str, args: &[&str]) -> DeployResult<String> {
    run_in(None, program, args)
}

/// Like [`run`], with an optional working directory.
pub fn run_in(dir: Option<&Path>, program: &str, args: &[&str]) -> DeployResult<String> {
    let output = spawn(dir, program, args)?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let command = format_command(program, args);
        if !stderr.is_empty() {
            tracing::debug!(%command, %stderr, "command stderr");
        }
        Err(DeployError::CommandFailed {
            command,
            status: output.status,
        })
    }
}

/// Run a command and return whether it exited successfully.
/// Output is discarded; a missing binary counts as failure.
#[must_use]
pub fn succeeds(dir: Option<&Path>, program: &str, args: &[&str]) -> bool {
    spawn(dir, program, args).is_ok_and(|o| o.status.success())
}

/// Run a command with stdout/stderr inherited so long-running
/// tool output (image builds) streams straight through.
pub fn run_interactive_in(dir: Option<&Path>, program: &str, args: &[&str]) -> DeployResult<()> {
    streamed(dir, &[], program, args)
}

/// Like [`run_interactive_in`], with extra environment variables
/// set for the child.
pub fn run_interactive_env(
    env: &[(&str, &str)],
    program: &str,
    args: &[&str],
) -> DeployResult<()> {
    streamed(None, env, program, args)
}

fn streamed(
    dir: Option<&Path>,
    env: &[(&str, &str)],
    program: &str,
    args: &[&str],
) -> DeployResult<()> {
    let mut command = Command::new(program);
    command
        .args(args)
        .envs(env.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if let Some(dir) = dir {
        command.current_dir(dir);
    }

    let status = command.status().map_err(|e| not_found_or_io(program, e))?;

    if status.success() {
        Ok(())
    } else {
        Err(DeployError::CommandFailed {
            command: format_command(program, args),
            status,
        })
    }
}

/// Run a command that pipes its stdin from a byte slice.
pub fn run_with_stdin(program: &str, args: &[&str], stdin_data: &[u8]) -> DeployResult<String> {
    use std::io::Write;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| not_found_or_io(program, e))?;

    if let Some(stdin) = &mut child.stdin {
        stdin.write_all(stdin_data)?;
    }
    drop(child.stdin.take());

    let output = child.wait_with_output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let command = format_command(program, args);
        tracing::debug!(%command, %stderr, "command stderr");
        Err(DeployError::CommandFailed {
            command,
            status: output.status,
        })
    }
}

/// Check if a command exists on PATH.
#[must_use]
pub fn command_exists(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// Run a command capturing stdout and stderr without judging
/// the exit code.
pub fn output_in(dir: Option<&Path>, program: &str, args: &[&str]) -> DeployResult<Output> {
    spawn(dir, program, args)
}

fn spawn(dir: Option<&Path>, program: &str, args: &[&str]) -> DeployResult<Output> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    command.output().map_err(|e| not_found_or_io(program, e))
}

fn not_found_or_io(program: &str, e: std::io::Error) -> DeployError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DeployError::CommandNotFound(program.to_string())
    } else {
        DeployError::Io(e)
    }
}

fn format_command(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().map(|a| (*a).to_string()));
    parts.join(" ")
}
