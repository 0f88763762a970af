//! Child process execution shared by every command-backed collaborator.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

/// What a finished command left behind.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stderr line, falling back to stdout.
    pub fn failure_reason(&self) -> String {
        let last = |s: &str| {
            s.lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
        };
        last(&self.stderr)
            .or_else(|| last(&self.stdout))
            .unwrap_or_else(|| format!("exited with code {}", self.exit_code))
    }
}

/// Run `command` (first element is the executable) to completion.
///
/// A zero `timeout` waits indefinitely. The child is killed when the
/// timeout elapses.
pub async fn run_command(
    label: &str,
    command: &[String],
    timeout: Duration,
    envs: &[(&str, &str)],
) -> anyhow::Result<CommandOutput> {
    let start = Instant::now();

    let Some((exe, args)) = command.split_first() else {
        anyhow::bail!("{label} has an empty command");
    };

    let child = Command::new(exe)
        .args(args)
        .envs(envs.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow::anyhow!("{label}: failed to spawn {exe}: {e}"))?;

    let output = if timeout.is_zero() {
        child.wait_with_output().await?
    } else {
        tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                anyhow::anyhow!("{label} timed out after {} ms", timeout.as_millis())
            })??
    };

    let output = CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    };
    tracing::debug!(
        label,
        exit_code = output.exit_code,
        duration_ms = output.duration_ms,
        "command finished"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_run_simple_command() {
        let out = run_command("echo", &sh("echo hello"), Duration::from_secs(10), &[])
            .await
            .expect("run");
        assert!(out.success());
        assert!(out.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_failing_command_reports_stderr() {
        let out = run_command(
            "broken",
            &sh("echo boom >&2; exit 3"),
            Duration::from_secs(10),
            &[],
        )
        .await
        .expect("run");
        assert!(!out.success());
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.failure_reason(), "boom");
    }

    #[tokio::test]
    async fn test_env_is_passed_through() {
        let out = run_command(
            "env",
            &sh("echo $UPKEEP_TEST_VALUE"),
            Duration::ZERO,
            &[("UPKEEP_TEST_VALUE", "42")],
        )
        .await
        .expect("run");
        assert_eq!(out.stdout.trim(), "42");
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let err = run_command("slow", &sh("sleep 5"), Duration::from_millis(50), &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let err = run_command("nothing", &[], Duration::ZERO, &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }

    #[test]
    fn test_failure_reason_falls_back_to_exit_code() {
        let out = CommandOutput {
            exit_code: 2,
            stdout: String::new(),
            stderr: "\n".to_string(),
            duration_ms: 1,
        };
        assert_eq!(out.failure_reason(), "exited with code 2");
    }
}
