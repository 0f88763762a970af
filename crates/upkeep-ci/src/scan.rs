//! Vulnerability scanner backed by a command printing JSON findings.

use std::time::Duration;

use async_trait::async_trait;
use upkeep_core::{UpkeepError, UpkeepResult, Vulnerability, VulnerabilityScanner};

use crate::process::run_command;

/// Runs `scan` and parses its stdout as a JSON array of [`Vulnerability`].
///
/// A non-zero exit with valid JSON on stdout still counts as a scan: many
/// audit tools exit non-zero when they find something. The optional `fix`
/// command receives the packages to fix as trailing arguments.
#[derive(Debug, Clone)]
pub struct CommandScanner {
    scan: Vec<String>,
    fix: Option<Vec<String>>,
    timeout: Duration,
}

impl CommandScanner {
    pub fn new(scan: Vec<String>, fix: Option<Vec<String>>, timeout_secs: u64) -> Self {
        Self {
            scan,
            fix,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl VulnerabilityScanner for CommandScanner {
    async fn scan(&self) -> UpkeepResult<Vec<Vulnerability>> {
        let output = run_command("vulnerability scan", &self.scan, self.timeout, &[])
            .await
            .map_err(|e| UpkeepError::Scan(e.to_string()))?;

        let stdout = output.stdout.trim();
        if stdout.is_empty() {
            if output.success() {
                return Ok(Vec::new());
            }
            return Err(UpkeepError::Scan(output.failure_reason()));
        }
        serde_json::from_str(stdout)
            .map_err(|e| UpkeepError::Scan(format!("unreadable scanner output: {e}")))
    }

    async fn apply_fixes(&self, findings: &[Vulnerability]) -> UpkeepResult<usize> {
        let Some(fix) = &self.fix else {
            return Ok(0);
        };
        if findings.is_empty() {
            return Ok(0);
        }

        let mut command = fix.clone();
        command.extend(findings.iter().map(|v| v.package.clone()));
        let output = run_command("vulnerability fix", &command, self.timeout, &[])
            .await
            .map_err(|e| UpkeepError::Scan(e.to_string()))?;
        if !output.success() {
            return Err(UpkeepError::Scan(format!(
                "fix command failed: {}",
                output.failure_reason()
            )));
        }
        Ok(findings.len())
    }
}
