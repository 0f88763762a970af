//! Suite executor that runs one command per suite.
//!
//! Exit code 0 means the suite passed. Stdout is scanned for a few line
//! conventions so reports carry per-test detail:
//!
//! - `ok <name>` and `FAIL <name>: <message>` become test outcomes
//! - `coverage: <pct>` sets every coverage figure to `pct`
//! - `score: <0-100>` is the performance score of a performance suite

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use upkeep_core::{
    Coverage, SuiteExecutor, SuiteOutcome, TestOutcome, TestSuite, UpkeepError, UpkeepResult,
};

use crate::process::run_command;

/// How to run one suite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteCommand {
    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Timeout in seconds; 0 defers to the suite's own timeout.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl SuiteCommand {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            timeout_secs: 0,
        }
    }

    /// Run `script` through `sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new(vec!["sh".to_string(), "-c".to_string(), script.into()])
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Runs suites as child processes, looked up by suite id.
#[derive(Debug, Clone, Default)]
pub struct CommandSuiteExecutor {
    commands: HashMap<String, SuiteCommand>,
}

impl CommandSuiteExecutor {
    pub fn new(commands: HashMap<String, SuiteCommand>) -> Self {
        Self { commands }
    }

    pub fn with_command(mut self, suite_id: impl Into<String>, command: SuiteCommand) -> Self {
        self.commands.insert(suite_id.into(), command);
        self
    }

    pub fn has_command(&self, suite_id: &str) -> bool {
        self.commands.contains_key(suite_id)
    }

    /// Smaller of the suite timeout and the command's own limit.
    fn timeout_for(suite: &TestSuite, command: &SuiteCommand) -> Duration {
        let suite_ms = suite.timeout_ms;
        let command_ms = command.timeout_secs.saturating_mul(1000);
        match (suite_ms, command_ms) {
            (0, c) => Duration::from_millis(c),
            (s, 0) => Duration::from_millis(s),
            (s, c) => Duration::from_millis(s.min(c)),
        }
    }
}

#[async_trait]
impl SuiteExecutor for CommandSuiteExecutor {
    async fn execute(&self, suite: &TestSuite) -> UpkeepResult<SuiteOutcome> {
        let command = self
            .commands
            .get(&suite.id)
            .ok_or_else(|| UpkeepError::SuiteExecution {
                suite: suite.id.clone(),
                reason: "no command configured".to_string(),
            })?;

        let output = run_command(
            &format!("suite {}", suite.id),
            &command.command,
            Self::timeout_for(suite, command),
            &[],
        )
        .await
        .map_err(|e| UpkeepError::SuiteExecution {
            suite: suite.id.clone(),
            reason: e.to_string(),
        })?;

        let mut outcome = parse_suite_output(&output.stdout);
        outcome.success = output.success();
        if !outcome.success && outcome.tests.iter().all(|t| t.passed) {
            outcome
                .tests
                .push(TestOutcome::failed(suite.id.clone(), output.failure_reason()));
        }
        Ok(outcome)
    }
}

/// Extract test outcomes, coverage and a performance score from stdout.
///
/// `success` in the returned outcome is always `true`; the exit code decides.
pub fn parse_suite_output(stdout: &str) -> SuiteOutcome {
    let mut outcome = SuiteOutcome::passed();
    for line in stdout.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix("ok ") {
            outcome.tests.push(TestOutcome::passed(name.trim()));
        } else if let Some(rest) = line.strip_prefix("FAIL ") {
            let test = match rest.split_once(": ") {
                Some((name, message)) => TestOutcome::failed(name.trim(), message.trim()),
                None => TestOutcome::failed(rest.trim(), "failed"),
            };
            outcome.tests.push(test);
        } else if let Some(pct) = line.strip_prefix("coverage:").and_then(parse_percent) {
            outcome.coverage = Some(Coverage {
                lines: pct,
                branches: pct,
                functions: pct,
                statements: pct,
            });
        } else if let Some(score) = line.strip_prefix("score:").and_then(parse_percent) {
            outcome.performance_score = Some(score);
        }
    }
    outcome
}

fn parse_percent(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().trim_end_matches('%').trim().parse().ok()?;
    (0.0..=100.0).contains(&value).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use upkeep_core::SuiteType;

    #[test]
    fn test_parse_outcomes_and_coverage() {
        let out = parse_suite_output(
            "running 3 tests\nok parser::tokens\nFAIL parser::eof: unexpected end\nok lexer\ncoverage: 82.5%\n",
        );
        assert_eq!(out.tests.len(), 3);
        assert!(out.tests[0].passed);
        assert_eq!(out.tests[1].name, "parser::eof");
        assert_eq!(out.tests[1].message.as_deref(), Some("unexpected end"));
        assert_eq!(out.coverage.map(|c| c.lines), Some(82.5));
        assert_eq!(out.performance_score, None);
    }

    #[test]
    fn test_parse_score_and_ignore_garbage() {
        let out = parse_suite_output("score: 91\ncoverage: lots\nscore: 250\n");
        assert_eq!(out.performance_score, Some(91.0));
        assert!(out.coverage.is_none());
    }

    #[test]
    fn test_timeout_takes_smaller_limit() {
        let suite = TestSuite::new("unit-tests", SuiteType::Unit).with_timeout_ms(10_000);
        let cmd = SuiteCommand::shell("true").with_timeout_secs(5);
        assert_eq!(
            CommandSuiteExecutor::timeout_for(&suite, &cmd),
            Duration::from_secs(5)
        );
        let cmd = SuiteCommand::shell("true");
        assert_eq!(
            CommandSuiteExecutor::timeout_for(&suite, &cmd),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn test_missing_command_is_an_execution_error() {
        let executor = CommandSuiteExecutor::default();
        let suite = TestSuite::new("lint", SuiteType::Unit);
        let err = executor.execute(&suite).await.unwrap_err();
        assert!(matches!(err, UpkeepError::SuiteExecution { .. }));
    }
}
