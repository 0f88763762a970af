//! Maintenance action that runs a command.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use upkeep_core::{
    Issue, IssueSeverity, MaintenanceAction, MaintenanceResult, MaintenanceTask, UpkeepError,
    UpkeepResult,
};

use crate::process::run_command;

/// Runs a command for a task. Stdout lines starting with `recommend:` become
/// recommendations; `metric: <name>=<value>` lines become metrics.
#[derive(Debug, Clone)]
pub struct CommandAction {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandAction {
    pub fn new(command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl MaintenanceAction for CommandAction {
    async fn run(&self, task: &MaintenanceTask) -> UpkeepResult<MaintenanceResult> {
        let output = run_command(&format!("task {}", task.id), &self.command, self.timeout, &[])
            .await
            .map_err(|e| UpkeepError::TaskExecution {
                task: task.id.clone(),
                reason: e.to_string(),
            })?;

        let mut recommendations = Vec::new();
        let mut metrics = BTreeMap::new();
        for line in output.stdout.lines().map(str::trim) {
            if let Some(text) = line.strip_prefix("recommend:") {
                recommendations.push(text.trim().to_string());
            } else if let Some((name, value)) = line
                .strip_prefix("metric:")
                .and_then(|rest| rest.split_once('='))
            {
                if let Ok(value) = value.trim().parse::<f64>() {
                    metrics.insert(name.trim().to_string(), value);
                }
            }
        }

        let issues = if output.success() {
            Vec::new()
        } else {
            vec![Issue {
                severity: IssueSeverity::High,
                category: task.category.clone(),
                description: output.failure_reason(),
                component: task.id.clone(),
                auto_fixable: false,
                solution: None,
            }]
        };

        Ok(MaintenanceResult {
            success: output.success(),
            duration_ms: output.duration_ms,
            issues,
            recommendations,
            metrics,
        })
    }
}
