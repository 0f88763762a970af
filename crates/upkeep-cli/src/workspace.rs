//! The JSON workspace file and how it becomes an [`Orchestrator`].
//!
//! ```json
//! {
//!   "config": { "parallel_jobs": 2, "notification_channels": ["console", "ops"] },
//!   "suite_commands": { "unit-tests": { "command": ["cargo", "test"], "timeout_secs": 600 } },
//!   "tasks": [
//!     { "id": "health-check", "name": "Health check", "frequency": "daily",
//!       "priority": "high", "category": "monitoring", "action": { "kind": "health_check" } }
//!   ],
//!   "deploy": { "command": ["./deploy.sh"] },
//!   "webhooks": [{ "channel": "ops", "url": "https://hooks.example.com/${HOOK_TOKEN}" }]
//! }
//! ```
//!
//! Omitting `suites` selects the builtin catalog.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use upkeep_ci::{
    builtin_suites, CommandAction, CommandDeployTarget, CommandScanner, CommandSuiteExecutor,
    SuiteCommand, WebhookNotifier,
};
use upkeep_core::{
    EvolutionMilestone, MaintenanceTask, Orchestrator, OrchestratorConfig, SuiteExecutors,
    TechnologyEntry, TestSuite,
};

fn default_timeout_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploySection {
    pub command: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScannerSection {
    pub scan: Vec<String>,
    #[serde(default)]
    pub fix: Option<Vec<String>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookSection {
    /// Name to list in `notification_channels`.
    pub channel: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// What a workspace task does when it runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskAction {
    Command {
        command: Vec<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    HealthCheck,
    SecurityScan(ScannerSection),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceTask {
    #[serde(flatten)]
    pub task: MaintenanceTask,
    pub action: TaskAction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Workspace {
    pub config: OrchestratorConfig,
    /// `None` selects [`builtin_suites`].
    pub suites: Option<Vec<TestSuite>>,
    /// Command per suite id.
    pub suite_commands: HashMap<String, SuiteCommand>,
    pub tasks: Vec<WorkspaceTask>,
    pub milestones: Vec<EvolutionMilestone>,
    pub technologies: Vec<TechnologyEntry>,
    pub deploy: Option<DeploySection>,
    pub webhooks: Vec<WebhookSection>,
}

impl Workspace {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workspace file {}", path.display()))?;
        let workspace: Workspace = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid workspace file {}", path.display()))?;
        workspace.config.validate()?;
        Ok(workspace)
    }

    pub fn suites(&self) -> Vec<TestSuite> {
        self.suites.clone().unwrap_or_else(builtin_suites)
    }

    /// Enabled suites that have no command configured.
    pub fn suites_without_command(&self) -> Vec<String> {
        self.suites()
            .into_iter()
            .filter(|s| s.enabled && !self.suite_commands.contains_key(&s.id))
            .map(|s| s.id)
            .collect()
    }

    /// Wire every section into an orchestrator and register the tasks.
    pub fn build(&self) -> Result<Orchestrator> {
        let executor = Arc::new(CommandSuiteExecutor::new(self.suite_commands.clone()));
        let mut builder = Orchestrator::builder(self.config.clone())
            .suites(self.suites())
            .executors(SuiteExecutors::uniform(executor))
            .milestones(self.milestones.clone())
            .technologies(self.technologies.clone());

        if let Some(deploy) = &self.deploy {
            builder = builder.deploy_target(Arc::new(CommandDeployTarget::new(
                deploy.command.clone(),
                deploy.timeout_secs,
            )));
        }
        for hook in &self.webhooks {
            let notifier = WebhookNotifier::new(&hook.channel, &hook.url, hook.headers.clone())
                .with_context(|| format!("Invalid webhook channel {}", hook.channel))?;
            builder = builder.notifier(Arc::new(notifier));
        }

        let orchestrator = builder.build()?;
        for entry in &self.tasks {
            let task = entry.task.clone();
            match &entry.action {
                TaskAction::Command {
                    command,
                    timeout_secs,
                } => orchestrator.register_task(
                    task,
                    Arc::new(CommandAction::new(command.clone(), *timeout_secs)),
                ),
                TaskAction::HealthCheck => orchestrator.register_health_check(task),
                TaskAction::SecurityScan(scanner) => orchestrator.register_security_scan(
                    task,
                    Arc::new(CommandScanner::new(
                        scanner.scan.clone(),
                        scanner.fix.clone(),
                        scanner.timeout_secs,
                    )),
                ),
            }
        }
        Ok(orchestrator)
    }
}
