//! Recurring maintenance tasks and their results.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskFrequency {
    Daily,
    Weekly,
    Monthly,
    OnDemand,
}

impl TaskFrequency {
    /// Rescheduling period; `None` for on-demand tasks.
    pub fn period(&self) -> Option<Duration> {
        match self {
            TaskFrequency::Daily => Some(Duration::hours(24)),
            TaskFrequency::Weekly => Some(Duration::days(7)),
            TaskFrequency::Monthly => Some(Duration::days(30)),
            TaskFrequency::OnDemand => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A finding reported by a maintenance task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub category: String,
    pub description: String,
    pub component: String,
    pub auto_fixable: bool,
    pub solution: Option<String>,
}

/// Outcome of one maintenance task execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MaintenanceResult {
    pub success: bool,
    pub duration_ms: u64,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl MaintenanceResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Failed result carrying a single critical issue describing `error`.
    pub fn execution_error(task: &MaintenanceTask, error: &str) -> Self {
        Self {
            success: false,
            duration_ms: 0,
            issues: vec![Issue {
                severity: IssueSeverity::Critical,
                category: task.category.clone(),
                description: format!("Task execution failed: {error}"),
                component: task.id.clone(),
                auto_fixable: false,
                solution: Some("Inspect the task logs and re-run it manually".to_string()),
            }],
            recommendations: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }
}

/// A recurring (or on-demand) unit of maintenance work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceTask {
    pub id: String,
    pub name: String,
    pub frequency: TaskFrequency,
    pub priority: TaskPriority,
    pub category: String,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_result: Option<MaintenanceResult>,
}

fn default_status() -> TaskStatus {
    TaskStatus::Pending
}

impl MaintenanceTask {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        frequency: TaskFrequency,
        priority: TaskPriority,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            frequency,
            priority,
            category: category.into(),
            status: TaskStatus::Pending,
            last_run: None,
            next_run: None,
            last_result: None,
        }
    }

    /// True when the task has a scheduled run in the past.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.next_run, Some(next) if next < now)
    }

    /// Time past `next_run`, zero when not overdue.
    pub fn overdue_by(&self, now: DateTime<Utc>) -> Duration {
        match self.next_run {
            Some(next) if next < now => now - next,
            _ => Duration::zero(),
        }
    }
}
