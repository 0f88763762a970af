//! Derived health status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall severity bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthBucket {
    Healthy,
    Warning,
    Critical,
}

impl fmt::Display for HealthBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthBucket::Healthy => "healthy",
            HealthBucket::Warning => "warning",
            HealthBucket::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Score and counters for one domain (maintenance, ci or evolution).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DomainHealth {
    /// 0-100.
    pub score: f64,
    pub active_count: usize,
    pub issue_count: usize,
}

/// Raw counts the scores were derived from; consumed by alert thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct HealthSignals {
    pub overdue_tasks: usize,
    pub failed_tasks: usize,
    /// Percentage of passed jobs in the scoring window; `None` with no history.
    pub ci_success_rate: Option<f64>,
    pub ci_window: usize,
    pub active_jobs: usize,
    pub delayed_milestones: usize,
}

/// Freshly derived on every health check; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceStatus {
    pub overall: HealthBucket,
    pub overall_score: f64,
    pub maintenance: DomainHealth,
    pub ci: DomainHealth,
    pub evolution: DomainHealth,
    pub signals: HealthSignals,
    pub computed_at: DateTime<Utc>,
}
