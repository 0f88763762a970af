//! Orchestrator configuration.
//!
//! Accepted at construction and patched at runtime through [`ConfigPatch`].
//! Every scoring constant is named and overridable; the defaults reflect a
//! bias towards maintenance hygiene and are not fixed rules.

use serde::{Deserialize, Serialize};

use crate::error::{UpkeepError, UpkeepResult};

/// Weights, thresholds and penalties used by the health scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub maintenance_weight: f64,
    pub ci_weight: f64,
    pub evolution_weight: f64,
    /// Overall score below this is critical.
    pub critical_below: f64,
    /// Overall score below this is a warning.
    pub warning_below: f64,
    pub overdue_penalty_per_day: f64,
    pub overdue_penalty_cap: f64,
    pub failed_task_penalty: f64,
    pub recent_completion_bonus: f64,
    /// Number of most recent jobs in the CI success rate.
    pub ci_window: usize,
    pub active_job_penalty: f64,
    pub milestone_weight: f64,
    pub compliance_weight: f64,
    pub technology_weight: f64,
    /// Fraction of linear expected progress a milestone must reach.
    pub on_track_ratio: f64,
    pub max_minor_version_lag: u64,
    pub minors_per_major: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            maintenance_weight: 0.4,
            ci_weight: 0.3,
            evolution_weight: 0.3,
            critical_below: 60.0,
            warning_below: 80.0,
            overdue_penalty_per_day: 5.0,
            overdue_penalty_cap: 30.0,
            failed_task_penalty: 15.0,
            recent_completion_bonus: 2.0,
            ci_window: 10,
            active_job_penalty: 10.0,
            milestone_weight: 0.4,
            compliance_weight: 0.3,
            technology_weight: 0.3,
            on_track_ratio: 0.8,
            max_minor_version_lag: 2,
            minors_per_major: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Never apply fixes automatically unless set.
    #[serde(default)]
    pub enable_automatic_fixes: bool,
    #[serde(default = "default_true")]
    pub enable_notifications: bool,
    /// Minimum acceptable performance score, 0-100.
    #[serde(default = "default_performance_threshold")]
    pub performance_threshold: u8,
    #[serde(default = "default_test_timeout_ms")]
    pub test_timeout_ms: u64,
    /// Upper bound on suites executing at once inside a wave.
    #[serde(default = "default_parallel_jobs")]
    pub parallel_jobs: usize,
    #[serde(default = "default_environments")]
    pub deployment_environments: Vec<String>,
    #[serde(default = "default_channels")]
    pub notification_channels: Vec<String>,
    #[serde(default = "default_reporting_interval_hours")]
    pub reporting_interval_hours: u64,
    /// Finished jobs kept in history; oldest evicted first.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Task run once immediately when the scheduler starts.
    #[serde(default = "default_health_check_task_id")]
    pub health_check_task_id: String,
    /// Acknowledged alerts older than this are purged.
    #[serde(default = "default_alert_retention_hours")]
    pub alert_retention_hours: u64,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

fn default_true() -> bool {
    true
}
fn default_performance_threshold() -> u8 {
    80
}
fn default_test_timeout_ms() -> u64 {
    300_000
}
fn default_parallel_jobs() -> usize {
    4
}
fn default_environments() -> Vec<String> {
    vec!["staging".to_string(), "production".to_string()]
}
fn default_channels() -> Vec<String> {
    vec!["console".to_string()]
}
fn default_reporting_interval_hours() -> u64 {
    24
}
fn default_history_limit() -> usize {
    50
}
fn default_health_check_task_id() -> String {
    "health-check".to_string()
}
fn default_alert_retention_hours() -> u64 {
    24
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enable_automatic_fixes: false,
            enable_notifications: default_true(),
            performance_threshold: default_performance_threshold(),
            test_timeout_ms: default_test_timeout_ms(),
            parallel_jobs: default_parallel_jobs(),
            deployment_environments: default_environments(),
            notification_channels: default_channels(),
            reporting_interval_hours: default_reporting_interval_hours(),
            history_limit: default_history_limit(),
            health_check_task_id: default_health_check_task_id(),
            alert_retention_hours: default_alert_retention_hours(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> UpkeepResult<()> {
        if self.performance_threshold > 100 {
            return Err(UpkeepError::InvalidConfig(format!(
                "performance_threshold must be 0-100, got {}",
                self.performance_threshold
            )));
        }
        if self.parallel_jobs == 0 {
            return Err(UpkeepError::InvalidConfig(
                "parallel_jobs must be at least 1".to_string(),
            ));
        }
        if self.reporting_interval_hours == 0 {
            return Err(UpkeepError::InvalidConfig(
                "reporting_interval_hours must be at least 1".to_string(),
            ));
        }
        if self.history_limit == 0 {
            return Err(UpkeepError::InvalidConfig(
                "history_limit must be at least 1".to_string(),
            ));
        }
        let weights = self.scoring.maintenance_weight
            + self.scoring.ci_weight
            + self.scoring.evolution_weight;
        if weights <= 0.0 {
            return Err(UpkeepError::InvalidConfig(
                "scoring weights must sum to a positive value".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply a partial update. On validation failure `self` is left unchanged.
    pub fn apply(&mut self, patch: ConfigPatch) -> UpkeepResult<()> {
        let mut next = self.clone();
        if let Some(v) = patch.enable_automatic_fixes {
            next.enable_automatic_fixes = v;
        }
        if let Some(v) = patch.enable_notifications {
            next.enable_notifications = v;
        }
        if let Some(v) = patch.performance_threshold {
            next.performance_threshold = v;
        }
        if let Some(v) = patch.test_timeout_ms {
            next.test_timeout_ms = v;
        }
        if let Some(v) = patch.parallel_jobs {
            next.parallel_jobs = v;
        }
        if let Some(v) = patch.deployment_environments {
            next.deployment_environments = v;
        }
        if let Some(v) = patch.notification_channels {
            next.notification_channels = v;
        }
        if let Some(v) = patch.reporting_interval_hours {
            next.reporting_interval_hours = v;
        }
        if let Some(v) = patch.history_limit {
            next.history_limit = v;
        }
        if let Some(v) = patch.health_check_task_id {
            next.health_check_task_id = v;
        }
        if let Some(v) = patch.alert_retention_hours {
            next.alert_retention_hours = v;
        }
        if let Some(v) = patch.scoring {
            next.scoring = v;
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

/// Partial configuration update; `None` leaves a key untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub enable_automatic_fixes: Option<bool>,
    pub enable_notifications: Option<bool>,
    pub performance_threshold: Option<u8>,
    pub test_timeout_ms: Option<u64>,
    pub parallel_jobs: Option<usize>,
    pub deployment_environments: Option<Vec<String>>,
    pub notification_channels: Option<Vec<String>>,
    pub reporting_interval_hours: Option<u64>,
    pub history_limit: Option<usize>,
    pub health_check_task_id: Option<String>,
    pub alert_retention_hours: Option<u64>,
    pub scoring: Option<ScoringConfig>,
}
