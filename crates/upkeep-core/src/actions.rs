//! Builtin maintenance actions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alerts::AlertManager;
use crate::domain::{
    AlertSeverity, Issue, IssueSeverity, MaintenanceResult, MaintenanceTask,
};
use crate::error::UpkeepResult;
use crate::health::HealthScorer;
use crate::obs::emit_health_computed;
use crate::scheduler::MaintenanceAction;

/// Recomputes health and raises threshold alerts.
pub struct HealthCheckAction {
    scorer: Arc<HealthScorer>,
    alerts: Arc<AlertManager>,
}

impl HealthCheckAction {
    pub fn new(scorer: Arc<HealthScorer>, alerts: Arc<AlertManager>) -> Self {
        Self { scorer, alerts }
    }
}

fn issue_severity(severity: AlertSeverity) -> IssueSeverity {
    match severity {
        AlertSeverity::Info => IssueSeverity::Low,
        AlertSeverity::Warning => IssueSeverity::Medium,
        AlertSeverity::Error => IssueSeverity::High,
        AlertSeverity::Critical => IssueSeverity::Critical,
    }
}

#[async_trait]
impl MaintenanceAction for HealthCheckAction {
    async fn run(&self, task: &MaintenanceTask) -> UpkeepResult<MaintenanceResult> {
        let status = self.scorer.score();
        emit_health_computed(&status);
        let raised = self.alerts.generate(&status).await;

        let issues = raised
            .iter()
            .map(|alert| Issue {
                severity: issue_severity(alert.severity),
                category: task.category.clone(),
                description: alert.title.clone(),
                component: alert.alert_type.to_string(),
                auto_fixable: false,
                solution: alert.suggested_actions.first().cloned(),
            })
            .collect();
        let mut recommendations: Vec<String> = raised
            .iter()
            .flat_map(|a| a.suggested_actions.iter().cloned())
            .collect();
        recommendations.dedup();

        let metrics = BTreeMap::from([
            ("overall".to_string(), status.overall_score),
            ("maintenance".to_string(), status.maintenance.score),
            ("ci".to_string(), status.ci.score),
            ("evolution".to_string(), status.evolution.score),
        ]);

        Ok(MaintenanceResult {
            success: true,
            duration_ms: 0,
            issues,
            recommendations,
            metrics,
        })
    }
}

/// A finding reported by a [`VulnerabilityScanner`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vulnerability {
    pub title: String,
    pub severity: IssueSeverity,
    pub package: String,
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default)]
    pub auto_fixable: bool,
}

#[async_trait]
pub trait VulnerabilityScanner: Send + Sync {
    async fn scan(&self) -> UpkeepResult<Vec<Vulnerability>>;

    /// Apply fixes for the given findings. Returns how many were fixed.
    async fn apply_fixes(&self, findings: &[Vulnerability]) -> UpkeepResult<usize>;
}

/// Runs a vulnerability scan and maps findings to issues.
///
/// Fixes are applied only while the shared auto-fix flag is set.
pub struct SecurityScanAction {
    scanner: Arc<dyn VulnerabilityScanner>,
    auto_fix: Arc<AtomicBool>,
}

impl SecurityScanAction {
    pub fn new(scanner: Arc<dyn VulnerabilityScanner>, auto_fix: Arc<AtomicBool>) -> Self {
        Self { scanner, auto_fix }
    }
}

#[async_trait]
impl MaintenanceAction for SecurityScanAction {
    async fn run(&self, task: &MaintenanceTask) -> UpkeepResult<MaintenanceResult> {
        let findings = self.scanner.scan().await?;
        let (fixable, manual): (Vec<Vulnerability>, Vec<Vulnerability>) =
            findings.iter().cloned().partition(|v| v.auto_fixable);

        let mut recommendations = Vec::new();
        let mut fixed = 0;
        if !fixable.is_empty() {
            if self.auto_fix.load(Ordering::SeqCst) {
                fixed = self.scanner.apply_fixes(&fixable).await?;
                info!(task_id = %task.id, fixed, "applied automatic fixes");
            } else {
                recommendations.push(format!(
                    "{} finding(s) can be fixed automatically; enable automatic fixes or apply them manually",
                    fixable.len()
                ));
            }
        }
        if !manual.is_empty() {
            recommendations.push(format!(
                "{} finding(s) need a manual fix",
                manual.len()
            ));
        }

        // The scanner reports a count, not which findings it fixed, so fixable
        // findings only close when every one of them was fixed.
        let applied = !fixable.is_empty() && fixed >= fixable.len();
        if fixed > 0 && !applied {
            warn!(task_id = %task.id, fixed, fixable = fixable.len(), "automatic fixes incomplete");
            recommendations.push(format!(
                "{fixed} of {} automatic fix(es) applied; rescan to see which findings remain",
                fixable.len()
            ));
        }
        let open: Vec<&Vulnerability> = findings
            .iter()
            .filter(|v| !(applied && v.auto_fixable))
            .collect();
        let issues: Vec<Issue> = open
            .iter()
            .map(|v| Issue {
                severity: v.severity,
                category: task.category.clone(),
                description: v.title.clone(),
                component: v.package.clone(),
                auto_fixable: v.auto_fixable,
                solution: v.solution.clone(),
            })
            .collect();

        let metrics = BTreeMap::from([
            ("vulnerabilities".to_string(), findings.len() as f64),
            ("fixed".to_string(), fixed as f64),
        ]);

        Ok(MaintenanceResult {
            success: !issues.iter().any(|i| i.severity == IssueSeverity::Critical),
            duration_ms: 0,
            issues,
            recommendations,
            metrics,
        })
    }
}
