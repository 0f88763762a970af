//! Threshold alerts derived from health status, plus failure alerts for
//! tasks and pipeline jobs.
//!
//! Alerts are deduplicated by a stable `key`: while an alert with the same key
//! is unacknowledged it is refreshed in place instead of being raised again.
//! Acknowledged alerts older than the retention window are purged at the
//! start of every generation pass; unacknowledged alerts are never purged.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::domain::{
    Alert, AlertSeverity, AlertType, CiJob, DomainHealth, MaintenanceResult, MaintenanceStatus,
    MaintenanceTask, TaskPriority,
};
use crate::metrics::Metrics;
use crate::notify::{Notification, NotificationDispatcher};
use crate::obs::emit_alert_raised;

/// Fixed alerting thresholds.
mod thresholds {
    pub const OVERDUE_CRITICAL_ABOVE: usize = 3;
    pub const SCORE_WARNING_BELOW: f64 = 70.0;
    pub const SCORE_CRITICAL_BELOW: f64 = 50.0;
    pub const CI_RATE_WARNING_BELOW: f64 = 80.0;
    pub const CI_RATE_CRITICAL_BELOW: f64 = 60.0;
    pub const DELAYED_CRITICAL_ABOVE: usize = 2;
}

/// An alert before it has an id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub key: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub action_required: bool,
    pub suggested_actions: Vec<String>,
}

fn actions(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Threshold alerts a status calls for. Pure; does not touch stored alerts.
pub fn evaluate(status: &MaintenanceStatus) -> Vec<AlertCandidate> {
    use thresholds::*;
    let mut out = Vec::new();
    let signals = &status.signals;

    if signals.overdue_tasks > 0 {
        let severity = if signals.overdue_tasks > OVERDUE_CRITICAL_ABOVE {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        out.push(AlertCandidate {
            key: "maintenance.overdue_tasks".to_string(),
            alert_type: AlertType::Maintenance,
            severity,
            title: format!("{} maintenance task(s) overdue", signals.overdue_tasks),
            description: format!(
                "{} scheduled maintenance task(s) have passed their next run time without executing.",
                signals.overdue_tasks
            ),
            action_required: true,
            suggested_actions: actions(&[
                "Run the overdue tasks manually",
                "Check that the scheduler is running",
                "Review task frequencies against available capacity",
            ]),
        });
    }

    let domains: [(&str, AlertType, &DomainHealth, &[&str]); 3] = [
        (
            "maintenance",
            AlertType::Maintenance,
            &status.maintenance,
            &[
                "Resolve failed maintenance tasks",
                "Catch up on overdue maintenance",
            ],
        ),
        (
            "ci",
            AlertType::Ci,
            &status.ci,
            &[
                "Investigate the most recent failed pipeline runs",
                "Quarantine flaky suites",
            ],
        ),
        (
            "evolution",
            AlertType::Evolution,
            &status.evolution,
            &[
                "Re-plan delayed milestones",
                "Schedule upgrades for outdated technologies",
            ],
        ),
    ];
    for (name, alert_type, health, suggested) in domains {
        if health.score < SCORE_WARNING_BELOW {
            let severity = if health.score < SCORE_CRITICAL_BELOW {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            out.push(AlertCandidate {
                key: format!("{name}.score"),
                alert_type,
                severity,
                title: format!("{name} health score is {:.0}", health.score),
                description: format!(
                    "The {name} score dropped to {:.1} with {} open issue(s).",
                    health.score, health.issue_count
                ),
                action_required: severity == AlertSeverity::Critical,
                suggested_actions: actions(suggested),
            });
        }
    }

    if let Some(rate) = signals.ci_success_rate {
        if rate < CI_RATE_WARNING_BELOW {
            let severity = if rate < CI_RATE_CRITICAL_BELOW {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            out.push(AlertCandidate {
                key: "ci.success_rate".to_string(),
                alert_type: AlertType::Ci,
                severity,
                title: format!("CI success rate is {rate:.0}%"),
                description: format!(
                    "Only {rate:.1}% of the last {} pipeline run(s) passed.",
                    signals.ci_window
                ),
                action_required: true,
                suggested_actions: actions(&[
                    "Review failing suites in recent jobs",
                    "Fix or quarantine flaky tests",
                    "Check executor infrastructure for timeouts",
                ]),
            });
        }
    }

    if signals.delayed_milestones > 0 {
        let severity = if signals.delayed_milestones > DELAYED_CRITICAL_ABOVE {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        out.push(AlertCandidate {
            key: "evolution.delayed_milestones".to_string(),
            alert_type: AlertType::Evolution,
            severity,
            title: format!("{} milestone(s) delayed", signals.delayed_milestones),
            description: format!(
                "{} roadmap milestone(s) are delayed or past their target date.",
                signals.delayed_milestones
            ),
            action_required: true,
            suggested_actions: actions(&[
                "Re-estimate the delayed milestones",
                "Remove blockers or reassign owners",
                "Update target dates on the roadmap",
            ]),
        });
    }

    out
}

/// Owns every alert and its lifecycle.
pub struct AlertManager {
    alerts: Mutex<Vec<Alert>>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    retention: RwLock<Duration>,
}

impl AlertManager {
    pub fn new(
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        retention_hours: u64,
    ) -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            dispatcher,
            clock,
            metrics,
            retention: RwLock::new(Duration::hours(retention_hours as i64)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Alert>> {
        self.alerts.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_retention_hours(&self, hours: u64) {
        *self.retention.write().unwrap_or_else(|e| e.into_inner()) = Duration::hours(hours as i64);
    }

    /// Purge old acknowledged alerts, raise or refresh threshold alerts and
    /// dispatch a digest of every unacknowledged critical alert held.
    ///
    /// Returns the alerts raised or refreshed in this pass.
    pub async fn generate(&self, status: &MaintenanceStatus) -> Vec<Alert> {
        let now = self.clock.now();
        self.purge(now);
        let produced: Vec<Alert> = evaluate(status)
            .into_iter()
            .map(|candidate| self.upsert(candidate, now))
            .collect();
        // Includes task and job alerts raised since the last pass.
        let held = self.lock().clone();
        self.dispatch_critical(&held).await;
        produced
    }

    /// Raise an alert for a failed maintenance task.
    pub async fn record_task_failure(
        &self,
        task: &MaintenanceTask,
        result: &MaintenanceResult,
    ) -> Alert {
        let severity = if task.priority == TaskPriority::Critical {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Error
        };
        let mut description = format!("Maintenance task '{}' failed.", task.name);
        for issue in &result.issues {
            description.push(' ');
            description.push_str(&issue.description);
        }
        let candidate = AlertCandidate {
            key: format!("task.{}.failed", task.id),
            alert_type: AlertType::Maintenance,
            severity,
            title: format!("Task failed: {}", task.name),
            description,
            action_required: true,
            suggested_actions: actions(&[
                "Inspect the task result issues",
                "Re-run the task once the cause is fixed",
            ]),
        };
        let alert = self.upsert(candidate, self.clock.now());
        self.dispatch_critical(std::slice::from_ref(&alert)).await;
        alert
    }

    /// Raise an alert for a failed pipeline job.
    ///
    /// `critical` marks a failure of a critical suite.
    pub async fn record_job_failure(&self, job: &CiJob, critical: bool) -> Alert {
        let failed = job.failed_suites();
        let candidate = AlertCandidate {
            key: "ci.job_failed".to_string(),
            alert_type: AlertType::Ci,
            severity: if critical {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Error
            },
            title: format!("Pipeline {} {}", job.id, job.status),
            description: if failed.is_empty() {
                format!("Pipeline {} finished as {}.", job.id, job.status)
            } else {
                format!(
                    "Pipeline {} failed in suite(s): {}.",
                    job.id,
                    failed.join(", ")
                )
            },
            action_required: true,
            suggested_actions: actions(&[
                "Inspect the job logs and test reports",
                "Re-run the pipeline after fixing the failing suites",
            ]),
        };
        let alert = self.upsert(candidate, self.clock.now());
        self.dispatch_critical(std::slice::from_ref(&alert)).await;
        alert
    }

    fn upsert(&self, candidate: AlertCandidate, now: DateTime<Utc>) -> Alert {
        let mut alerts = self.lock();
        if let Some(existing) = alerts
            .iter_mut()
            .find(|a| !a.acknowledged && a.key == candidate.key)
        {
            existing.severity = candidate.severity;
            existing.title = candidate.title;
            existing.description = candidate.description;
            existing.action_required = candidate.action_required;
            existing.suggested_actions = candidate.suggested_actions;
            return existing.clone();
        }

        let alert = Alert {
            id: format!("alert-{}", uuid::Uuid::new_v4()),
            alert_type: candidate.alert_type,
            severity: candidate.severity,
            title: candidate.title,
            description: candidate.description,
            acknowledged: false,
            action_required: candidate.action_required,
            suggested_actions: candidate.suggested_actions,
            created_at: now,
            key: candidate.key,
        };
        alerts.push(alert.clone());
        drop(alerts);

        self.metrics.add_alerts(1);
        emit_alert_raised(&alert);
        alert
    }

    async fn dispatch_critical(&self, alerts: &[Alert]) {
        let critical: Vec<&Alert> = alerts
            .iter()
            .filter(|a| a.severity == AlertSeverity::Critical && !a.acknowledged)
            .collect();
        if critical.is_empty() {
            return;
        }
        let results = self.dispatcher.dispatch(&digest(&critical)).await;
        for _ in results.iter().filter(|r| !r.success) {
            self.metrics.inc_notification_failures();
        }
    }

    /// Drop acknowledged alerts created before the retention window.
    /// Returns how many were removed.
    pub fn purge(&self, now: DateTime<Utc>) -> usize {
        let retention = *self.retention.read().unwrap_or_else(|e| e.into_inner());
        let cutoff = now - retention;
        let mut alerts = self.lock();
        let before = alerts.len();
        alerts.retain(|a| !(a.acknowledged && a.created_at < cutoff));
        before - alerts.len()
    }

    /// Mark an alert acknowledged. Idempotent; `false` for unknown ids.
    pub fn acknowledge(&self, alert_id: &str) -> bool {
        match self.lock().iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// All alerts, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().clone()
    }

    /// Unacknowledged alerts, most severe first.
    pub fn active(&self) -> Vec<Alert> {
        let mut active: Vec<Alert> = self
            .lock()
            .iter()
            .filter(|a| !a.acknowledged)
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        active
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// One notification covering every alert passed in.
pub fn digest(alerts: &[&Alert]) -> Notification {
    let mut body = String::new();
    for alert in alerts {
        body.push_str(&format!("[{}] {}\n", alert.severity, alert.title));
        body.push_str(&format!("Type: {}\n", alert.alert_type));
        body.push_str(&format!("Raised: {}\n", alert.created_at.to_rfc3339()));
        body.push_str(&format!("{}\n", alert.description));
        if !alert.suggested_actions.is_empty() {
            body.push_str("Suggested actions:\n");
            for action in &alert.suggested_actions {
                body.push_str(&format!("  - {action}\n"));
            }
        }
        body.push('\n');
    }
    Notification::new(
        format!("[upkeep] {} critical alert(s)", alerts.len()),
        body.trim_end().to_string(),
    )
}
