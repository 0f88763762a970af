//! Markdown rendering of the periodic maintenance report.

use chrono::{DateTime, Utc};

use crate::domain::{
    Alert, CiJob, DomainHealth, EvolutionMilestone, MaintenanceStatus, MaintenanceTask,
    TechnologyEntry,
};

/// Everything a report is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct ReportInputs<'a> {
    pub status: &'a MaintenanceStatus,
    pub active_alerts: &'a [Alert],
    pub tasks: &'a [MaintenanceTask],
    /// Newest first.
    pub recent_jobs: &'a [CiJob],
    pub milestones: &'a [EvolutionMilestone],
    pub technologies: &'a [TechnologyEntry],
    pub minors_per_major: u64,
}

fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn domain_line(out: &mut String, health: &DomainHealth) {
    out.push_str(&format!(
        "- score: {:.1}\n- active: {}\n- issues: {}\n\n",
        health.score, health.active_count, health.issue_count
    ));
}

/// Render the report: overall status, active alerts, then the maintenance,
/// CI and evolution sections.
pub fn render_report_md(inputs: &ReportInputs<'_>) -> String {
    let status = inputs.status;
    let mut out = String::new();

    out.push_str("# Maintenance Report\n\n");
    out.push_str(&format!(
        "Generated: {}\n\n",
        fmt_time(Some(status.computed_at))
    ));
    out.push_str(&format!(
        "**Overall: {} ({:.1}/100)**\n\n",
        status.overall.to_string().to_uppercase(),
        status.overall_score
    ));

    out.push_str("## Active Alerts\n");
    if inputs.active_alerts.is_empty() {
        out.push_str("No active alerts.\n\n");
    } else {
        for alert in inputs.active_alerts {
            out.push_str(&format!(
                "- [{}] {} ({}): {}\n",
                alert.severity, alert.title, alert.alert_type, alert.description
            ));
            for action in &alert.suggested_actions {
                out.push_str(&format!("  - {action}\n"));
            }
        }
        out.push('\n');
    }

    out.push_str("## Maintenance\n");
    domain_line(&mut out, &status.maintenance);
    if !inputs.tasks.is_empty() {
        out.push_str("| Task | Priority | Status | Last run | Next run |\n");
        out.push_str("|---|---|---|---|---|\n");
        for task in inputs.tasks {
            out.push_str(&format!(
                "| {} | {:?} | {:?} | {} | {} |\n",
                task.name,
                task.priority,
                task.status,
                fmt_time(task.last_run),
                fmt_time(task.next_run)
            ));
        }
        out.push('\n');
    }

    out.push_str("## CI\n");
    domain_line(&mut out, &status.ci);
    match status.signals.ci_success_rate {
        Some(rate) => out.push_str(&format!(
            "Success rate: {:.1}% over the last {} job(s)\n\n",
            rate, status.signals.ci_window
        )),
        None => out.push_str("No pipeline runs recorded.\n\n"),
    }
    for job in inputs.recent_jobs {
        out.push_str(&format!(
            "- `{}` {} ({}, {} passed, {} failed)\n",
            job.id,
            job.status,
            job.trigger,
            job.passed_count(),
            job.failed_count()
        ));
    }
    if !inputs.recent_jobs.is_empty() {
        out.push('\n');
    }

    out.push_str("## Evolution\n");
    domain_line(&mut out, &status.evolution);
    if !inputs.milestones.is_empty() {
        out.push_str("### Milestones\n");
        for m in inputs.milestones {
            out.push_str(&format!(
                "- {} ({:?}, {}%) target {}\n",
                m.title,
                m.status,
                m.progress,
                fmt_time(Some(m.target_date))
            ));
        }
        out.push('\n');
    }
    if !inputs.technologies.is_empty() {
        out.push_str("### Technologies\n");
        for t in inputs.technologies {
            let lag = t
                .version_lag(inputs.minors_per_major)
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            out.push_str(&format!(
                "- {} {} -> {} (lag: {}, review {})\n",
                t.name,
                t.current_version,
                t.target_version,
                lag,
                fmt_time(Some(t.review_date))
            ));
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AlertSeverity, AlertType, HealthBucket, HealthSignals, JobStatus, Trigger,
    };

    fn status() -> MaintenanceStatus {
        let domain = DomainHealth {
            score: 90.0,
            active_count: 1,
            issue_count: 0,
        };
        MaintenanceStatus {
            overall: HealthBucket::Healthy,
            overall_score: 90.0,
            maintenance: domain,
            ci: domain,
            evolution: domain,
            signals: HealthSignals {
                ci_success_rate: Some(90.0),
                ci_window: 10,
                ..HealthSignals::default()
            },
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_report_sections_in_order() {
        let status = status();
        let mut job = CiJob::new("job-1", Trigger::Push);
        job.status = JobStatus::Passed;
        let jobs = vec![job];
        let md = render_report_md(&ReportInputs {
            status: &status,
            active_alerts: &[],
            tasks: &[],
            recent_jobs: &jobs,
            milestones: &[],
            technologies: &[],
            minors_per_major: 10,
        });

        assert!(md.starts_with("# Maintenance Report"));
        assert!(md.contains("**Overall: HEALTHY (90.0/100)**"));
        assert!(md.contains("No active alerts."));
        assert!(md.contains("Success rate: 90.0% over the last 10 job(s)"));
        assert!(md.contains("`job-1` passed"));
        let alerts = md.find("## Active Alerts").unwrap();
        let maintenance = md.find("## Maintenance").unwrap();
        let ci = md.find("## CI").unwrap();
        let evolution = md.find("## Evolution").unwrap();
        assert!(alerts < maintenance && maintenance < ci && ci < evolution);
    }

    #[test]
    fn test_report_lists_alert_actions() {
        let status = status();
        let alerts = vec![Alert {
            id: "alert-1".to_string(),
            alert_type: AlertType::Maintenance,
            severity: AlertSeverity::Warning,
            title: "1 maintenance task(s) overdue".to_string(),
            description: "One task is overdue.".to_string(),
            acknowledged: false,
            action_required: true,
            suggested_actions: vec!["Run the overdue tasks manually".to_string()],
            created_at: Utc::now(),
            key: "maintenance.overdue_tasks".to_string(),
        }];
        let md = render_report_md(&ReportInputs {
            status: &status,
            active_alerts: &alerts,
            tasks: &[],
            recent_jobs: &[],
            milestones: &[],
            technologies: &[],
            minors_per_major: 10,
        });
        assert!(md.contains("- [warning] 1 maintenance task(s) overdue (maintenance)"));
        assert!(md.contains("  - Run the overdue tasks manually"));
    }
}
