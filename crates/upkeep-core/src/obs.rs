//! Structured lifecycle events for pipelines, tasks, health checks and alerts.
//!
//! Every emission carries a stable `event` field so log pipelines can filter
//! on it regardless of the message text.

use tracing::{info, warn};

use crate::domain::{Alert, JobStatus, MaintenanceStatus};

/// Span tagging every event of one pipeline job.
///
/// ```ignore
/// run_job(id).instrument(job_span("job-1f2e")).await
/// ```
pub fn job_span(job_id: &str) -> tracing::Span {
    tracing::info_span!("upkeep.job", job_id = %job_id)
}

/// Span tagging every event of one maintenance task execution.
pub fn task_span(task_id: &str) -> tracing::Span {
    tracing::info_span!("upkeep.task", task_id = %task_id)
}

pub fn emit_pipeline_started(job_id: &str, trigger: &str, waves: usize) {
    info!(event = "pipeline.started", job_id = %job_id, trigger = %trigger, waves = waves);
}

pub fn emit_wave_completed(job_id: &str, wave: usize, suites: usize, failed: usize) {
    info!(
        event = "pipeline.wave_completed",
        job_id = %job_id,
        wave = wave,
        suites = suites,
        failed = failed,
    );
}

pub fn emit_pipeline_finished(job_id: &str, status: JobStatus, duration_ms: u64) {
    info!(
        event = "pipeline.finished",
        job_id = %job_id,
        status = %status,
        duration_ms = duration_ms,
    );
}

pub fn emit_task_executed(task_id: &str, success: bool, duration_ms: u64) {
    if success {
        info!(event = "task.executed", task_id = %task_id, success = success, duration_ms = duration_ms);
    } else {
        warn!(event = "task.executed", task_id = %task_id, success = success, duration_ms = duration_ms);
    }
}

pub fn emit_health_computed(status: &MaintenanceStatus) {
    info!(
        event = "health.computed",
        overall = %status.overall,
        score = status.overall_score,
        maintenance = status.maintenance.score,
        ci = status.ci.score,
        evolution = status.evolution.score,
    );
}

pub fn emit_alert_raised(alert: &Alert) {
    warn!(
        event = "alert.raised",
        alert_id = %alert.id,
        alert_type = %alert.alert_type,
        severity = %alert.severity,
        key = %alert.key,
    );
}

pub fn emit_notification_failed(channel: &str, error: &dyn std::fmt::Display) {
    warn!(event = "notification.failed", channel = %channel, error = %error);
}
