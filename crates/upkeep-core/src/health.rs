//! Health scoring across maintenance, CI and roadmap evolution.
//!
//! [`compute_status`] is a pure function over snapshots; [`HealthScorer`]
//! gathers the snapshots from the live components. Every constant comes from
//! [`ScoringConfig`].

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::config::ScoringConfig;
use crate::domain::{
    CiJob, DomainHealth, EvolutionMilestone, HealthBucket, HealthSignals, JobStatus,
    MaintenanceStatus, MaintenanceTask, MilestoneStatus, TechnologyEntry,
};
use crate::pipeline::JobStore;
use crate::scheduler::TaskRegistry;

/// Milestones and technology entries tracked for the evolution score.
#[derive(Debug, Default)]
pub struct Roadmap {
    milestones: RwLock<Vec<EvolutionMilestone>>,
    technologies: RwLock<Vec<TechnologyEntry>>,
}

impl Roadmap {
    pub fn new(milestones: Vec<EvolutionMilestone>, technologies: Vec<TechnologyEntry>) -> Self {
        Self {
            milestones: RwLock::new(milestones),
            technologies: RwLock::new(technologies),
        }
    }

    pub fn milestones(&self) -> Vec<EvolutionMilestone> {
        self.milestones
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn technologies(&self) -> Vec<TechnologyEntry> {
        self.technologies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Insert or replace a milestone by id.
    pub fn upsert_milestone(&self, milestone: EvolutionMilestone) {
        let mut milestones = self.milestones.write().unwrap_or_else(|e| e.into_inner());
        match milestones.iter_mut().find(|m| m.id == milestone.id) {
            Some(existing) => *existing = milestone,
            None => milestones.push(milestone),
        }
    }

    /// Insert or replace a technology entry by name.
    pub fn upsert_technology(&self, entry: TechnologyEntry) {
        let mut technologies = self.technologies.write().unwrap_or_else(|e| e.into_inner());
        match technologies.iter_mut().find(|t| t.name == entry.name) {
            Some(existing) => *existing = entry,
            None => technologies.push(entry),
        }
    }

    /// Set a milestone's progress, clamped to 0-100.
    ///
    /// Reaching 100 completes the milestone; any progress starts a planned
    /// one. Returns whether the milestone exists.
    pub fn update_progress(&self, milestone_id: &str, progress: i64) -> bool {
        let mut milestones = self.milestones.write().unwrap_or_else(|e| e.into_inner());
        let Some(milestone) = milestones.iter_mut().find(|m| m.id == milestone_id) else {
            return false;
        };
        milestone.progress = progress.clamp(0, 100) as u8;
        if milestone.progress == 100 {
            milestone.status = MilestoneStatus::Completed;
        } else if milestone.progress > 0 && milestone.status == MilestoneStatus::Planned {
            milestone.status = MilestoneStatus::InProgress;
        }
        true
    }

    pub fn set_status(&self, milestone_id: &str, status: MilestoneStatus) -> bool {
        let mut milestones = self.milestones.write().unwrap_or_else(|e| e.into_inner());
        match milestones.iter_mut().find(|m| m.id == milestone_id) {
            Some(milestone) => {
                milestone.status = status;
                true
            }
            None => false,
        }
    }
}

/// Snapshots the scorer works on.
#[derive(Debug, Clone, Copy)]
pub struct HealthInputs<'a> {
    pub tasks: &'a [MaintenanceTask],
    /// Most recent finished jobs, any order.
    pub recent_jobs: &'a [CiJob],
    pub active_jobs: usize,
    pub milestones: &'a [EvolutionMilestone],
    pub technologies: &'a [TechnologyEntry],
}

/// Derive a [`MaintenanceStatus`] from snapshots at `now`.
pub fn compute_status(
    config: &ScoringConfig,
    inputs: HealthInputs<'_>,
    now: DateTime<Utc>,
) -> MaintenanceStatus {
    let maintenance = maintenance_health(config, inputs.tasks, now);
    let (ci, ci_success_rate) = ci_health(config, inputs.recent_jobs, inputs.active_jobs);
    let evolution = evolution_health(config, &inputs, now);

    let overall_score = (config.maintenance_weight * maintenance.score
        + config.ci_weight * ci.score
        + config.evolution_weight * evolution.score)
        .clamp(0.0, 100.0);
    let overall = if overall_score < config.critical_below {
        HealthBucket::Critical
    } else if overall_score < config.warning_below {
        HealthBucket::Warning
    } else {
        HealthBucket::Healthy
    };

    let signals = HealthSignals {
        overdue_tasks: inputs.tasks.iter().filter(|t| t.is_overdue(now)).count(),
        failed_tasks: inputs.tasks.iter().filter(|t| last_failed(t)).count(),
        ci_success_rate,
        ci_window: inputs.recent_jobs.len().min(config.ci_window),
        active_jobs: inputs.active_jobs,
        delayed_milestones: inputs
            .milestones
            .iter()
            .filter(|m| is_delayed(m, now))
            .count(),
    };

    MaintenanceStatus {
        overall,
        overall_score,
        maintenance,
        ci,
        evolution,
        signals,
        computed_at: now,
    }
}

fn last_failed(task: &MaintenanceTask) -> bool {
    matches!(&task.last_result, Some(result) if !result.success)
}

/// Whole days overdue, rounded up.
fn days_overdue(task: &MaintenanceTask, now: DateTime<Utc>) -> f64 {
    let ms = task.overdue_by(now).num_milliseconds();
    (ms as f64 / Duration::days(1).num_milliseconds() as f64).ceil()
}

fn maintenance_health(
    config: &ScoringConfig,
    tasks: &[MaintenanceTask],
    now: DateTime<Utc>,
) -> DomainHealth {
    let mut score = 100.0;
    let mut issue_count = 0;

    for task in tasks {
        if task.is_overdue(now) {
            let penalty = (days_overdue(task, now) * config.overdue_penalty_per_day)
                .min(config.overdue_penalty_cap);
            score -= penalty;
            issue_count += 1;
        }
    }
    score = f64::clamp(score, 0.0, 100.0);

    for task in tasks {
        if last_failed(task) {
            score -= config.failed_task_penalty;
            issue_count += 1;
        } else if matches!(task.last_run, Some(last) if now - last <= Duration::hours(24))
            && task.last_result.is_some()
        {
            score += config.recent_completion_bonus;
        }
    }

    DomainHealth {
        score: f64::clamp(score, 0.0, 100.0),
        active_count: tasks.len(),
        issue_count,
    }
}

fn ci_health(
    config: &ScoringConfig,
    recent_jobs: &[CiJob],
    active_jobs: usize,
) -> (DomainHealth, Option<f64>) {
    let window: Vec<&CiJob> = recent_jobs.iter().take(config.ci_window).collect();
    let failed = window
        .iter()
        .filter(|j| j.status != JobStatus::Passed)
        .count();
    let success_rate = if window.is_empty() {
        None
    } else {
        let passed = window.len() - failed;
        Some(passed as f64 * 100.0 / window.len() as f64)
    };

    let mut score = success_rate.unwrap_or(100.0);
    if active_jobs > 0 {
        score -= config.active_job_penalty;
    }

    (
        DomainHealth {
            score: score.clamp(0.0, 100.0),
            active_count: active_jobs,
            issue_count: failed,
        },
        success_rate,
    )
}

fn is_delayed(milestone: &EvolutionMilestone, now: DateTime<Utc>) -> bool {
    match milestone.status {
        MilestoneStatus::Delayed => true,
        MilestoneStatus::Planned | MilestoneStatus::InProgress => milestone.target_date < now,
        MilestoneStatus::Completed | MilestoneStatus::Cancelled => false,
    }
}

fn on_track(config: &ScoringConfig, milestone: &EvolutionMilestone, now: DateTime<Utc>) -> bool {
    match milestone.status {
        MilestoneStatus::Completed => true,
        MilestoneStatus::Delayed | MilestoneStatus::Cancelled => false,
        MilestoneStatus::Planned => milestone.target_date >= now,
        MilestoneStatus::InProgress => {
            f64::from(milestone.progress) >= config.on_track_ratio * milestone.expected_progress(now)
        }
    }
}

fn technology_current(config: &ScoringConfig, entry: &TechnologyEntry, now: DateTime<Utc>) -> bool {
    if entry.review_date < now {
        return false;
    }
    matches!(
        entry.version_lag(config.minors_per_major),
        Some(lag) if lag <= config.max_minor_version_lag
    )
}

fn ratio(hits: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        hits as f64 * 100.0 / total as f64
    }
}

fn evolution_health(
    config: &ScoringConfig,
    inputs: &HealthInputs<'_>,
    now: DateTime<Utc>,
) -> DomainHealth {
    let tracked: Vec<&EvolutionMilestone> = inputs
        .milestones
        .iter()
        .filter(|m| m.status != MilestoneStatus::Cancelled)
        .collect();
    let on_track_count = tracked.iter().filter(|m| on_track(config, m, now)).count();
    let compliant = inputs.tasks.iter().filter(|t| !t.is_overdue(now)).count();
    let current = inputs
        .technologies
        .iter()
        .filter(|t| technology_current(config, t, now))
        .count();

    let score = config.milestone_weight * ratio(on_track_count, tracked.len())
        + config.compliance_weight * ratio(compliant, inputs.tasks.len())
        + config.technology_weight * ratio(current, inputs.technologies.len());

    DomainHealth {
        score: score.clamp(0.0, 100.0),
        active_count: tracked
            .iter()
            .filter(|m| m.status == MilestoneStatus::InProgress)
            .count(),
        issue_count: (tracked.len() - on_track_count) + (inputs.technologies.len() - current),
    }
}

/// Computes [`MaintenanceStatus`] from the live task registry, job store and
/// roadmap. Nothing is cached between calls.
pub struct HealthScorer {
    registry: Arc<TaskRegistry>,
    jobs: Arc<JobStore>,
    roadmap: Arc<Roadmap>,
    clock: Arc<dyn Clock>,
    scoring: RwLock<ScoringConfig>,
}

impl HealthScorer {
    pub fn new(
        registry: Arc<TaskRegistry>,
        jobs: Arc<JobStore>,
        roadmap: Arc<Roadmap>,
        clock: Arc<dyn Clock>,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            registry,
            jobs,
            roadmap,
            clock,
            scoring: RwLock::new(scoring),
        }
    }

    pub fn set_scoring(&self, scoring: ScoringConfig) {
        *self.scoring.write().unwrap_or_else(|e| e.into_inner()) = scoring;
    }

    pub fn scoring(&self) -> ScoringConfig {
        self.scoring
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn score(&self) -> MaintenanceStatus {
        let config = self.scoring();
        let tasks = self.registry.tasks();
        let recent_jobs = self.jobs.recent(config.ci_window);
        let milestones = self.roadmap.milestones();
        let technologies = self.roadmap.technologies();

        compute_status(
            &config,
            HealthInputs {
                tasks: &tasks,
                recent_jobs: &recent_jobs,
                active_jobs: self.jobs.active_count(),
                milestones: &milestones,
                technologies: &technologies,
            },
            self.clock.now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MaintenanceResult, TaskFrequency, TaskPriority, Trigger};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn task(id: &str) -> MaintenanceTask {
        MaintenanceTask::new(id, id, TaskFrequency::Daily, TaskPriority::Medium, "quality")
    }

    fn job(status: JobStatus) -> CiJob {
        let mut job = CiJob::new("job", Trigger::Push);
        job.status = status;
        job
    }

    fn status_for(tasks: &[MaintenanceTask], jobs: &[CiJob], active: usize) -> MaintenanceStatus {
        compute_status(
            &ScoringConfig::default(),
            HealthInputs {
                tasks,
                recent_jobs: jobs,
                active_jobs: active,
                milestones: &[],
                technologies: &[],
            },
            now(),
        )
    }

    #[test]
    fn test_empty_inputs_are_healthy() {
        let status = status_for(&[], &[], 0);
        assert_eq!(status.maintenance.score, 100.0);
        assert_eq!(status.ci.score, 100.0);
        assert_eq!(status.evolution.score, 100.0);
        assert_eq!(status.overall, HealthBucket::Healthy);
        assert_eq!(status.signals.ci_success_rate, None);
    }

    #[test]
    fn test_overdue_penalty_is_capped_per_task() {
        let mut t = task("deps");
        t.next_run = Some(now() - Duration::days(1000));
        let status = status_for(&[t], &[], 0);
        assert_eq!(status.maintenance.score, 70.0);
        assert_eq!(status.signals.overdue_tasks, 1);
    }

    #[test]
    fn test_partial_day_rounds_up() {
        let mut t = task("deps");
        t.next_run = Some(now() - Duration::hours(30));
        let status = status_for(&[t], &[], 0);
        assert_eq!(status.maintenance.score, 90.0);
    }

    #[test]
    fn test_maintenance_score_never_negative() {
        let tasks: Vec<MaintenanceTask> = (0..10)
            .map(|i| {
                let mut t = task(&format!("t{i}"));
                t.next_run = Some(now() - Duration::days(30));
                t.last_result = Some(MaintenanceResult::default());
                t
            })
            .collect();
        let status = status_for(&tasks, &[], 0);
        assert_eq!(status.maintenance.score, 0.0);
        assert_eq!(status.signals.failed_tasks, 10);
    }

    #[test]
    fn test_recent_completion_bonus_is_clamped() {
        let mut t = task("deps");
        t.last_run = Some(now() - Duration::hours(2));
        t.last_result = Some(MaintenanceResult::ok());
        let status = status_for(&[t], &[], 0);
        assert_eq!(status.maintenance.score, 100.0);
    }

    #[test]
    fn test_ci_success_rate_and_active_penalty() {
        let mut jobs: Vec<CiJob> = (0..7).map(|_| job(JobStatus::Passed)).collect();
        jobs.extend((0..3).map(|_| job(JobStatus::Failed)));

        let idle = status_for(&[], &jobs, 0);
        assert_eq!(idle.ci.score, 70.0);
        assert_eq!(idle.signals.ci_success_rate, Some(70.0));

        let busy = status_for(&[], &jobs, 1);
        assert_eq!(busy.ci.score, 60.0);
    }

    #[test]
    fn test_overall_bucket_thresholds() {
        let jobs: Vec<CiJob> = (0..5).map(|_| job(JobStatus::Failed)).collect();
        let status = status_for(&[], &jobs, 0);
        // 0.4 * 100 + 0.3 * 0 + 0.3 * 100
        assert!((status.overall_score - 70.0).abs() < 1e-9);
        assert_eq!(status.overall, HealthBucket::Warning);
    }

    #[test]
    fn test_milestone_tracking_rules() {
        let milestone = |id: &str, status: MilestoneStatus, progress: u8| EvolutionMilestone {
            id: id.to_string(),
            title: id.to_string(),
            start_date: now() - Duration::days(50),
            target_date: now() + Duration::days(50),
            status,
            progress,
            dependencies: Vec::new(),
        };
        let config = ScoringConfig::default();

        assert!(on_track(&config, &milestone("a", MilestoneStatus::Completed, 10), now()));
        assert!(!on_track(&config, &milestone("b", MilestoneStatus::Delayed, 90), now()));
        // expected 50%, threshold 40%
        assert!(on_track(&config, &milestone("c", MilestoneStatus::InProgress, 40), now()));
        assert!(!on_track(&config, &milestone("d", MilestoneStatus::InProgress, 39), now()));
        assert!(on_track(&config, &milestone("e", MilestoneStatus::Planned, 0), now()));
    }

    #[test]
    fn test_cancelled_milestones_are_excluded() {
        let milestones = vec![EvolutionMilestone {
            id: "m".to_string(),
            title: "Dropped".to_string(),
            start_date: now() - Duration::days(10),
            target_date: now() - Duration::days(1),
            status: MilestoneStatus::Cancelled,
            progress: 0,
            dependencies: Vec::new(),
        }];
        let status = compute_status(
            &ScoringConfig::default(),
            HealthInputs {
                tasks: &[],
                recent_jobs: &[],
                active_jobs: 0,
                milestones: &milestones,
                technologies: &[],
            },
            now(),
        );
        assert_eq!(status.evolution.score, 100.0);
        assert_eq!(status.signals.delayed_milestones, 0);
    }

    #[test]
    fn test_technology_currency() {
        let config = ScoringConfig::default();
        let entry = |current: &str, target: &str, review_in_days: i64| TechnologyEntry {
            name: "tokio".to_string(),
            current_version: current.to_string(),
            target_version: target.to_string(),
            review_date: now() + Duration::days(review_in_days),
        };

        assert!(technology_current(&config, &entry("1.36.0", "1.38.0", 30), now()));
        assert!(!technology_current(&config, &entry("1.35.0", "1.38.0", 30), now()));
        assert!(!technology_current(&config, &entry("1.38.0", "2.0.0", 30), now()));
        assert!(!technology_current(&config, &entry("1.38.0", "1.38.0", -1), now()));
        assert!(!technology_current(&config, &entry("latest", "1.38.0", 30), now()));
    }

    #[test]
    fn test_roadmap_progress_is_clamped() {
        let roadmap = Roadmap::new(
            vec![EvolutionMilestone {
                id: "m1".to_string(),
                title: "Async runtime".to_string(),
                start_date: now(),
                target_date: now() + Duration::days(30),
                status: MilestoneStatus::Planned,
                progress: 0,
                dependencies: Vec::new(),
            }],
            Vec::new(),
        );

        assert!(roadmap.update_progress("m1", -5));
        assert_eq!(roadmap.milestones()[0].progress, 0);
        assert_eq!(roadmap.milestones()[0].status, MilestoneStatus::Planned);

        assert!(roadmap.update_progress("m1", 40));
        assert_eq!(roadmap.milestones()[0].status, MilestoneStatus::InProgress);

        assert!(roadmap.update_progress("m1", 250));
        assert_eq!(roadmap.milestones()[0].progress, 100);
        assert_eq!(roadmap.milestones()[0].status, MilestoneStatus::Completed);

        assert!(!roadmap.update_progress("missing", 10));
    }
}
