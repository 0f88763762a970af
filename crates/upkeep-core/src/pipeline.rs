//! Wave-ordered CI pipeline execution.
//!
//! A job resolves the enabled suites into waves, runs every suite of a wave
//! concurrently, and only starts the next wave once the whole wave has
//! finished. A failing critical suite stops the job after its wave. Executor
//! errors (and panics) become failed [`TestResult`]s; they never abort the run.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tracing::{info, warn, Instrument};

use crate::clock::Clock;
use crate::config::OrchestratorConfig;
use crate::domain::{
    Artifact, ArtifactKind, CiJob, Coverage, JobStatus, SuiteType, TestOutcome, TestResult,
    TestStatus, TestSuite, Trigger,
};
use crate::error::{UpkeepError, UpkeepResult};
use crate::metrics::Metrics;
use crate::notify::{Notification, NotificationDispatcher};
use crate::obs::{emit_pipeline_finished, emit_pipeline_started, emit_wave_completed, job_span};
use crate::resolver::{index_suites, resolve_waves};

/// What a suite executor reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteOutcome {
    pub success: bool,
    pub tests: Vec<TestOutcome>,
    pub coverage: Option<Coverage>,
    /// 0-100 score reported by performance suites.
    pub performance_score: Option<f64>,
}

impl SuiteOutcome {
    pub fn passed() -> Self {
        Self {
            success: true,
            tests: Vec::new(),
            coverage: None,
            performance_score: None,
        }
    }

    pub fn failed(tests: Vec<TestOutcome>) -> Self {
        Self {
            success: false,
            tests,
            coverage: None,
            performance_score: None,
        }
    }
}

/// Runs the checks of one suite. Timeouts are the executor's concern.
#[async_trait]
pub trait SuiteExecutor: Send + Sync {
    async fn execute(&self, suite: &TestSuite) -> UpkeepResult<SuiteOutcome>;
}

/// Executor strategy per [`SuiteType`].
#[derive(Clone, Default)]
pub struct SuiteExecutors {
    by_type: HashMap<SuiteType, Arc<dyn SuiteExecutor>>,
}

impl SuiteExecutors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same executor for every suite type.
    pub fn uniform(executor: Arc<dyn SuiteExecutor>) -> Self {
        let mut executors = Self::new();
        for suite_type in SuiteType::ALL {
            executors = executors.with(suite_type, Arc::clone(&executor));
        }
        executors
    }

    pub fn with(mut self, suite_type: SuiteType, executor: Arc<dyn SuiteExecutor>) -> Self {
        self.by_type.insert(suite_type, executor);
        self
    }

    pub fn get(&self, suite_type: SuiteType) -> Option<Arc<dyn SuiteExecutor>> {
        self.by_type.get(&suite_type).cloned()
    }

    pub fn supported(&self) -> Vec<SuiteType> {
        let mut types: Vec<SuiteType> = self.by_type.keys().copied().collect();
        types.sort();
        types
    }
}

struct ActiveJob {
    job: CiJob,
    cancel: Arc<AtomicBool>,
}

struct JobStoreInner {
    active: HashMap<String, ActiveJob>,
    history: VecDeque<CiJob>,
    limit: usize,
}

/// Active jobs plus a bounded history of finished ones.
///
/// Written only by the [`PipelineExecutor`]; read by the health scorer.
pub struct JobStore {
    inner: Mutex<JobStoreInner>,
}

impl JobStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Mutex::new(JobStoreInner {
                active: HashMap::new(),
                history: VecDeque::new(),
                limit: history_limit.max(1),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JobStoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self, job: &CiJob) -> Arc<AtomicBool> {
        let cancel = Arc::new(AtomicBool::new(false));
        self.lock().active.insert(
            job.id.clone(),
            ActiveJob {
                job: job.clone(),
                cancel: Arc::clone(&cancel),
            },
        );
        cancel
    }

    fn publish(&self, job: &CiJob) {
        if let Some(active) = self.lock().active.get_mut(&job.id) {
            active.job = job.clone();
        }
    }

    fn finish(&self, job: CiJob) {
        let mut inner = self.lock();
        inner.active.remove(&job.id);
        inner.history.push_back(job);
        while inner.history.len() > inner.limit {
            inner.history.pop_front();
        }
    }

    pub fn set_limit(&self, limit: usize) {
        let mut inner = self.lock();
        inner.limit = limit.max(1);
        while inner.history.len() > inner.limit {
            inner.history.pop_front();
        }
    }

    /// Request cancellation of a running job. Returns whether it was active.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.lock().active.get(job_id) {
            Some(active) => {
                active.cancel.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let inner = self.lock();
        for active in inner.active.values() {
            active.cancel.store(true, Ordering::SeqCst);
        }
        inner.active.len()
    }

    pub fn active(&self) -> Vec<CiJob> {
        let mut jobs: Vec<CiJob> = self.lock().active.values().map(|a| a.job.clone()).collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        jobs
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Finished jobs, oldest first.
    pub fn history(&self) -> Vec<CiJob> {
        self.lock().history.iter().cloned().collect()
    }

    /// Up to `n` most recent finished jobs, newest first.
    pub fn recent(&self, n: usize) -> Vec<CiJob> {
        self.lock().history.iter().rev().take(n).cloned().collect()
    }

    pub fn job(&self, job_id: &str) -> Option<CiJob> {
        let inner = self.lock();
        inner
            .active
            .get(job_id)
            .map(|a| a.job.clone())
            .or_else(|| inner.history.iter().find(|j| j.id == job_id).cloned())
    }

    /// Drop history. Active jobs keep running and are recorded when they finish.
    pub fn clear(&self) {
        self.lock().history.clear();
    }
}

/// Tunables taken from the orchestrator configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Upper bound on concurrently running suites within a wave.
    pub parallel_jobs: usize,
    /// Ceiling applied to every suite's own timeout.
    pub test_timeout_ms: u64,
    /// Minimum score a performance suite must report to pass.
    pub performance_threshold: u8,
}

impl PipelineSettings {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            parallel_jobs: config.parallel_jobs,
            test_timeout_ms: config.test_timeout_ms,
            performance_threshold: config.performance_threshold,
        }
    }
}

/// Runs CI jobs over the registered suites.
pub struct PipelineExecutor {
    suites: RwLock<Vec<TestSuite>>,
    executors: SuiteExecutors,
    store: Arc<JobStore>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    settings: RwLock<PipelineSettings>,
}

impl PipelineExecutor {
    pub fn new(
        suites: Vec<TestSuite>,
        executors: SuiteExecutors,
        store: Arc<JobStore>,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            suites: RwLock::new(suites),
            executors,
            store,
            dispatcher,
            clock,
            metrics,
            settings: RwLock::new(settings),
        }
    }

    pub fn configure(&self, settings: PipelineSettings) {
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn suites(&self) -> Vec<TestSuite> {
        self.suites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_suites(&self, suites: Vec<TestSuite>) {
        *self.suites.write().unwrap_or_else(|e| e.into_inner()) = suites;
    }

    pub fn cancel(&self, job_id: &str) -> bool {
        self.store.cancel(job_id)
    }

    /// Execute a full pipeline run.
    ///
    /// Every started job ends up in history and a summary is always dispatched.
    /// An unresolvable dependency graph is returned as an error before any job
    /// is started, leaving history and the active set untouched.
    pub async fn run(&self, trigger: Trigger) -> UpkeepResult<CiJob> {
        let job_id = format!(
            "job-{}",
            uuid::Uuid::new_v4()
                .to_string()
                .split('-')
                .next()
                .unwrap_or("x")
        );
        let span = job_span(&job_id);
        self.run_job(job_id, trigger).instrument(span).await
    }

    async fn run_job(&self, job_id: String, trigger: Trigger) -> UpkeepResult<CiJob> {
        let settings = *self.settings.read().unwrap_or_else(|e| e.into_inner());
        let suites = self.suites();

        // An unresolvable graph rejects the request; no job is recorded.
        let plan = resolve_waves(&suites).map_err(|e| {
            warn!(error = %e, "dependency resolution failed");
            e
        })?;
        self.metrics.inc_pipelines();

        let mut job = CiJob::new(job_id.clone(), trigger);
        job.status = JobStatus::Running;
        job.started_at = Some(self.clock.now());
        job.log(format!("Pipeline started (trigger: {trigger})"));
        job.plan_digest = Some(plan.digest());
        let cancel = self.store.register(&job);
        emit_pipeline_started(&job_id, &trigger.to_string(), plan.waves.len());

        let index = index_suites(&suites);
        let mut cancelled = false;

        for (wave_idx, wave) in plan.waves.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                cancelled = true;
                break;
            }

            job.log(format!("Wave {}: {}", wave_idx + 1, wave.join(", ")));
            let wave_suites: Vec<TestSuite> = wave
                .iter()
                .filter_map(|id| index.get(id.as_str()).map(|s| (*s).clone()))
                .collect();

            // Owned suites keep the run future `Send` so it can be spawned.
            let mut results: Vec<TestResult> = stream::iter(wave_suites.into_iter().map(
                |suite| async move { self.execute_suite(&suite, settings).await },
            ))
            .buffer_unordered(settings.parallel_jobs.max(1))
            .collect()
            .await;
            results.sort_by(|a, b| a.suite_id.cmp(&b.suite_id));
            self.metrics.add_suites(results.len() as u64);

            let failed: Vec<&TestResult> = results.iter().filter(|r| r.failed()).collect();
            emit_wave_completed(&job_id, wave_idx + 1, results.len(), failed.len());

            let critical_failures: Vec<String> = failed
                .iter()
                .filter(|r| {
                    index
                        .get(r.suite_id.as_str())
                        .map(|s| s.is_critical())
                        .unwrap_or(false)
                })
                .map(|r| r.suite_id.clone())
                .collect();

            for result in &results {
                job.log(format!(
                    "{}: {:?} in {} ms ({} attempt(s))",
                    result.suite_id, result.status, result.duration_ms, result.attempts
                ));
            }
            job.results.extend(results);
            self.store.publish(&job);

            if !critical_failures.is_empty() {
                let skipped: Vec<&str> = plan.waves[wave_idx + 1..]
                    .iter()
                    .flatten()
                    .map(String::as_str)
                    .collect();
                warn!(
                    critical = ?critical_failures,
                    skipped = ?skipped,
                    "critical suite failed; stopping pipeline"
                );
                job.log(format!(
                    "Critical suite(s) failed: {}. Skipping: {}",
                    critical_failures.join(", "),
                    if skipped.is_empty() {
                        "nothing".to_string()
                    } else {
                        skipped.join(", ")
                    }
                ));
                break;
            }
        }

        // A request that arrives after the last wave has nothing left to stop.
        if cancelled {
            job.status = JobStatus::Cancelled;
            job.log("Pipeline cancelled");
        } else if job.failed_count() > 0 {
            job.status = JobStatus::Failed;
        } else {
            job.status = JobStatus::Passed;
        }

        let types: HashMap<String, SuiteType> = suites
            .iter()
            .map(|s| (s.id.clone(), s.suite_type))
            .collect();
        Ok(self.finalize(job, &types).await)
    }

    /// Stamp end time, collect artifacts, move to history and notify.
    async fn finalize(&self, mut job: CiJob, types: &HashMap<String, SuiteType>) -> CiJob {
        job.ended_at = Some(self.clock.now());
        let duration_ms = job.duration_ms().unwrap_or(0);
        job.log(format!("Pipeline {} in {} ms", job.status, duration_ms));
        job.artifacts = collect_artifacts(&job, types);

        self.store.finish(job.clone());
        emit_pipeline_finished(&job.id, job.status, duration_ms);

        let results = self.dispatcher.dispatch(&summary_notification(&job)).await;
        for r in results.iter().filter(|r| !r.success) {
            self.metrics.inc_notification_failures();
            job.log(format!(
                "Notification via {} failed: {}",
                r.channel,
                r.error.as_deref().unwrap_or("unknown error")
            ));
        }
        job
    }

    /// Run one suite with retries; never fails.
    async fn execute_suite(&self, suite: &TestSuite, settings: PipelineSettings) -> TestResult {
        let mut suite = suite.clone();
        if settings.test_timeout_ms > 0 {
            suite.timeout_ms = suite.timeout_ms.min(settings.test_timeout_ms);
        }
        let start = tokio::time::Instant::now();
        let executor = self.executors.get(suite.suite_type);
        let max_attempts = suite.retries.saturating_add(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let outcome = match &executor {
                Some(executor) => AssertUnwindSafe(executor.execute(&suite))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(UpkeepError::SuiteExecution {
                            suite: suite.id.clone(),
                            reason: panic_message(panic.as_ref()),
                        })
                    }),
                None => Err(UpkeepError::SuiteExecution {
                    suite: suite.id.clone(),
                    reason: format!(
                        "no executor registered for suite type '{}'",
                        suite.suite_type.name()
                    ),
                }),
            };
            let outcome = outcome.map(|o| enforce_performance_budget(o, settings.performance_threshold));

            let finished = outcome.as_ref().map(|o| o.success).unwrap_or(false)
                || attempts >= max_attempts;
            if !finished {
                info!(suite = %suite.id, attempt = attempts, "suite failed; retrying");
                continue;
            }

            let duration_ms = start.elapsed().as_millis() as u64;
            return match outcome {
                Ok(o) => TestResult {
                    suite_id: suite.id.clone(),
                    status: if o.success {
                        TestStatus::Passed
                    } else {
                        TestStatus::Failed
                    },
                    duration_ms,
                    tests: o.tests,
                    coverage: o.coverage,
                    attempts,
                },
                Err(e) => {
                    warn!(suite = %suite.id, error = %e, "suite execution error");
                    TestResult {
                        suite_id: suite.id.clone(),
                        status: TestStatus::Failed,
                        duration_ms,
                        tests: vec![TestOutcome::failed("suite execution", e.to_string())],
                        coverage: None,
                        attempts,
                    }
                }
            };
        }
    }
}

/// Fail an outcome whose performance score is under `threshold`.
fn enforce_performance_budget(mut outcome: SuiteOutcome, threshold: u8) -> SuiteOutcome {
    if let Some(score) = outcome.performance_score {
        if score < f64::from(threshold) {
            outcome.success = false;
            outcome.tests.push(TestOutcome::failed(
                "performance budget",
                format!("score {score:.0} is below threshold {threshold}"),
            ));
        }
    }
    outcome
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("executor panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("executor panicked: {s}")
    } else {
        "executor panicked".to_string()
    }
}

/// Artifacts a job produced, addressed under `artifacts/<job-id>/`.
fn collect_artifacts(job: &CiJob, types: &HashMap<String, SuiteType>) -> Vec<Artifact> {
    let root = format!("artifacts/{}", job.id);
    let mut artifacts = Vec::new();

    for result in &job.results {
        if result.coverage.is_some() {
            artifacts.push(Artifact {
                name: format!("{} coverage", result.suite_id),
                kind: ArtifactKind::CoverageReport,
                path: format!("{root}/coverage/{}.json", result.suite_id),
            });
        }
        match types.get(&result.suite_id) {
            Some(SuiteType::Visual) => artifacts.push(Artifact {
                name: format!("{} screenshots", result.suite_id),
                kind: ArtifactKind::Screenshots,
                path: format!("{root}/screenshots/{}/", result.suite_id),
            }),
            Some(SuiteType::Performance) => artifacts.push(Artifact {
                name: format!("{} bundle report", result.suite_id),
                kind: ArtifactKind::BundleReport,
                path: format!("{root}/bundle/{}.json", result.suite_id),
            }),
            _ => {}
        }
        artifacts.push(Artifact {
            name: format!("{} report", result.suite_id),
            kind: ArtifactKind::TestReport,
            path: format!("{root}/reports/{}.json", result.suite_id),
        });
    }

    artifacts.push(Artifact {
        name: "logs".to_string(),
        kind: ArtifactKind::LogBundle,
        path: format!("{root}/logs.txt"),
    });
    artifacts
}

/// Summary sent when a job finishes.
pub fn summary_notification(job: &CiJob) -> Notification {
    let failed = job.failed_suites();
    let mut body = String::new();
    body.push_str(&format!("Job: {}\n", job.id));
    body.push_str(&format!("Status: {}\n", job.status.to_string().to_uppercase()));
    body.push_str(&format!("Trigger: {}\n", job.trigger));
    body.push_str(&format!("Duration: {} ms\n", job.duration_ms().unwrap_or(0)));
    body.push_str(&format!(
        "Suites: {} passed, {} failed\n",
        job.passed_count(),
        job.failed_count()
    ));
    if !failed.is_empty() {
        body.push_str(&format!("Failed suites: {}\n", failed.join(", ")));
    }
    Notification::new(format!("[upkeep] pipeline {}: {}", job.status, job.id), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn passed(suite: &str) -> TestResult {
        TestResult {
            suite_id: suite.to_string(),
            status: TestStatus::Passed,
            duration_ms: 5,
            tests: Vec::new(),
            coverage: None,
            attempts: 1,
        }
    }

    #[test]
    fn test_performance_budget() {
        let mut outcome = SuiteOutcome::passed();
        outcome.performance_score = Some(72.0);
        let checked = enforce_performance_budget(outcome.clone(), 80);
        assert!(!checked.success);
        assert!(checked.tests[0].message.as_deref().unwrap_or("").contains("below threshold 80"));

        assert!(enforce_performance_budget(outcome, 70).success);
        assert!(enforce_performance_budget(SuiteOutcome::passed(), 100).success);
    }

    #[test]
    fn test_job_store_evicts_oldest() {
        let store = JobStore::new(2);
        for i in 0..3 {
            let job = CiJob::new(format!("job-{i}"), Trigger::Push);
            store.register(&job);
            store.finish(job);
        }
        let ids: Vec<String> = store.history().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["job-1".to_string(), "job-2".to_string()]);
        assert_eq!(store.active_count(), 0);
        assert_eq!(store.recent(1)[0].id, "job-2");
    }

    #[test]
    fn test_cancel_only_affects_active_jobs() {
        let store = JobStore::new(5);
        let job = CiJob::new("job-a", Trigger::Manual);
        let flag = store.register(&job);
        assert!(store.cancel("job-a"));
        assert!(flag.load(Ordering::SeqCst));
        store.finish(job);
        assert!(!store.cancel("job-a"));
        assert!(!store.cancel("job-unknown"));
    }

    #[test]
    fn test_artifacts_follow_suite_types() {
        let mut job = CiJob::new("job-x", Trigger::Push);
        let mut unit = passed("unit-tests");
        unit.coverage = Some(Coverage::default());
        job.results.push(unit);
        job.results.push(passed("visual-tests"));

        let types = HashMap::from([
            ("unit-tests".to_string(), SuiteType::Unit),
            ("visual-tests".to_string(), SuiteType::Visual),
        ]);
        let artifacts = collect_artifacts(&job, &types);
        let kinds: Vec<ArtifactKind> = artifacts.iter().map(|a| a.kind).collect();

        assert!(kinds.contains(&ArtifactKind::CoverageReport));
        assert!(kinds.contains(&ArtifactKind::Screenshots));
        assert_eq!(
            kinds.iter().filter(|k| **k == ArtifactKind::TestReport).count(),
            2
        );
        assert_eq!(artifacts.last().map(|a| a.kind), Some(ArtifactKind::LogBundle));
    }

    #[test]
    fn test_summary_lists_failed_suites() {
        let mut job = CiJob::new("job-s", Trigger::PullRequest);
        job.status = JobStatus::Failed;
        job.started_at = Some(Utc::now());
        job.ended_at = job.started_at;
        job.results.push(passed("lint"));
        let mut failing = passed("unit-tests");
        failing.status = TestStatus::Failed;
        job.results.push(failing);

        let n = summary_notification(&job);
        assert!(n.subject.contains("failed"));
        assert!(n.body.contains("Status: FAILED"));
        assert!(n.body.contains("1 passed, 1 failed"));
        assert!(n.body.contains("Failed suites: unit-tests"));
    }
}
