//! Composition root wiring the scheduler, pipeline executor, health scorer,
//! alert manager and notification dispatch into one control plane.
//!
//! Every orchestrator owns its own state; nothing is shared through statics,
//! so several instances can live side by side in one process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::actions::{HealthCheckAction, SecurityScanAction, VulnerabilityScanner};
use crate::alerts::AlertManager;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigPatch, OrchestratorConfig};
use crate::domain::{
    Alert, CiJob, EvolutionMilestone, JobStatus, MaintenanceResult, MaintenanceStatus,
    MaintenanceTask, TechnologyEntry, TestSuite, Trigger,
};
use crate::error::{UpkeepError, UpkeepResult};
use crate::health::{HealthScorer, Roadmap};
use crate::metrics::Metrics;
use crate::notify::{Notification, NotificationDispatcher, Notifier};
use crate::obs::emit_health_computed;
use crate::pipeline::{JobStore, PipelineExecutor, PipelineSettings, SuiteExecutors};
use crate::report::{render_report_md, ReportInputs};
use crate::scheduler::{MaintenanceAction, Scheduler, TaskObserver, TaskRegistry};

/// Ships a version to an environment.
#[async_trait]
pub trait DeployTarget: Send + Sync {
    async fn deploy(&self, environment: &str, version: &str) -> UpkeepResult<()>;
}

/// Outcome of one deployment attempt that got past its pre-deploy pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployRecord {
    pub environment: String,
    pub version: String,
    /// Pre-deploy pipeline job.
    pub job_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub deployed_at: DateTime<Utc>,
}

/// Raises an alert for every failed task result.
struct TaskFailureAlerts {
    alerts: Arc<AlertManager>,
}

#[async_trait]
impl TaskObserver for TaskFailureAlerts {
    async fn on_result(&self, task: &MaintenanceTask, result: &MaintenanceResult) {
        if !result.success {
            self.alerts.record_task_failure(task, result).await;
        }
    }
}

/// Renders reports from shared component handles; usable from the report loop.
#[derive(Clone)]
struct Reporter {
    scorer: Arc<HealthScorer>,
    alerts: Arc<AlertManager>,
    registry: Arc<TaskRegistry>,
    jobs: Arc<JobStore>,
    roadmap: Arc<Roadmap>,
}

impl Reporter {
    fn render(&self, status: &MaintenanceStatus) -> String {
        let scoring = self.scorer.scoring();
        let active = self.alerts.active();
        let tasks = self.registry.tasks();
        let jobs = self.jobs.recent(scoring.ci_window);
        let milestones = self.roadmap.milestones();
        let technologies = self.roadmap.technologies();
        render_report_md(&ReportInputs {
            status,
            active_alerts: &active,
            tasks: &tasks,
            recent_jobs: &jobs,
            milestones: &milestones,
            technologies: &technologies,
            minors_per_major: scoring.minors_per_major,
        })
    }

    async fn report(&self) -> String {
        let status = self.scorer.score();
        emit_health_computed(&status);
        self.alerts.generate(&status).await;
        self.render(&status)
    }
}

struct ReportLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Builds an [`Orchestrator`] from its collaborators.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    suites: Vec<TestSuite>,
    executors: SuiteExecutors,
    deploy_target: Option<Arc<dyn DeployTarget>>,
    notifiers: Vec<Arc<dyn Notifier>>,
    clock: Arc<dyn Clock>,
    milestones: Vec<EvolutionMilestone>,
    technologies: Vec<TechnologyEntry>,
}

impl OrchestratorBuilder {
    pub fn suites(mut self, suites: Vec<TestSuite>) -> Self {
        self.suites = suites;
        self
    }

    pub fn executors(mut self, executors: SuiteExecutors) -> Self {
        self.executors = executors;
        self
    }

    pub fn deploy_target(mut self, target: Arc<dyn DeployTarget>) -> Self {
        self.deploy_target = Some(target);
        self
    }

    /// Register a notification channel. `console` is always available.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn milestones(mut self, milestones: Vec<EvolutionMilestone>) -> Self {
        self.milestones = milestones;
        self
    }

    pub fn technologies(mut self, technologies: Vec<TechnologyEntry>) -> Self {
        self.technologies = technologies;
        self
    }

    pub fn build(self) -> UpkeepResult<Orchestrator> {
        self.config.validate()?;
        let config = self.config;
        let metrics = Arc::new(Metrics::new());

        let mut dispatcher = NotificationDispatcher::new(
            config.enable_notifications,
            config.notification_channels.clone(),
        );
        for notifier in self.notifiers {
            dispatcher.register(notifier);
        }
        let dispatcher = Arc::new(dispatcher);

        let registry = Arc::new(TaskRegistry::new());
        let jobs = Arc::new(JobStore::new(config.history_limit));
        let roadmap = Arc::new(Roadmap::new(self.milestones, self.technologies));

        let pipeline = Arc::new(PipelineExecutor::new(
            self.suites,
            self.executors,
            Arc::clone(&jobs),
            Arc::clone(&dispatcher),
            Arc::clone(&self.clock),
            Arc::clone(&metrics),
            PipelineSettings::from_config(&config),
        ));
        let scorer = Arc::new(HealthScorer::new(
            Arc::clone(&registry),
            Arc::clone(&jobs),
            Arc::clone(&roadmap),
            Arc::clone(&self.clock),
            config.scoring.clone(),
        ));
        let alerts = Arc::new(AlertManager::new(
            Arc::clone(&dispatcher),
            Arc::clone(&self.clock),
            Arc::clone(&metrics),
            config.alert_retention_hours,
        ));
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            Arc::clone(&self.clock),
            Arc::clone(&metrics),
            config.health_check_task_id.clone(),
        );
        scheduler.add_observer(Arc::new(TaskFailureAlerts {
            alerts: Arc::clone(&alerts),
        }));

        Ok(Orchestrator {
            auto_fix: Arc::new(AtomicBool::new(config.enable_automatic_fixes)),
            config: RwLock::new(config),
            clock: self.clock,
            metrics,
            dispatcher,
            scheduler,
            pipeline,
            reporter: Reporter {
                scorer,
                alerts,
                registry,
                jobs,
                roadmap,
            },
            deploy_target: self.deploy_target,
            deployments: Mutex::new(Vec::new()),
            report_loop: Mutex::new(None),
        })
    }
}

/// The maintenance and CI control plane.
pub struct Orchestrator {
    config: RwLock<OrchestratorConfig>,
    auto_fix: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    dispatcher: Arc<NotificationDispatcher>,
    scheduler: Scheduler,
    pipeline: Arc<PipelineExecutor>,
    reporter: Reporter,
    deploy_target: Option<Arc<dyn DeployTarget>>,
    deployments: Mutex<Vec<DeployRecord>>,
    report_loop: Mutex<Option<ReportLoop>>,
}

impl Orchestrator {
    pub fn builder(config: OrchestratorConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            suites: Vec::new(),
            executors: SuiteExecutors::new(),
            deploy_target: None,
            notifiers: Vec::new(),
            clock: Arc::new(SystemClock),
            milestones: Vec::new(),
            technologies: Vec::new(),
        }
    }

    pub fn config(&self) -> OrchestratorConfig {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn roadmap(&self) -> &Arc<Roadmap> {
        &self.reporter.roadmap
    }

    pub fn tasks(&self) -> Vec<MaintenanceTask> {
        self.reporter.registry.tasks()
    }

    pub fn suites(&self) -> Vec<TestSuite> {
        self.pipeline.suites()
    }

    pub fn set_suites(&self, suites: Vec<TestSuite>) {
        self.pipeline.set_suites(suites);
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.reporter.jobs
    }

    pub fn deployments(&self) -> Vec<DeployRecord> {
        self.deployments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn register_task(&self, task: MaintenanceTask, action: Arc<dyn MaintenanceAction>) {
        self.scheduler.register(task, action);
    }

    /// Register `task` as a health check that rescores and raises alerts.
    pub fn register_health_check(&self, task: MaintenanceTask) {
        let action = HealthCheckAction::new(
            Arc::clone(&self.reporter.scorer),
            Arc::clone(&self.reporter.alerts),
        );
        self.scheduler.register(task, Arc::new(action));
    }

    /// Register `task` as a vulnerability scan honoring `enable_automatic_fixes`.
    pub fn register_security_scan(
        &self,
        task: MaintenanceTask,
        scanner: Arc<dyn VulnerabilityScanner>,
    ) {
        let action = SecurityScanAction::new(scanner, Arc::clone(&self.auto_fix));
        self.scheduler.register(task, Arc::new(action));
    }

    /// Start scheduling and the periodic report loop.
    ///
    /// Runs the health-check task once immediately. Returns `false` when
    /// already started.
    pub async fn start(&self) -> bool {
        if !self.scheduler.start().await {
            return false;
        }
        self.arm_report_loop();
        info!("orchestrator started");
        true
    }

    /// Cancel pending timers and request cancellation of running jobs.
    pub fn stop(&self) -> bool {
        let was_running = self.scheduler.stop();
        self.disarm_report_loop();
        let cancelled = self.reporter.jobs.cancel_all();
        if was_running {
            info!(cancelled_jobs = cancelled, "orchestrator stopped");
            self.metrics.flush();
        }
        was_running
    }

    /// Stop and drop all in-memory state. Safe to call repeatedly.
    pub fn cleanup(&self) {
        self.stop();
        self.scheduler.reset();
        self.reporter.alerts.clear();
        self.reporter.jobs.clear();
        self.deployments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub async fn run_pipeline(&self, trigger: Trigger) -> UpkeepResult<CiJob> {
        let job = self.pipeline.run(trigger).await?;
        if job.status == JobStatus::Failed {
            let suites = self.pipeline.suites();
            let critical = job.failed_suites().iter().any(|id| {
                suites
                    .iter()
                    .any(|s| s.id == *id && s.is_critical())
            });
            self.reporter.alerts.record_job_failure(&job, critical).await;
        }
        Ok(job)
    }

    pub fn cancel_job(&self, job_id: &str) -> bool {
        self.pipeline.cancel(job_id)
    }

    pub async fn run_maintenance_task(&self, task_id: &str) -> UpkeepResult<MaintenanceResult> {
        self.scheduler.run_task(task_id).await
    }

    /// Score now and raise any threshold alerts. Never cached.
    pub async fn perform_health_check(&self) -> MaintenanceStatus {
        let status = self.reporter.scorer.score();
        emit_health_computed(&status);
        self.reporter.alerts.generate(&status).await;
        status
    }

    /// Deploy `version` to `environment` behind a passing pipeline run.
    ///
    /// Fails with [`UpkeepError::DeployPrecondition`] when the pre-deploy run
    /// does not pass. A failing deploy target is recorded, not returned.
    pub async fn deploy(&self, environment: &str, version: &str) -> UpkeepResult<DeployRecord> {
        let known = self
            .config()
            .deployment_environments
            .iter()
            .any(|e| e == environment);
        if !known {
            return Err(UpkeepError::UnknownEnvironment(environment.to_string()));
        }
        let target = self.deploy_target.clone().ok_or_else(|| UpkeepError::Deploy {
            environment: environment.to_string(),
            reason: "no deploy target configured".to_string(),
        })?;

        let job = self.run_pipeline(Trigger::Manual).await?;
        if job.status != JobStatus::Passed {
            warn!(job_id = %job.id, status = %job.status, "deployment blocked");
            return Err(UpkeepError::DeployPrecondition {
                job_id: job.id,
                status: job.status,
            });
        }

        let outcome = target.deploy(environment, version).await;
        let record = DeployRecord {
            environment: environment.to_string(),
            version: version.to_string(),
            job_id: job.id,
            success: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
            deployed_at: self.clock.now(),
        };
        if record.success {
            info!(environment, version, "deployment succeeded");
        } else {
            warn!(environment, version, error = ?record.error, "deployment failed");
        }

        let subject = format!(
            "[upkeep] deploy {} {} to {}",
            if record.success { "succeeded:" } else { "failed:" },
            version,
            environment
        );
        let body = match &record.error {
            Some(error) => format!("Pre-deploy job: {}\nError: {}", record.job_id, error),
            None => format!("Pre-deploy job: {}", record.job_id),
        };
        self.dispatcher
            .dispatch(&Notification::new(subject, body))
            .await;

        self.deployments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(record)
    }

    /// Markdown digest of current status, active alerts and the three domains.
    pub async fn generate_periodic_report(&self) -> String {
        self.reporter.report().await
    }

    pub fn get_alerts(&self) -> Vec<Alert> {
        self.reporter.alerts.alerts()
    }

    pub fn acknowledge_alert(&self, alert_id: &str) -> bool {
        self.reporter.alerts.acknowledge(alert_id)
    }

    /// Apply a partial config update. Invalid patches change nothing.
    pub fn update_config(&self, patch: ConfigPatch) -> UpkeepResult<()> {
        let (config, previous_interval) = {
            let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
            let previous_interval = config.reporting_interval_hours;
            config.apply(patch)?;
            (config.clone(), previous_interval)
        };

        self.auto_fix
            .store(config.enable_automatic_fixes, Ordering::SeqCst);
        self.dispatcher
            .configure(config.enable_notifications, config.notification_channels.clone());
        self.pipeline.configure(PipelineSettings::from_config(&config));
        self.reporter.scorer.set_scoring(config.scoring.clone());
        self.reporter.jobs.set_limit(config.history_limit);
        self.reporter
            .alerts
            .set_retention_hours(config.alert_retention_hours);
        self.scheduler
            .set_health_check_task(config.health_check_task_id.clone());

        if config.reporting_interval_hours != previous_interval && self.disarm_report_loop() {
            self.arm_report_loop();
        }
        info!("configuration updated");
        Ok(())
    }

    fn arm_report_loop(&self) {
        let hours = self.config().reporting_interval_hours.max(1);
        let period = std::time::Duration::from_secs(hours * 3600);
        let (shutdown, mut rx) = watch::channel(false);
        let reporter = self.reporter.clone();
        let dispatcher = Arc::clone(&self.dispatcher);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = rx.changed() => break,
                }
                if *rx.borrow() {
                    break;
                }
                let report = reporter.report().await;
                dispatcher
                    .dispatch(&Notification::new("[upkeep] periodic maintenance report", report))
                    .await;
            }
        });

        let previous = self
            .report_loop
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(ReportLoop { shutdown, handle });
        if let Some(previous) = previous {
            previous.shutdown.send_replace(true);
        }
    }

    fn disarm_report_loop(&self) -> bool {
        let current = self
            .report_loop
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match current {
            Some(report_loop) => {
                report_loop.shutdown.send_replace(true);
                drop(report_loop.handle);
                true
            }
            None => false,
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.scheduler.stop();
        self.disarm_report_loop();
    }
}
