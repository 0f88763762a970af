//! upkeep core library
//!
//! In-process control plane for recurring maintenance and CI: wave-ordered
//! pipeline execution, task scheduling, health scoring, alerting and
//! notification dispatch. Concrete collaborators (suite runners, scanners,
//! deploy targets, channels) plug in through the traits re-exported here.

pub mod actions;
pub mod alerts;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod health;
pub mod metrics;
pub mod notify;
pub mod obs;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod scheduler;
pub mod telemetry;

pub use actions::{HealthCheckAction, SecurityScanAction, Vulnerability, VulnerabilityScanner};
pub use alerts::{AlertCandidate, AlertManager};
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use config::{ConfigPatch, OrchestratorConfig, ScoringConfig};
pub use domain::{
    Alert, AlertSeverity, AlertType, Artifact, ArtifactKind, CiJob, Coverage, DomainHealth,
    EvolutionMilestone, HealthBucket, HealthSignals, Issue, IssueSeverity, JobStatus,
    MaintenanceResult, MaintenanceStatus, MaintenanceTask, MilestoneStatus, SuiteType,
    TaskFrequency, TaskPriority, TaskStatus, TechnologyEntry, TestOutcome, TestResult, TestStatus,
    TestSuite, Trigger,
};
pub use error::{UpkeepError, UpkeepResult};
pub use health::{compute_status, HealthInputs, HealthScorer, Roadmap};
pub use metrics::Metrics;
pub use notify::{
    ConsoleNotifier, DispatchResult, Notification, NotificationDispatcher, Notifier, NotifyError,
};
pub use orchestrator::{DeployRecord, DeployTarget, Orchestrator, OrchestratorBuilder};
pub use pipeline::{
    JobStore, PipelineExecutor, PipelineSettings, SuiteExecutor, SuiteExecutors, SuiteOutcome,
};
pub use report::render_report_md;
pub use resolver::{resolve_waves, ExecutionPlan};
pub use scheduler::{MaintenanceAction, Scheduler, TaskObserver, TaskRegistry};
