//! Domain models for upkeep.
//!
//! Canonical definitions for the core entities:
//! - `TestSuite` / `CiJob` / `TestResult`: pipeline inputs and outputs
//! - `MaintenanceTask` / `MaintenanceResult`: recurring maintenance work
//! - `EvolutionMilestone` / `TechnologyEntry`: roadmap inputs to scoring
//! - `MaintenanceStatus`: derived health view
//! - `Alert`: threshold breaches and failures

pub mod alert;
pub mod job;
pub mod roadmap;
pub mod status;
pub mod suite;
pub mod task;

pub use alert::{Alert, AlertSeverity, AlertType};
pub use job::{
    Artifact, ArtifactKind, CiJob, Coverage, JobStatus, TestOutcome, TestResult, TestStatus,
    Trigger,
};
pub use roadmap::{EvolutionMilestone, MilestoneStatus, TechnologyEntry};
pub use status::{DomainHealth, HealthBucket, HealthSignals, MaintenanceStatus};
pub use suite::{SuiteType, TestSuite, CONVENTIONAL_CRITICAL_SUITES};
pub use task::{
    Issue, IssueSeverity, MaintenanceResult, MaintenanceTask, TaskFrequency, TaskPriority,
    TaskStatus,
};
