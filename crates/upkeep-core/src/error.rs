//! Error taxonomy for the upkeep control plane.
//!
//! Only [`UpkeepError::Dependency`] and [`UpkeepError::DeployPrecondition`]
//! are expected to reach callers of the orchestrator. Collaborator failures
//! (suites, tasks, channels) are converted into result data at the smallest
//! scope that produced them.

use thiserror::Error;

use crate::domain::JobStatus;

/// Errors produced by the orchestration layer and its collaborators.
#[derive(Debug, Error)]
pub enum UpkeepError {
    /// Cyclic or unresolvable suite dependency graph.
    #[error("unresolvable suite dependencies involving: {suites:?}")]
    Dependency { suites: Vec<String> },

    /// A suite executor failed to produce an outcome.
    #[error("suite '{suite}' execution failed: {reason}")]
    SuiteExecution { suite: String, reason: String },

    /// A maintenance action failed to produce a result.
    #[error("maintenance task '{task}' failed: {reason}")]
    TaskExecution { task: String, reason: String },

    /// Deployment requested without a passing pre-deploy pipeline.
    #[error("deployment blocked: pre-deploy pipeline {job_id} finished as {status}")]
    DeployPrecondition { job_id: String, status: JobStatus },

    #[error("deployment to '{environment}' failed: {reason}")]
    Deploy { environment: String, reason: String },

    #[error("unknown deployment environment: {0}")]
    UnknownEnvironment(String),

    #[error("maintenance task not found: {0}")]
    TaskNotFound(String),

    #[error("ci job not found: {0}")]
    JobNotFound(String),

    #[error("vulnerability scan failed: {0}")]
    Scan(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for upkeep operations.
pub type UpkeepResult<T> = std::result::Result<T, UpkeepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_error_names_suites() {
        let err = UpkeepError::Dependency {
            suites: vec!["a".to_string(), "b".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("\"a\""));
        assert!(msg.contains("\"b\""));
    }

    #[test]
    fn test_deploy_precondition_displays_status() {
        let err = UpkeepError::DeployPrecondition {
            job_id: "job-1".to_string(),
            status: JobStatus::Failed,
        };
        let msg = err.to_string();
        assert!(msg.contains("job-1"));
        assert!(msg.contains("failed"));
    }

    #[test]
    fn test_task_not_found_displays_id() {
        let err = UpkeepError::TaskNotFound("nightly-audit".to_string());
        assert!(err.to_string().contains("nightly-audit"));
    }
}
