//! Deploy target backed by a command.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use upkeep_core::{DeployTarget, UpkeepError, UpkeepResult};

use crate::process::run_command;

/// Env var carrying the target environment name.
pub const ENV_ENVIRONMENT: &str = "UPKEEP_ENVIRONMENT";
/// Env var carrying the version being deployed.
pub const ENV_VERSION: &str = "UPKEEP_VERSION";

/// Runs a deploy command with the environment and version passed as
/// [`ENV_ENVIRONMENT`] and [`ENV_VERSION`].
#[derive(Debug, Clone)]
pub struct CommandDeployTarget {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandDeployTarget {
    pub fn new(command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl DeployTarget for CommandDeployTarget {
    async fn deploy(&self, environment: &str, version: &str) -> UpkeepResult<()> {
        let output = run_command(
            &format!("deploy to {environment}"),
            &self.command,
            self.timeout,
            &[(ENV_ENVIRONMENT, environment), (ENV_VERSION, version)],
        )
        .await
        .map_err(|e| UpkeepError::Deploy {
            environment: environment.to_string(),
            reason: e.to_string(),
        })?;

        if !output.success() {
            return Err(UpkeepError::Deploy {
                environment: environment.to_string(),
                reason: output.failure_reason(),
            });
        }
        info!(environment, version, duration_ms = output.duration_ms, "deploy command finished");
        Ok(())
    }
}
