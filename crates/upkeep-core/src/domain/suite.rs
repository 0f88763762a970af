//! Test suite definitions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Suite ids treated as critical even when not flagged explicitly.
pub const CONVENTIONAL_CRITICAL_SUITES: [&str; 2] = ["unit-tests", "integration-tests"];

/// Kind of checks a suite runs. Selects the executor strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SuiteType {
    Unit,
    Integration,
    Visual,
    Accessibility,
    Performance,
    E2e,
}

impl SuiteType {
    pub const ALL: [SuiteType; 6] = [
        SuiteType::Unit,
        SuiteType::Integration,
        SuiteType::Visual,
        SuiteType::Accessibility,
        SuiteType::Performance,
        SuiteType::E2e,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SuiteType::Unit => "unit",
            SuiteType::Integration => "integration",
            SuiteType::Visual => "visual",
            SuiteType::Accessibility => "accessibility",
            SuiteType::Performance => "performance",
            SuiteType::E2e => "e2e",
        }
    }
}

/// Immutable definition of a suite in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestSuite {
    /// Unique suite id, e.g. `"unit-tests"`.
    pub id: String,

    #[serde(rename = "type")]
    pub suite_type: SuiteType,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Advisory timeout handed to the executor.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra attempts after a failed first attempt.
    #[serde(default)]
    pub retries: u32,

    /// Ids of suites that must complete before this one starts.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,

    /// A failing critical suite stops the pipeline after its wave.
    #[serde(default)]
    pub critical: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    300_000
}

impl TestSuite {
    pub fn new(id: impl Into<String>, suite_type: SuiteType) -> Self {
        Self {
            id: id.into(),
            suite_type,
            enabled: true,
            timeout_ms: default_timeout_ms(),
            retries: 0,
            dependencies: BTreeSet::new(),
            critical: false,
        }
    }

    /// Add a dependency on another suite id.
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Explicit flag or one of [`CONVENTIONAL_CRITICAL_SUITES`].
    pub fn is_critical(&self) -> bool {
        self.critical || CONVENTIONAL_CRITICAL_SUITES.contains(&self.id.as_str())
    }
}
