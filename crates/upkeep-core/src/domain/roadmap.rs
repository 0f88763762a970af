//! Roadmap entities used as health scoring inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Planned,
    InProgress,
    Completed,
    Delayed,
    Cancelled,
}

/// A planned unit of roadmap work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvolutionMilestone {
    pub id: String,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub target_date: DateTime<Utc>,
    pub status: MilestoneStatus,
    /// Completion percentage, 0-100.
    pub progress: u8,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl EvolutionMilestone {
    /// Progress a linear schedule expects at `now`, 0-100.
    pub fn expected_progress(&self, now: DateTime<Utc>) -> f64 {
        let total = (self.target_date - self.start_date).num_milliseconds();
        if total <= 0 {
            return if now >= self.target_date { 100.0 } else { 0.0 };
        }
        let elapsed = (now - self.start_date).num_milliseconds();
        (elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// A tracked dependency or platform version on the roadmap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TechnologyEntry {
    pub name: String,
    pub current_version: String,
    pub target_version: String,
    /// Date by which the upgrade should be reviewed.
    pub review_date: DateTime<Utc>,
}

impl TechnologyEntry {
    /// Versions behind target in minor-version-equivalents.
    ///
    /// Each major step counts as `minors_per_major` minors, plus the target's
    /// minor. `None` when either version does not parse.
    pub fn version_lag(&self, minors_per_major: u64) -> Option<u64> {
        let current = Version::parse(&self.current_version)?;
        let target = Version::parse(&self.target_version)?;
        let lag = match target.major.cmp(&current.major) {
            std::cmp::Ordering::Greater => {
                (target.major - current.major) * minors_per_major + target.minor
            }
            std::cmp::Ordering::Equal => target.minor.saturating_sub(current.minor),
            std::cmp::Ordering::Less => 0,
        };
        Some(lag)
    }
}

/// MAJOR.MINOR with optional PATCH and pre-release suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Version {
    major: u64,
    minor: u64,
}

impl Version {
    fn parse(input: &str) -> Option<Self> {
        let input = input.trim().trim_start_matches('v');
        let version_part = match input.split_once('-') {
            Some((v, _pre)) => v,
            None => input,
        };

        let parts: Vec<&str> = version_part.split('.').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return None;
        }

        let major = parts[0].parse::<u64>().ok()?;
        let minor = parts[1].parse::<u64>().ok()?;
        if let Some(patch) = parts.get(2) {
            patch.parse::<u64>().ok()?;
        }

        Some(Self { major, minor })
    }
}
