//! Suite dependency resolution into execution waves.
//!
//! A wave is the set of suites whose dependencies are all satisfied by
//! earlier waves. Suites inside one wave never depend on each other and can
//! run concurrently.
//!
//! Layering is iterative: every pass collects all unprocessed suites whose
//! dependency set is a subset of the processed set. A pass that collects
//! nothing while suites remain means a cycle or a dependency on an unknown or
//! disabled suite, and resolution fails without producing a partial plan.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::TestSuite;
use crate::error::{UpkeepError, UpkeepResult};

/// Ordered waves of suite ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub waves: Vec<Vec<String>>,
}

impl ExecutionPlan {
    /// Index of the wave containing `suite_id`.
    pub fn wave_of(&self, suite_id: &str) -> Option<usize> {
        self.waves
            .iter()
            .position(|wave| wave.iter().any(|id| id == suite_id))
    }

    pub fn suite_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    /// SHA-256 over the wave structure (hex).
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (idx, wave) in self.waves.iter().enumerate() {
            hasher.update(idx.to_le_bytes());
            for id in wave {
                hasher.update(id.as_bytes());
                hasher.update(b"\0");
            }
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

/// Resolve the enabled suites of `suites` into an [`ExecutionPlan`].
///
/// Disabled suites are ignored; an enabled suite depending on a disabled one
/// cannot be scheduled and fails resolution. Wave contents are sorted by id
/// so the plan is deterministic for a fixed input.
pub fn resolve_waves(suites: &[TestSuite]) -> UpkeepResult<ExecutionPlan> {
    let mut pending: BTreeMap<&str, &BTreeSet<String>> = BTreeMap::new();
    let mut duplicates = Vec::new();
    for suite in suites.iter().filter(|s| s.enabled) {
        if pending
            .insert(suite.id.as_str(), &suite.dependencies)
            .is_some()
        {
            duplicates.push(suite.id.clone());
        }
    }
    if !duplicates.is_empty() {
        return Err(UpkeepError::Dependency { suites: duplicates });
    }

    let mut processed: BTreeSet<String> = BTreeSet::new();
    let mut waves = Vec::new();

    while !pending.is_empty() {
        let wave: Vec<String> = pending
            .iter()
            .filter(|(_, deps)| deps.iter().all(|d| processed.contains(d)))
            .map(|(id, _)| id.to_string())
            .collect();

        if wave.is_empty() {
            return Err(UpkeepError::Dependency {
                suites: pending.keys().map(|id| id.to_string()).collect(),
            });
        }

        for id in &wave {
            pending.remove(id.as_str());
            processed.insert(id.clone());
        }
        waves.push(wave);
    }

    Ok(ExecutionPlan { waves })
}

/// Index enabled suites by id for wave lookups.
pub(crate) fn index_suites(suites: &[TestSuite]) -> HashMap<&str, &TestSuite> {
    suites
        .iter()
        .filter(|s| s.enabled)
        .map(|s| (s.id.as_str(), s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SuiteType;

    fn suite(id: &str, deps: &[&str]) -> TestSuite {
        let mut s = TestSuite::new(id, SuiteType::Unit);
        for d in deps {
            s = s.depends_on(*d);
        }
        s
    }

    #[test]
    fn test_linear_chain_produces_one_suite_per_wave() {
        let suites = vec![
            suite("e2e-tests", &["integration-tests"]),
            suite("integration-tests", &["unit-tests"]),
            suite("unit-tests", &[]),
        ];
        let plan = resolve_waves(&suites).unwrap();
        assert_eq!(
            plan.waves,
            vec![
                vec!["unit-tests".to_string()],
                vec!["integration-tests".to_string()],
                vec!["e2e-tests".to_string()],
            ]
        );
    }

    #[test]
    fn test_independent_suites_share_a_wave() {
        let suites = vec![suite("b", &[]), suite("a", &[]), suite("c", &["a", "b"])];
        let plan = resolve_waves(&suites).unwrap();
        assert_eq!(plan.waves.len(), 2);
        assert_eq!(plan.waves[0], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(plan.wave_of("c"), Some(1));
    }

    #[test]
    fn test_mutual_dependency_is_rejected() {
        let suites = vec![suite("a", &["b"]), suite("b", &["a"])];
        let err = resolve_waves(&suites).unwrap_err();
        match err {
            UpkeepError::Dependency { suites } => {
                assert_eq!(suites, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_downstream_of_valid_suites_names_only_stuck_ids() {
        let suites = vec![
            suite("root", &[]),
            suite("x", &["root", "y"]),
            suite("y", &["x"]),
        ];
        let err = resolve_waves(&suites).unwrap_err();
        assert!(matches!(
            err,
            UpkeepError::Dependency { ref suites } if suites == &vec!["x".to_string(), "y".to_string()]
        ));
    }

    #[test]
    fn test_dependency_on_disabled_suite_fails() {
        let suites = vec![suite("a", &[]).disabled(), suite("b", &["a"])];
        assert!(matches!(
            resolve_waves(&suites),
            Err(UpkeepError::Dependency { .. })
        ));
    }

    #[test]
    fn test_dependency_on_missing_suite_fails() {
        let suites = vec![suite("b", &["ghost"])];
        assert!(matches!(
            resolve_waves(&suites),
            Err(UpkeepError::Dependency { .. })
        ));
    }

    #[test]
    fn test_disabled_suites_are_excluded() {
        let suites = vec![suite("a", &[]), suite("b", &[]).disabled()];
        let plan = resolve_waves(&suites).unwrap();
        assert_eq!(plan.suite_count(), 1);
        assert_eq!(plan.wave_of("b"), None);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let suites = vec![suite("a", &[]), suite("a", &[])];
        assert!(matches!(
            resolve_waves(&suites),
            Err(UpkeepError::Dependency { .. })
        ));
    }

    #[test]
    fn test_empty_input_gives_empty_plan() {
        let plan = resolve_waves(&[]).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_diamond_wave_indices_exceed_dependencies() {
        let suites = vec![
            suite("a", &[]),
            suite("b", &["a"]),
            suite("c", &["a"]),
            suite("d", &["b", "c"]),
        ];
        let plan = resolve_waves(&suites).unwrap();
        for s in &suites {
            let idx = plan.wave_of(&s.id).unwrap();
            for dep in &s.dependencies {
                assert!(idx > plan.wave_of(dep).unwrap());
            }
        }
        assert_eq!(plan.suite_count(), 4);
    }

    #[test]
    fn test_digest_is_stable_and_structure_sensitive() {
        let chain = vec![suite("a", &[]), suite("b", &["a"])];
        let flat = vec![suite("a", &[]), suite("b", &[])];
        let d1 = resolve_waves(&chain).unwrap().digest();
        let d2 = resolve_waves(&chain).unwrap().digest();
        let d3 = resolve_waves(&flat).unwrap().digest();
        assert_eq!(d1, d2);
        assert_ne!(d1, d3);
    }
}
