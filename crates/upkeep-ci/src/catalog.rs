//! Default suite catalog.

use upkeep_core::{SuiteType, TestSuite};

/// The six standard suites.
///
/// unit runs first; integration, visual and accessibility follow it;
/// e2e and performance wait for integration. unit and integration are
/// critical.
pub fn builtin_suites() -> Vec<TestSuite> {
    vec![
        TestSuite::new("unit-tests", SuiteType::Unit)
            .with_timeout_ms(120_000)
            .critical(),
        TestSuite::new("integration-tests", SuiteType::Integration)
            .depends_on("unit-tests")
            .with_retries(1)
            .critical(),
        TestSuite::new("visual-tests", SuiteType::Visual)
            .depends_on("unit-tests")
            .with_retries(1),
        TestSuite::new("accessibility-tests", SuiteType::Accessibility).depends_on("unit-tests"),
        TestSuite::new("performance-tests", SuiteType::Performance)
            .depends_on("integration-tests")
            .with_timeout_ms(600_000),
        TestSuite::new("e2e-tests", SuiteType::E2e)
            .depends_on("integration-tests")
            .with_retries(2)
            .with_timeout_ms(600_000),
    ]
}
