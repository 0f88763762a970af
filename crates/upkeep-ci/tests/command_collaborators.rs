//! Command-backed collaborators driven through a real orchestrator.

use std::sync::Arc;

use upkeep_ci::{
    CommandAction, CommandDeployTarget, CommandScanner, CommandSuiteExecutor, SuiteCommand,
};
use upkeep_core::{
    IssueSeverity, JobStatus, MaintenanceTask, Orchestrator, OrchestratorConfig, SuiteExecutors,
    SuiteType, TaskFrequency, TaskPriority, TestStatus, TestSuite, Trigger, Vulnerability,
    VulnerabilityScanner,
};

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn task(id: &str, category: &str) -> MaintenanceTask {
    MaintenanceTask::new(id, id, TaskFrequency::OnDemand, TaskPriority::Medium, category)
}

/// Test: suite commands run in dependency order and stdout becomes report data
#[tokio::test]
async fn test_command_pipeline_reports_outcomes() {
    let executor = CommandSuiteExecutor::default()
        .with_command(
            "unit-tests",
            SuiteCommand::shell("echo 'ok math::add'; echo 'ok math::sub'; echo 'coverage: 91.5'"),
        )
        .with_command(
            "integration-tests",
            SuiteCommand::shell("echo 'FAIL api::login: 500 from auth'; exit 1"),
        );
    let orch = Orchestrator::builder(OrchestratorConfig::default())
        .suites(vec![
            TestSuite::new("unit-tests", SuiteType::Unit),
            TestSuite::new("integration-tests", SuiteType::Integration).depends_on("unit-tests"),
            TestSuite::new("e2e-tests", SuiteType::E2e).depends_on("integration-tests"),
        ])
        .executors(SuiteExecutors::uniform(Arc::new(executor)))
        .build()
        .expect("build");

    let job = orch.run_pipeline(Trigger::Push).await.expect("run");

    assert_eq!(job.status, JobStatus::Failed);
    let unit = job.result_for("unit-tests").expect("unit result");
    assert_eq!(unit.status, TestStatus::Passed);
    assert_eq!(unit.tests.len(), 2);
    assert_eq!(unit.coverage.map(|c| c.lines), Some(91.5));

    let integration = job.result_for("integration-tests").expect("integration result");
    assert_eq!(integration.status, TestStatus::Failed);
    assert_eq!(integration.tests[0].name, "api::login");

    // critical failure stops the pipeline before e2e
    assert!(job.result_for("e2e-tests").is_none());
}

/// Test: a suite exceeding its timeout fails instead of hanging the job
#[tokio::test]
async fn test_suite_timeout_fails_suite() {
    let executor = CommandSuiteExecutor::default()
        .with_command("slow", SuiteCommand::shell("sleep 5").with_timeout_secs(1));
    let orch = Orchestrator::builder(OrchestratorConfig::default())
        .suites(vec![TestSuite::new("slow", SuiteType::Performance)])
        .executors(SuiteExecutors::uniform(Arc::new(executor)))
        .build()
        .expect("build");

    let job = orch.run_pipeline(Trigger::Manual).await.expect("run");

    assert_eq!(job.status, JobStatus::Failed);
    let result = job.result_for("slow").expect("result");
    assert!(result.duration_ms < 4_000, "took {} ms", result.duration_ms);
}

/// Test: the deploy command sees environment and version
#[tokio::test]
async fn test_deploy_command_receives_environment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let marker = dir.path().join("deployed.txt");
    let script = format!(
        "echo \"$UPKEEP_ENVIRONMENT@$UPKEEP_VERSION\" > {}",
        marker.display()
    );

    let orch = Orchestrator::builder(OrchestratorConfig::default())
        .suites(vec![TestSuite::new("unit-tests", SuiteType::Unit)])
        .executors(SuiteExecutors::uniform(Arc::new(
            CommandSuiteExecutor::default().with_command("unit-tests", SuiteCommand::shell("true")),
        )))
        .deploy_target(Arc::new(CommandDeployTarget::new(sh(&script), 30)))
        .build()
        .expect("build");

    let record = orch.deploy("staging", "3.1.4").await.expect("deploy");

    assert!(record.success, "deploy failed: {:?}", record.error);
    let written = std::fs::read_to_string(&marker).expect("marker");
    assert_eq!(written.trim(), "staging@3.1.4");
}

/// Test: a failing deploy command is recorded with its stderr
#[tokio::test]
async fn test_failing_deploy_command_is_recorded() {
    let orch = Orchestrator::builder(OrchestratorConfig::default())
        .deploy_target(Arc::new(CommandDeployTarget::new(
            sh("echo 'cluster unreachable' >&2; exit 1"),
            30,
        )))
        .build()
        .expect("build");

    let record = orch.deploy("production", "3.1.4").await.expect("deploy");

    assert!(!record.success);
    assert!(record.error.expect("error").contains("cluster unreachable"));
}

/// Test: scanner JSON findings flow into a security scan task result
#[tokio::test]
async fn test_security_scan_task_with_command_scanner() {
    let findings = r#"[
        {"title": "Prototype pollution", "severity": "high", "package": "lodash", "auto_fixable": true},
        {"title": "ReDoS", "severity": "medium", "package": "semver", "solution": "upgrade to 7.5.2"}
    ]"#;
    let scanner = CommandScanner::new(sh(&format!("echo '{findings}'")), None, 30);

    let orch = Orchestrator::builder(OrchestratorConfig::default())
        .build()
        .expect("build");
    orch.register_security_scan(task("security-audit", "security"), Arc::new(scanner));

    let result = orch
        .run_maintenance_task("security-audit")
        .await
        .expect("task");

    assert!(result.success, "no critical finding remains");
    assert_eq!(result.issues.len(), 2);
    assert_eq!(result.issues[0].severity, IssueSeverity::High);
    assert_eq!(result.issues[1].solution.as_deref(), Some("upgrade to 7.5.2"));
    assert_eq!(result.metrics.get("vulnerabilities"), Some(&2.0));
}

/// Test: garbage scanner output is a scan error
#[tokio::test]
async fn test_unreadable_scanner_output() {
    let scanner = CommandScanner::new(sh("echo not-json"), None, 30);
    let err = scanner.scan().await.unwrap_err();
    assert!(err.to_string().contains("unreadable scanner output"));
}

/// Test: fix command gets the packages as arguments
#[tokio::test]
async fn test_fix_command_receives_packages() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("fixed.txt");
    // `sh -c script fix <packages>`: "fix" lands in $0, the packages in $@
    let mut fix = sh(&format!("echo \"$@\" > {}", log.display()));
    fix.push("fix".to_string());
    let scanner = CommandScanner::new(sh("echo '[]'"), Some(fix), 30);
    let findings = vec![Vulnerability {
        title: "Prototype pollution".to_string(),
        severity: IssueSeverity::High,
        package: "lodash".to_string(),
        solution: None,
        auto_fixable: true,
    }];

    let fixed = scanner.apply_fixes(&findings).await.expect("fix");

    assert_eq!(fixed, 1);
    assert_eq!(std::fs::read_to_string(&log).expect("log").trim(), "lodash");
}

/// Test: a command task reports recommendations, metrics and failures
#[tokio::test]
async fn test_command_task_results() {
    let orch = Orchestrator::builder(OrchestratorConfig::default())
        .build()
        .expect("build");
    orch.register_task(
        task("dependency-update", "dependencies"),
        Arc::new(CommandAction::new(
            sh("echo 'metric: outdated=4'; echo 'recommend: bump tokio'"),
            30,
        )),
    );
    orch.register_task(
        task("backup-verify", "backup"),
        Arc::new(CommandAction::new(sh("echo 'checksum mismatch' >&2; exit 2"), 30)),
    );

    let ok = orch.run_maintenance_task("dependency-update").await.expect("task");
    assert!(ok.success);
    assert_eq!(ok.metrics.get("outdated"), Some(&4.0));
    assert_eq!(ok.recommendations, vec!["bump tokio".to_string()]);

    let failed = orch.run_maintenance_task("backup-verify").await.expect("task");
    assert!(!failed.success);
    assert_eq!(failed.issues[0].description, "checksum mismatch");
    assert!(orch
        .get_alerts()
        .iter()
        .any(|a| a.key == "task.backup-verify.failed"));
}
