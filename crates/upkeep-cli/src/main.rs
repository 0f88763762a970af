//! upkeep - maintenance and CI orchestration
//!
//! ## Commands
//!
//! - `plan`: Show the wave plan the suites resolve to
//! - `pipeline`: Run the suites once
//! - `health`: Score maintenance, CI and evolution health
//! - `report`: Print the markdown maintenance report
//! - `task`: Run one maintenance task now
//! - `deploy`: Deploy a version behind a passing pipeline
//! - `serve`: Run the scheduler until interrupted

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn, Level};

use upkeep_cli::Workspace;
use upkeep_core::{resolve_waves, telemetry, CiJob, JobStatus, Orchestrator, TestStatus, Trigger};

#[derive(Parser)]
#[command(name = "upkeep")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Maintenance and CI orchestration", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Workspace file describing suites, tasks and channels
    #[arg(short, long, global = true, env = "UPKEEP_WORKSPACE", default_value = "upkeep.json")]
    workspace: PathBuf,

    /// Print command results as JSON instead of text
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum TriggerArg {
    Push,
    PullRequest,
    Manual,
}

impl From<TriggerArg> for Trigger {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Push => Trigger::Push,
            TriggerArg::PullRequest => Trigger::PullRequest,
            TriggerArg::Manual => Trigger::Manual,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the execution waves and plan digest
    Plan,

    /// Run the test pipeline once
    Pipeline {
        /// What requested the run
        #[arg(short, long, value_enum, default_value_t = TriggerArg::Manual)]
        trigger: TriggerArg,
    },

    /// Compute health scores and raise alerts
    Health,

    /// Print the maintenance report as markdown
    Report,

    /// Run a maintenance task now
    Task {
        /// Task id from the workspace file
        id: String,
    },

    /// Deploy a version to an environment
    Deploy {
        /// Target environment (must be listed in deployment_environments)
        environment: String,

        /// Version to deploy
        version: String,
    },

    /// Run scheduled tasks and periodic reports until Ctrl-C
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    telemetry::init_tracing(cli.json, level);

    let workspace = Workspace::load(&cli.workspace)?;

    match cli.command {
        Commands::Plan => cmd_plan(&workspace, cli.format),
        Commands::Pipeline { trigger } => {
            let orchestrator = workspace.build()?;
            cmd_pipeline(&orchestrator, trigger.into(), cli.format).await
        }
        Commands::Health => cmd_health(&workspace.build()?, cli.format).await,
        Commands::Report => cmd_report(&workspace.build()?).await,
        Commands::Task { id } => cmd_task(&workspace.build()?, &id, cli.format).await,
        Commands::Deploy {
            environment,
            version,
        } => cmd_deploy(&workspace.build()?, &environment, &version, cli.format).await,
        Commands::Serve => cmd_serve(&workspace.build()?).await,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_plan(workspace: &Workspace, format: Format) -> Result<()> {
    let plan = resolve_waves(&workspace.suites()).context("Suites cannot be scheduled")?;
    if format == Format::Json {
        return print_json(&serde_json::json!({
            "waves": plan.waves,
            "digest": plan.digest(),
        }));
    }

    for (idx, wave) in plan.waves.iter().enumerate() {
        println!("Wave {}: {}", idx + 1, wave.join(", "));
    }
    println!();
    println!("Digest: {}", plan.digest());
    let missing = workspace.suites_without_command();
    if !missing.is_empty() {
        println!("No command configured for: {}", missing.join(", "));
    }
    Ok(())
}

fn print_job(job: &CiJob) {
    println!("Job ID: {}", job.id);
    println!(
        "Status: {}",
        if job.status == JobStatus::Passed {
            "✓ PASSED".to_string()
        } else {
            format!("✗ {}", job.status.to_string().to_uppercase())
        }
    );
    println!("Duration: {}ms", job.duration_ms().unwrap_or(0));
    println!();

    for result in &job.results {
        let mark = match result.status {
            TestStatus::Passed => "✓",
            TestStatus::Failed => "✗",
            TestStatus::Skipped => "-",
        };
        println!(
            "  {} {} ({}ms, attempts: {})",
            mark, result.suite_id, result.duration_ms, result.attempts
        );
        for test in result.tests.iter().filter(|t| !t.passed) {
            println!(
                "      FAIL {}: {}",
                test.name,
                test.message.as_deref().unwrap_or("failed")
            );
        }
    }

    println!();
    println!(
        "Summary: {}/{} suites passed",
        job.passed_count(),
        job.results.len()
    );
}

async fn cmd_pipeline(orchestrator: &Orchestrator, trigger: Trigger, format: Format) -> Result<()> {
    let job = orchestrator
        .run_pipeline(trigger)
        .await
        .context("Pipeline failed to run")?;

    if format == Format::Json {
        print_json(&job)?;
    } else {
        print_job(&job);
    }

    if job.status != JobStatus::Passed {
        anyhow::bail!("Pipeline {} finished as {}", job.id, job.status);
    }
    Ok(())
}

async fn cmd_health(orchestrator: &Orchestrator, format: Format) -> Result<()> {
    let status = orchestrator.perform_health_check().await;
    if format == Format::Json {
        return print_json(&serde_json::json!({
            "status": status,
            "alerts": orchestrator.get_alerts(),
        }));
    }

    println!(
        "Overall: {} ({:.1}/100)",
        status.overall.to_string().to_uppercase(),
        status.overall_score
    );
    println!("  Maintenance: {:.1}", status.maintenance.score);
    println!("  CI:          {:.1}", status.ci.score);
    println!("  Evolution:   {:.1}", status.evolution.score);

    let alerts = orchestrator.get_alerts();
    if !alerts.is_empty() {
        println!();
        for alert in &alerts {
            println!("[{}] {}", alert.severity, alert.title);
        }
    }
    Ok(())
}

async fn cmd_report(orchestrator: &Orchestrator) -> Result<()> {
    print!("{}", orchestrator.generate_periodic_report().await);
    Ok(())
}

async fn cmd_task(orchestrator: &Orchestrator, id: &str, format: Format) -> Result<()> {
    let result = orchestrator.run_maintenance_task(id).await?;
    if format == Format::Json {
        print_json(&result)?;
    } else {
        println!(
            "Task {}: {} ({}ms)",
            id,
            if result.success { "✓ succeeded" } else { "✗ failed" },
            result.duration_ms
        );
        for issue in &result.issues {
            println!("  [{:?}] {} ({})", issue.severity, issue.description, issue.component);
        }
        for recommendation in &result.recommendations {
            println!("  → {recommendation}");
        }
        for (name, value) in &result.metrics {
            println!("  {name} = {value}");
        }
    }

    if !result.success {
        anyhow::bail!("Task {id} failed");
    }
    Ok(())
}

async fn cmd_deploy(
    orchestrator: &Orchestrator,
    environment: &str,
    version: &str,
    format: Format,
) -> Result<()> {
    let record = orchestrator.deploy(environment, version).await?;
    if format == Format::Json {
        print_json(&record)?;
    } else if record.success {
        println!("✓ Deployed {version} to {environment} (pre-deploy job {})", record.job_id);
    } else {
        println!(
            "✗ Deploying {version} to {environment} failed: {}",
            record.error.as_deref().unwrap_or("unknown error")
        );
    }

    if !record.success {
        anyhow::bail!("Deployment to {environment} failed");
    }
    Ok(())
}

async fn cmd_serve(orchestrator: &Orchestrator) -> Result<()> {
    orchestrator.start().await;
    info!(tasks = orchestrator.tasks().len(), "serving; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    warn!("interrupted, shutting down");
    orchestrator.stop();
    orchestrator.cleanup();
    Ok(())
}
