//! Scheduler timing under paused tokio time.
//!
//! `TokioClock` follows the paused runtime clock, so sleeping in the test
//! advances both the timers and the timestamps the scheduler records.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use upkeep_core::{
    Clock, MaintenanceAction, MaintenanceResult, MaintenanceTask, Metrics, Scheduler,
    TaskFrequency, TaskPriority, TaskRegistry, TaskStatus, TokioClock, UpkeepError,
    UpkeepResult,
};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

struct CountingAction {
    runs: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl MaintenanceAction for CountingAction {
    async fn run(&self, task: &MaintenanceTask) -> UpkeepResult<MaintenanceResult> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(UpkeepError::TaskExecution {
                task: task.id.clone(),
                reason: "registry unreachable".to_string(),
            });
        }
        Ok(MaintenanceResult::ok())
    }
}

fn setup() -> (Scheduler, Arc<TokioClock>) {
    let clock = Arc::new(TokioClock::new());
    let scheduler = Scheduler::new(
        Arc::new(TaskRegistry::new()),
        clock.clone(),
        Arc::new(Metrics::new()),
        "health-check",
    );
    (scheduler, clock)
}

fn register(scheduler: &Scheduler, id: &str, frequency: TaskFrequency, fail: bool) -> Arc<AtomicUsize> {
    let runs = Arc::new(AtomicUsize::new(0));
    scheduler.register(
        MaintenanceTask::new(id, id, frequency, TaskPriority::Medium, "dependencies"),
        Arc::new(CountingAction {
            runs: runs.clone(),
            fail,
        }),
    );
    runs
}

#[tokio::test(start_paused = true)]
async fn daily_task_fires_and_reschedules_from_execution_time() {
    let (scheduler, clock) = setup();
    let t0 = clock.now();
    let runs = register(&scheduler, "dependency-audit", TaskFrequency::Daily, false);

    let task = scheduler.registry().task("dependency-audit").unwrap();
    assert_eq!(task.next_run, Some(t0 + ChronoDuration::milliseconds(86_400_000)));

    assert!(scheduler.start().await);
    tokio::time::sleep(DAY + Duration::from_secs(1)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let task = scheduler.registry().task("dependency-audit").unwrap();
    let last_run = task.last_run.unwrap();
    assert!((last_run - (t0 + ChronoDuration::days(1))).num_milliseconds().abs() <= 5);
    assert_eq!(task.next_run, Some(last_run + ChronoDuration::milliseconds(86_400_000)));
    assert_eq!(task.status, TaskStatus::Completed);

    // keeps recurring
    tokio::time::sleep(DAY * 2).await;
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn nothing_fires_after_stop() {
    let (scheduler, _) = setup();
    let daily = register(&scheduler, "dependency-audit", TaskFrequency::Daily, false);
    let weekly = register(&scheduler, "license-review", TaskFrequency::Weekly, false);

    assert!(scheduler.start().await);
    assert!(scheduler.stop());
    tokio::time::sleep(DAY * 30).await;

    assert_eq!(daily.load(Ordering::SeqCst), 0);
    assert_eq!(weekly.load(Ordering::SeqCst), 0);
    assert!(scheduler
        .registry()
        .task("dependency-audit")
        .unwrap()
        .last_run
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn failing_task_keeps_its_schedule() {
    let (scheduler, _) = setup();
    let runs = register(&scheduler, "backup-verify", TaskFrequency::Daily, true);

    scheduler.start().await;
    tokio::time::sleep(DAY + Duration::from_secs(1)).await;

    let task = scheduler.registry().task("backup-verify").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    let result = task.last_result.unwrap();
    assert!(!result.success);
    assert_eq!(result.issues.len(), 1);
    assert!(result.issues[0].description.contains("registry unreachable"));

    tokio::time::sleep(DAY).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn on_demand_tasks_never_fire_on_their_own() {
    let (scheduler, _) = setup();
    let runs = register(&scheduler, "cache-purge", TaskFrequency::OnDemand, false);

    scheduler.start().await;
    tokio::time::sleep(DAY * 60).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    scheduler.run_task("cache-purge").await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(scheduler.registry().task("cache-purge").unwrap().next_run.is_none());
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn start_runs_health_check_immediately() {
    let (scheduler, clock) = setup();
    let t0 = clock.now();
    let runs = register(&scheduler, "health-check", TaskFrequency::Daily, false);

    assert!(scheduler.start().await);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        scheduler.registry().task("health-check").unwrap().last_run,
        Some(t0)
    );

    assert!(!scheduler.start().await);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // the regular timer still fires once a day, not twice
    tokio::time::sleep(DAY + Duration::from_secs(1)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn task_registered_while_running_is_armed() {
    let (scheduler, _) = setup();
    scheduler.start().await;

    let runs = register(&scheduler, "dependency-audit", TaskFrequency::Daily, false);
    tokio::time::sleep(DAY + Duration::from_secs(1)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    scheduler.stop();
}

/// Takes a minute per run, so overlapping timers would both see the task due.
struct SlowAction {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl MaintenanceAction for SlowAction {
    async fn run(&self, _task: &MaintenanceTask) -> UpkeepResult<MaintenanceResult> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(MaintenanceResult::ok())
    }
}

#[tokio::test(start_paused = true)]
async fn re_registered_task_keeps_a_single_timer() {
    let (scheduler, _) = setup();
    let runs = Arc::new(AtomicUsize::new(0));
    let task = || {
        MaintenanceTask::new(
            "dependency-audit",
            "Dependency audit",
            TaskFrequency::Daily,
            TaskPriority::Medium,
            "dependencies",
        )
    };

    scheduler.register(task(), Arc::new(SlowAction { runs: runs.clone() }));
    assert!(scheduler.start().await);
    scheduler.register(task(), Arc::new(SlowAction { runs: runs.clone() }));
    scheduler.register(task(), Arc::new(SlowAction { runs: runs.clone() }));

    tokio::time::sleep(DAY + Duration::from_secs(10 * 60)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let task = scheduler.registry().task("dependency-audit").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn re_registering_as_on_demand_disarms_the_timer() {
    let (scheduler, _) = setup();
    let runs = register(&scheduler, "dependency-audit", TaskFrequency::Daily, false);
    assert!(scheduler.start().await);

    let on_demand_runs = register(&scheduler, "dependency-audit", TaskFrequency::OnDemand, false);
    tokio::time::sleep(2 * DAY).await;

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(on_demand_runs.load(Ordering::SeqCst), 0);
    let task = scheduler.registry().task("dependency-audit").unwrap();
    assert_eq!(task.next_run, None);
    scheduler.stop();
}
