//! Recurring maintenance task scheduling.
//!
//! Every recurring task gets exactly one timer loop: sleep until `next_run`,
//! execute, record the result, reschedule. Loops race their sleep against a
//! shared shutdown signal, so [`Scheduler::stop`] prevents any further firing
//! while letting an execution that already started run to completion.
//! Re-registering a task retires its previous loop the same way.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

use crate::clock::Clock;
use crate::domain::{MaintenanceResult, MaintenanceTask, TaskStatus};
use crate::error::{UpkeepError, UpkeepResult};
use crate::metrics::Metrics;
use crate::obs::{emit_task_executed, task_span};

/// The work behind a maintenance task.
#[async_trait]
pub trait MaintenanceAction: Send + Sync {
    async fn run(&self, task: &MaintenanceTask) -> UpkeepResult<MaintenanceResult>;
}

/// Receives every task result after the task state has been updated.
#[async_trait]
pub trait TaskObserver: Send + Sync {
    async fn on_result(&self, task: &MaintenanceTask, result: &MaintenanceResult);
}

struct TaskEntry {
    task: MaintenanceTask,
    action: Arc<dyn MaintenanceAction>,
}

/// Task definitions, their state and their actions, keyed by task id.
///
/// State is written only by the [`Scheduler`]; everything else reads
/// snapshots.
#[derive(Default)]
pub struct TaskRegistry {
    entries: RwLock<BTreeMap<String, TaskEntry>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, TaskEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, TaskEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, task: MaintenanceTask, action: Arc<dyn MaintenanceAction>) {
        self.write().insert(task.id.clone(), TaskEntry { task, action });
    }

    fn entry(&self, task_id: &str) -> Option<(MaintenanceTask, Arc<dyn MaintenanceAction>)> {
        self.read()
            .get(task_id)
            .map(|e| (e.task.clone(), Arc::clone(&e.action)))
    }

    fn update<F: FnOnce(&mut MaintenanceTask)>(&self, task_id: &str, f: F) -> Option<MaintenanceTask> {
        let mut entries = self.write();
        let entry = entries.get_mut(task_id)?;
        f(&mut entry.task);
        Some(entry.task.clone())
    }

    pub fn task(&self, task_id: &str) -> Option<MaintenanceTask> {
        self.read().get(task_id).map(|e| e.task.clone())
    }

    /// Snapshot of all tasks, ordered by id.
    pub fn tasks(&self) -> Vec<MaintenanceTask> {
        self.read().values().map(|e| e.task.clone()).collect()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.read().contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn recurring_ids(&self) -> Vec<String> {
        self.read()
            .values()
            .filter(|e| e.task.frequency.period().is_some())
            .map(|e| e.task.id.clone())
            .collect()
    }

    fn clear(&self) {
        self.write().clear();
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    /// Retirement signal of the single live loop per task id.
    loops: HashMap<String, watch::Sender<bool>>,
}

struct SchedulerInner {
    registry: Arc<TaskRegistry>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    observers: RwLock<Vec<Arc<dyn TaskObserver>>>,
    health_check_task_id: RwLock<String>,
    running: Mutex<Option<Running>>,
}

/// Drives recurring [`MaintenanceTask`]s on their frequency.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<TaskRegistry>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        health_check_task_id: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                registry,
                clock,
                metrics,
                observers: RwLock::new(Vec::new()),
                health_check_task_id: RwLock::new(health_check_task_id.into()),
                running: Mutex::new(None),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.inner.registry
    }

    pub fn add_observer(&self, observer: Arc<dyn TaskObserver>) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn set_health_check_task(&self, task_id: impl Into<String>) {
        *self
            .inner
            .health_check_task_id
            .write()
            .unwrap_or_else(|e| e.into_inner()) = task_id.into();
    }

    /// Register (or replace) a task.
    ///
    /// Recurring tasks get `next_run = now + period`; on-demand tasks have no
    /// next run. When the scheduler is already running, the task's timer is
    /// armed immediately and any loop left from an earlier registration is
    /// retired, so a task never has two timers.
    pub fn register(&self, mut task: MaintenanceTask, action: Arc<dyn MaintenanceAction>) {
        let now = self.inner.clock.now();
        task.next_run = task.frequency.period().map(|p| now + p);
        let task_id = task.id.clone();
        let recurring = task.next_run.is_some();
        debug!(task_id = %task_id, next_run = ?task.next_run, "task registered");
        self.inner.registry.insert(task, action);

        let mut running = self.lock_running();
        if let Some(running) = running.as_mut() {
            let previous = if recurring {
                let retire = self.arm(task_id.clone(), running.shutdown.subscribe());
                running.loops.insert(task_id.clone(), retire)
            } else {
                running.loops.remove(&task_id)
            };
            if let Some(previous) = previous {
                debug!(task_id = %task_id, "retiring previous timer loop");
                previous.send_replace(true);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Arm every recurring task and run the health-check task once.
    ///
    /// Returns `false` without doing anything when already running.
    pub async fn start(&self) -> bool {
        let armed = {
            let mut running = self.lock_running();
            if running.is_some() {
                warn!("scheduler already running; ignoring start");
                return false;
            }
            let (shutdown, _) = watch::channel(false);
            let loops: HashMap<String, watch::Sender<bool>> = self
                .inner
                .registry
                .recurring_ids()
                .into_iter()
                .map(|id| {
                    let retire = self.arm(id.clone(), shutdown.subscribe());
                    (id, retire)
                })
                .collect();
            let armed = loops.len();
            *running = Some(Running { shutdown, loops });
            armed
        };
        info!(tasks = armed, "scheduler started");

        let health_check = self
            .inner
            .health_check_task_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if self.inner.registry.contains(&health_check) {
            if let Err(e) = self.run_task(&health_check).await {
                warn!(task_id = %health_check, error = %e, "initial health check failed");
            }
        }
        true
    }

    /// Cancel all pending timers. Executions already in progress finish.
    ///
    /// Returns `false` when the scheduler was not running.
    pub fn stop(&self) -> bool {
        match self.lock_running().take() {
            Some(running) => {
                running.shutdown.send_replace(true);
                info!(tasks = running.loops.len(), "scheduler stopped");
                true
            }
            None => false,
        }
    }

    /// Stop and forget every registered task.
    pub fn reset(&self) {
        self.stop();
        self.inner.registry.clear();
    }

    /// Execute a task now, outside its schedule.
    ///
    /// Action errors become a failed [`MaintenanceResult`]; the task is
    /// rescheduled either way. Only an unknown id is an error.
    pub async fn run_task(&self, task_id: &str) -> UpkeepResult<MaintenanceResult> {
        self.inner
            .execute(task_id)
            .instrument(task_span(task_id))
            .await
    }

    /// Spawn the timer loop for `task_id`; the returned sender retires it.
    fn arm(&self, task_id: String, shutdown: watch::Receiver<bool>) -> watch::Sender<bool> {
        let (retire, retired) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.task_loop(task_id, shutdown, retired).await });
        retire
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.inner.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SchedulerInner {
    async fn task_loop(
        self: Arc<Self>,
        task_id: String,
        mut shutdown: watch::Receiver<bool>,
        mut retired: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() || *retired.borrow() {
                break;
            }
            let Some(task) = self.registry.task(&task_id) else {
                break;
            };
            let Some(period) = task.frequency.period() else {
                break;
            };

            let next_run = task.next_run.unwrap_or_else(|| self.clock.now() + period);
            let wait = (next_run - self.clock.now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
                _ = retired.changed() => break,
            }
            if *shutdown.borrow() || *retired.borrow() {
                break;
            }

            // An out-of-band run may have pushed next_run while we slept.
            let due = self
                .registry
                .task(&task_id)
                .and_then(|t| t.next_run)
                .map(|next| next <= self.clock.now())
                .unwrap_or(false);
            if !due {
                continue;
            }

            if let Err(e) = self
                .execute(&task_id)
                .instrument(task_span(&task_id))
                .await
            {
                warn!(task_id = %task_id, error = %e, "scheduled execution skipped");
                break;
            }
        }
        debug!(task_id = %task_id, "timer loop exited");
    }

    async fn execute(&self, task_id: &str) -> UpkeepResult<MaintenanceResult> {
        let (task, action) = self
            .registry
            .entry(task_id)
            .ok_or_else(|| UpkeepError::TaskNotFound(task_id.to_string()))?;
        self.registry
            .update(task_id, |t| t.status = TaskStatus::Running);

        let start = tokio::time::Instant::now();
        let outcome = AssertUnwindSafe(action.run(&task)).catch_unwind().await;
        let mut result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(task_id = %task_id, error = %e, "maintenance action failed");
                MaintenanceResult::execution_error(&task, &e.to_string())
            }
            Err(_) => {
                warn!(task_id = %task_id, "maintenance action panicked");
                MaintenanceResult::execution_error(&task, "action panicked")
            }
        };
        result.duration_ms = start.elapsed().as_millis() as u64;

        let now = self.clock.now();
        let updated = self
            .registry
            .update(task_id, |t| {
                t.status = if result.success {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                t.last_run = Some(now);
                t.next_run = t.frequency.period().map(|p| now + p);
                t.last_result = Some(result.clone());
            })
            .unwrap_or(task);

        self.metrics.inc_tasks();
        emit_task_executed(task_id, result.success, result.duration_ms);

        let observers: Vec<Arc<dyn TaskObserver>> = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            observer.on_result(&updated, &result).await;
        }
        Ok(result)
    }
}
