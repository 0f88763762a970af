//! Atomic counters for orchestration activity.
//!
//! Each orchestrator owns its own [`Metrics`] so independent instances in
//! one process do not share counts. Call [`Metrics::flush`] to emit the
//! current values as a single `info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pipelines_run: AtomicU64,
    suites_executed: AtomicU64,
    tasks_executed: AtomicU64,
    alerts_raised: AtomicU64,
    notification_failures: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            pipelines_run: AtomicU64::new(0),
            suites_executed: AtomicU64::new(0),
            tasks_executed: AtomicU64::new(0),
            alerts_raised: AtomicU64::new(0),
            notification_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_pipelines(&self) {
        self.pipelines_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_suites(&self, n: u64) {
        self.suites_executed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_tasks(&self) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_alerts(&self, n: u64) {
        self.alerts_raised.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_notification_failures(&self) {
        self.notification_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all counters as one event. Call at natural boundaries.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            pipelines_run = self.pipelines_run(),
            suites_executed = self.suites_executed(),
            tasks_executed = self.tasks_executed(),
            alerts_raised = self.alerts_raised(),
            notification_failures = self.notification_failures(),
        );
    }

    pub fn pipelines_run(&self) -> u64 {
        self.pipelines_run.load(Ordering::Relaxed)
    }

    pub fn suites_executed(&self) -> u64 {
        self.suites_executed.load(Ordering::Relaxed)
    }

    pub fn tasks_executed(&self) -> u64 {
        self.tasks_executed.load(Ordering::Relaxed)
    }

    pub fn alerts_raised(&self) -> u64 {
        self.alerts_raised.load(Ordering::Relaxed)
    }

    pub fn notification_failures(&self) -> u64 {
        self.notification_failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let a = Metrics::new();
        let b = Metrics::new();
        a.inc_pipelines();
        a.add_suites(3);
        a.inc_tasks();
        a.add_alerts(2);
        a.inc_notification_failures();

        assert_eq!(a.pipelines_run(), 1);
        assert_eq!(a.suites_executed(), 3);
        assert_eq!(a.tasks_executed(), 1);
        assert_eq!(a.alerts_raised(), 2);
        assert_eq!(a.notification_failures(), 1);
        assert_eq!(b.pipelines_run(), 0);
    }
}
