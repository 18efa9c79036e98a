use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::metrics::Metrics;

use super::lock::TickLock;

// ============================================================================
// Task Runner
// ============================================================================
//
// The process owns its periodic work explicitly: each task is a named closure
// with an interval and a lock key. A tick runs only while holding the tick
// lock, so in a multi-instance deployment exactly one instance executes it,
// and a run that outlives its interval keeps the lock rather than overlapping
// the next tick. Tasks log their own failures; the runner never sees them.
//
// ============================================================================

type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub struct ScheduledTask {
    pub name: &'static str,
    pub lock_key: &'static str,
    pub interval: Duration,
    pub lock_ttl: Duration,
    run: TaskFn,
}

impl ScheduledTask {
    pub fn new<F>(
        name: &'static str,
        lock_key: &'static str,
        interval: Duration,
        lock_ttl: Duration,
        run: F,
    ) -> Self
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            name,
            lock_key,
            interval,
            lock_ttl,
            run: Arc::new(run),
        }
    }
}

pub struct TaskRunner {
    lock: Arc<dyn TickLock>,
    metrics: Arc<Metrics>,
    tasks: Vec<ScheduledTask>,
}

impl TaskRunner {
    pub fn new(lock: Arc<dyn TickLock>, metrics: Arc<Metrics>) -> Self {
        Self {
            lock,
            metrics,
            tasks: Vec::new(),
        }
    }

    pub fn register(mut self, task: ScheduledTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// Spawn one tokio task per registered schedule and return the handles.
    pub fn spawn_all(self) -> Vec<JoinHandle<()>> {
        self.tasks
            .into_iter()
            .map(|task| {
                let lock = self.lock.clone();
                let metrics = self.metrics.clone();

                tokio::spawn(async move {
                    tracing::info!(
                        task = task.name,
                        interval_secs = task.interval.as_secs(),
                        "Scheduled task started"
                    );

                    let mut ticker = tokio::time::interval(task.interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                    loop {
                        ticker.tick().await;

                        match lock.try_acquire(task.lock_key, task.lock_ttl).await {
                            Ok(Some(token)) => {
                                metrics.record_job_run(task.name);
                                (task.run)().await;

                                if let Err(error) =
                                    lock.release(task.lock_key, &token).await
                                {
                                    tracing::warn!(
                                        task = task.name,
                                        error = %error,
                                        "Failed to release tick lock"
                                    );
                                }
                            }
                            Ok(None) => {
                                tracing::debug!(
                                    task = task.name,
                                    "Tick lock held elsewhere, skipping run"
                                );
                            }
                            Err(error) => {
                                tracing::error!(
                                    task = task.name,
                                    error = %error,
                                    "Failed to acquire tick lock"
                                );
                            }
                        }
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::lock::LocalTickLock;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_runner_drives_registered_task() {
        let runs = Arc::new(AtomicU32::new(0));
        let runs_in_task = runs.clone();

        let task = ScheduledTask::new(
            "counter",
            "lock:counter",
            Duration::from_millis(10),
            Duration::from_secs(30),
            move || {
                let runs = runs_in_task.clone();
                Box::pin(async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                })
            },
        );

        let handles = TaskRunner::new(
            Arc::new(LocalTickLock::new()),
            Arc::new(Metrics::new().unwrap()),
        )
        .register(task)
        .spawn_all();

        // First tick fires immediately, then every 10ms.
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(runs.load(Ordering::SeqCst) >= 3);
        for handle in handles {
            handle.abort();
        }
    }
}
