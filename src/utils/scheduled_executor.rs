// Scheduled Executor for periodic tasks
// Adapted for async/tokio runtime; generalised to accept either a fixed
// interval or a local-time crontab expression as its trigger.

use chrono::Local;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;

use super::cron::CronSchedule;

/// A trait for tasks that run periodically
pub trait ScheduledTask: Send + Sync + 'static {
    /// Execute the task
    /// Returns Ok(()) on success, Err on failure
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>>;

    /// Check if the task should terminate
    /// Default: never terminate (run forever)
    fn should_terminate(&self) -> bool {
        false
    }
}

/// Blanket implementation for Arc<T> where T: ScheduledTask
/// This allows passing Arc-wrapped tasks directly to the executor
impl<T: ScheduledTask> ScheduledTask for Arc<T> {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        (**self).run()
    }

    fn should_terminate(&self) -> bool {
        (**self).should_terminate()
    }
}

enum Trigger {
    Interval(Duration),
    Cron(CronSchedule),
}

/// Scheduled executor for running periodic tasks
pub struct ScheduledExecutor {
    trigger: Trigger,
    task_name: String,
    shutdown: Arc<AtomicBool>,
}

impl ScheduledExecutor {
    /// Create an executor that fires every `interval`.
    pub fn new(task_name: impl Into<String>, interval: Duration) -> Self {
        Self {
            task_name: task_name.into(),
            trigger: Trigger::Interval(interval),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create an executor driven by a local-time crontab expression (C12).
    pub fn new_cron(task_name: impl Into<String>, cron_expr: &str) -> Result<Self, String> {
        Ok(Self {
            task_name: task_name.into(),
            trigger: Trigger::Cron(CronSchedule::parse(cron_expr)?),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Start the scheduled task.
    ///
    /// Runs until `shutdown()` is set on the handle or the task's
    /// `should_terminate()` returns true.
    pub async fn start<T>(self, task: T)
    where
        T: ScheduledTask,
    {
        let task_name = self.task_name.clone();
        let shutdown = self.shutdown;

        tracing::info!("starting scheduled task '{}'", task_name);

        loop {
            if shutdown.load(Ordering::Relaxed) || task.should_terminate() {
                tracing::info!("scheduled task '{}' is shutting down", task_name);
                break;
            }

            let wait = match &self.trigger {
                Trigger::Interval(interval) => *interval,
                Trigger::Cron(schedule) => {
                    let now = Local::now();
                    match schedule.next_after(now) {
                        Some(next) => (next - now).to_std().unwrap_or(Duration::ZERO),
                        None => {
                            tracing::error!(
                                "cron schedule '{}' for task '{}' never matches, stopping",
                                schedule.expr(),
                                task_name
                            );
                            break;
                        },
                    }
                },
            };

            if wait > Duration::ZERO {
                sleep(wait).await;
            }

            if shutdown.load(Ordering::Relaxed) || task.should_terminate() {
                break;
            }

            tracing::debug!("executing scheduled task '{}'", task_name);
            match task.run().await {
                Ok(()) => tracing::debug!("scheduled task '{}' completed successfully", task_name),
                Err(e) => tracing::error!("scheduled task '{}' failed: {}", task_name, e),
            }
        }

        tracing::info!("scheduled task '{}' stopped", task_name);
    }
}

// =============================================================================
// Helper macros for implementing ScheduledTask
// =============================================================================

#[macro_export]
macro_rules! impl_scheduled_task {
    ($type:ty, $method:ident) => {
        impl $crate::utils::ScheduledTask for $type {
            fn run(
                &self,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = Result<(), anyhow::Error>> + Send + '_>,
            > {
                Box::pin(async move { self.$method().await })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct TestTask {
        counter: Arc<AtomicU32>,
        max_runs: u32,
    }

    impl ScheduledTask for TestTask {
        fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
            Box::pin(async move {
                self.counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
        }

        fn should_terminate(&self) -> bool {
            self.counter.load(Ordering::Relaxed) >= self.max_runs
        }
    }

    #[tokio::test]
    async fn test_scheduled_executor_interval() {
        let counter = Arc::new(AtomicU32::new(0));
        let task = TestTask { counter: counter.clone(), max_runs: 3 };

        let executor = ScheduledExecutor::new("test", Duration::from_millis(5));
        executor.start(task).await;

        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn cron_trigger_parses() {
        assert!(ScheduledExecutor::new_cron("daily-full-scan", "0 3 * * *").is_ok());
        assert!(ScheduledExecutor::new_cron("bad", "not a cron").is_err());
    }
}
