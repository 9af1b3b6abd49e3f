use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::warn;

/// Background task queue for fire-and-forget work (notification fan-out,
/// work-order sync). Tasks run concurrently; `drain` waits for everything
/// still in flight so shutdown does not drop queued sends.
#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<JoinSet<()>>,
}

impl TaskQueue {
    pub async fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        tasks.spawn(task);
        // Reap already-finished tasks so the set does not grow unbounded.
        while let Some(result) = tasks.try_join_next() {
            if let Err(error) = result {
                warn!(event_name = "queue.task_panicked", error = %error, "queued task failed");
            }
        }
    }

    pub async fn pending(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Waits for all in-flight tasks, up to `timeout`. Tasks still running
    /// at the deadline are aborted.
    pub async fn drain(&self, timeout: Duration) {
        let mut tasks = self.tasks.lock().await;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, tasks.join_next()).await;
            match next {
                Ok(Some(Ok(()))) => {}
                Ok(Some(Err(error))) => {
                    warn!(event_name = "queue.task_panicked", error = %error, "queued task failed");
                }
                Ok(None) => return,
                Err(_) => {
                    warn!(
                        event_name = "queue.drain_timeout",
                        remaining = tasks.len(),
                        "shutdown deadline reached with tasks still in flight"
                    );
                    tasks.abort_all();
                    return;
                }
            }
        }
    }
}
