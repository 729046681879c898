//! Single-concurrency task runner.
//!
//! All lookup-service traffic in the process funnels through one of
//! these: a FIFO of boxed async tasks drained by a single worker that
//! sleeps a fixed delay between tasks. Submitters get a oneshot
//! receiver that resolves when their task finishes, or with an error
//! when the task is discarded by `clear()`.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Pause between consecutive tasks
pub const INTER_TASK_DELAY: Duration = Duration::from_millis(250);

pub struct TaskRunner {
    queue: Mutex<VecDeque<(Task, oneshot::Sender<()>)>>,
    wake: Notify,
    delay: Duration,
}

impl TaskRunner {
    /// Create a runner and spawn its worker loop
    pub fn start(delay: Duration) -> Arc<Self> {
        let runner = Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            delay,
        });
        tokio::spawn(Arc::clone(&runner).worker_loop());
        runner
    }

    /// Append a task. The receiver resolves with `Ok(())` on
    /// completion or `Err` if the task was cleared before running.
    pub fn submit<F>(&self, task: F) -> oneshot::Receiver<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back((Box::pin(task), tx));
        self.wake.notify_one();
        rx
    }

    /// Discard all queued tasks. The in-flight task, if any, runs to
    /// completion; dropped senders unblock their submitters.
    pub fn clear(&self) {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            let next = self
                .queue
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();

            match next {
                Some((task, done)) => {
                    task.await;
                    // Submitter may have stopped listening
                    let _ = done.send(());
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
                None => self.wake.notified().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_tasks_run_in_order() {
        let runner = TaskRunner::start(Duration::ZERO);
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut receivers = Vec::new();
        for i in 0..4 {
            let log = Arc::clone(&log);
            receivers.push(runner.submit(async move {
                log.lock().unwrap().push(i);
            }));
        }
        for rx in receivers {
            rx.await.unwrap();
        }

        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_single_concurrency() {
        let runner = TaskRunner::start(Duration::ZERO);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut receivers = Vec::new();
        for _ in 0..8 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            receivers.push(runner.submit(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for rx in receivers {
            rx.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_discards_queued() {
        // Long delay keeps everything after the first task queued
        let runner = TaskRunner::start(Duration::from_secs(60));

        let first = runner.submit(async {});
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        let second = runner.submit(async move {
            ran2.fetch_add(1, Ordering::SeqCst);
        });

        first.await.unwrap();
        runner.clear();

        assert!(second.await.is_err());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
