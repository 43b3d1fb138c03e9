//! Named background loops with a shared stop signal.
//!
//! Loops receive a [`ShutdownSignal`] and are expected to return once it
//! fires, after finishing the iteration they are in. `shutdown` waits for
//! them up to a grace period and aborts whatever is still running.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// Resolves once shutdown has been requested. Cancel-safe.
    pub async fn stopped(&mut self) {
        while !*self.0.borrow() {
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }
}

pub struct BackgroundTasks {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            tasks: Vec::new(),
            shutdown_tx,
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal(self.shutdown_tx.subscribe())
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        tracing::info!(task = name, "Spawned background task");
        self.tasks.push((name, handle));
    }

    /// Names of tasks that have not finished.
    pub fn running(&self) -> Vec<&'static str> {
        self.tasks
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(name, _)| *name)
            .collect()
    }

    pub async fn shutdown(&mut self, grace: Duration) {
        tracing::info!(task_count = self.tasks.len(), "Stopping background tasks");
        let _ = self.shutdown_tx.send(true);

        let deadline = tokio::time::Instant::now() + grace;
        for (name, mut handle) in self.tasks.drain(..) {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, &mut handle).await {
                Ok(Ok(())) => tracing::debug!(task = name, "Task stopped"),
                Ok(Err(e)) => tracing::warn!(task = name, error = %e, "Task failed during shutdown"),
                Err(_) => {
                    tracing::warn!(task = name, "Task did not stop within grace period, aborting");
                    handle.abort();
                }
            }
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for (_, handle) in &self.tasks {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cooperative_tasks_stop_on_signal() {
        let mut tasks = BackgroundTasks::new();
        let mut signal = tasks.signal();
        tasks.spawn("loop", async move {
            loop {
                tokio::select! {
                    _ = signal.stopped() => break,
                    _ = tokio::time::sleep(Duration::from_millis(5)) => {}
                }
            }
        });
        assert_eq!(tasks.running(), vec!["loop"]);
        tasks.shutdown(Duration::from_secs(1)).await;
        assert!(tasks.running().is_empty());
        assert!(tasks.signal().is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_tasks_are_aborted_after_grace() {
        let mut tasks = BackgroundTasks::new();
        tasks.spawn("stuck", std::future::pending::<()>());
        let started = tokio::time::Instant::now();
        tasks.shutdown(Duration::from_millis(200)).await;
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(tasks.running().is_empty());
    }
}
