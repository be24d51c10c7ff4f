//! Background task scheduler
//!
//! A process-wide owner for the background work the server runs: the
//! fixed-interval expiry sweep and the one-shot deferred teardowns for
//! guest accounts. Tasks are owned by the scheduler instead of being
//! ambient `tokio::spawn` calls, so shutdown is explicit and tests can
//! trigger the underlying functions directly without any timer running.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Owns all background tasks spawned by the application.
///
/// Dropping or calling [`Scheduler::shutdown`] aborts everything that is
/// still running. One-shot tasks are fire-and-forget: they may race with
/// the sweep or an explicit logout, which is safe because every teardown
/// path is idempotent.
pub struct Scheduler {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a recurring task. The closure builds one tick's future; ticks
    /// never overlap because the next one starts only after the previous
    /// finished.
    pub fn spawn_interval<F, Fut>(&self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick of tokio's interval fires immediately; skip it
            // so startup work is scheduled explicitly by the caller.
            interval.tick().await;
            loop {
                interval.tick().await;
                tracing::debug!("Running scheduled task: {}", name);
                tick().await;
            }
        });
        self.track(handle);
    }

    /// Spawn a one-shot task that fires after `delay`
    pub fn spawn_once<Fut>(&self, name: &'static str, delay: Duration, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::debug!("Running deferred task: {}", name);
            task.await;
        });
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        // Opportunistically drop finished handles so the vector stays small
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of tasks that have been spawned and not yet finished
    pub fn active_tasks(&self) -> usize {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.len()
    }

    /// Abort all running tasks
    pub fn shutdown(&self) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for handle in handles.drain(..) {
            handle.abort();
        }
        tracing::info!("Scheduler shut down");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for handle in handles.drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_spawn_once_fires() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));

        let c = counter.clone();
        scheduler.spawn_once("test-once", Duration::from_millis(10), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_interval_repeats() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));

        let c = counter.clone();
        scheduler.spawn_interval("test-interval", Duration::from_millis(20), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_tasks() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));

        let c = counter.clone();
        scheduler.spawn_once("never-fires", Duration::from_secs(3600), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(scheduler.active_tasks(), 1);

        scheduler.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(scheduler.active_tasks(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
