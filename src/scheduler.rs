//! Deferred task scheduling for the cosmetic delayed follow-up message. The
//! trait seam exists so flow tests can observe scheduled work without real
//! time passing.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub type DeferredTask = Pin<Box<dyn Future<Output = ()> + Send>>;

pub trait Scheduler: Send + Sync {
    /// Queues a task to run after `delay`, detached from the caller's
    /// lifetime. Never blocks the caller.
    fn schedule(&self, delay: Duration, task: DeferredTask);
}

pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: DeferredTask) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_runs_the_task_after_the_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        TokioScheduler.schedule(
            Duration::from_secs(4),
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
            }),
        );

        // No time has passed yet, only control.
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));

        // Paused clock: this auto-advances past the task's deadline.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(fired.load(Ordering::SeqCst));
    }
}
