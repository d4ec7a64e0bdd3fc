use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A pending delayed task. Cancelling before the delay elapses means the
/// task never runs.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn cancel(self) {
        self.task.abort();
    }
}

pub fn schedule<F>(delay: Duration, task: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    TimerHandle {
        task: tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }),
    }
}

/// Only the last trigger within `delay` fires.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<TimerHandle>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn trigger<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.pending = Some(schedule(self.delay, task));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.cancel();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
