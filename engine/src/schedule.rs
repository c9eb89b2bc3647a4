//! Cancellable delayed and repeating tasks on the tokio runtime.

use std::time::Duration;

use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};

/// Owns every task it spawned. Dropping the schedule cancels them all.
#[derive(Default)]
pub(crate) struct Schedule {
    tasks: Vec<JoinHandle<()>>,
}

impl Schedule {
    /// Run `task` once after `delay`.
    pub(crate) fn once<F>(&mut self, delay: Duration, task: F) -> AbortHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            task();
        });
        self.track(handle)
    }

    /// Run `task` every `period`, first after one full period.
    pub(crate) fn repeating<F>(&mut self, period: Duration, mut task: F) -> AbortHandle
    where
        F: FnMut() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                task();
            }
        });
        self.track(handle)
    }

    pub(crate) fn cancel_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Tasks that have neither finished nor been cancelled.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }

    fn track(&mut self, handle: JoinHandle<()>) -> AbortHandle {
        self.tasks.retain(|task| !task.is_finished());
        let abort = handle.abort_handle();
        self.tasks.push(handle);
        abort
    }
}

impl Drop for Schedule {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
