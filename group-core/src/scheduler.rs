// group-core/src/scheduler.rs

//! Cancellable repeating background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Handle to a task started by [`schedule_repeating`].
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct TaskHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Stops the task. Returns false if it was already cancelled.
    ///
    /// A tick that is already running finishes; no new tick starts.
    pub fn cancel(&mut self) -> bool {
        let was_active = !*self.shutdown.borrow();
        self.shutdown.send_replace(true);
        self.task.take();
        was_active
    }

    pub fn is_active(&self) -> bool {
        !*self.shutdown.borrow()
            && self
                .task
                .as_ref()
                .map(|task| !task.is_finished())
                .unwrap_or(false)
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs `tick` every `interval`, starting one interval from now.
///
/// Ticks never overlap: a slow tick delays the next one rather than
/// bunching missed ticks together.
pub fn schedule_repeating<F, Fut>(interval: Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (shutdown, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stopped.changed() => {
                    if *stopped.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    tick().await;
                }
            }
        }
    });

    TaskHandle {
        shutdown,
        task: Some(task),
    }
}
