use std::time::Duration;

use tokio::{sync::mpsc::Sender, task::JoinHandle};

/// A pending one-shot timer. Dropping or cancelling it aborts the delivery.
///
/// Timers run as local tasks, so they must be scheduled from within a
/// [`tokio::task::LocalSet`].
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Same as dropping the handle.
    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Delivers `event` on `sender` after `delay`.
pub fn schedule<E>(delay: Duration, sender: &Sender<E>, event: E) -> TimerHandle
where
    E: 'static,
{
    let sender = sender.clone();
    let task = tokio::task::spawn_local(async move {
        tokio::time::sleep(delay).await;
        if sender.send(event).await.is_err() {
            tracing::trace!("Timer fired after the receiver was dropped");
        }
    });

    TimerHandle { task }
}
