//! Cancellable periodic tasks
//!
//! A [`PeriodicTask`] runs a closure on a named thread: once immediately,
//! then after every interval until the closure breaks or the task is
//! cancelled. Cancellation disconnects a channel the thread sleeps on, so a
//! waiting task wakes up at once instead of finishing its interval.

use crossbeam_channel::{RecvTimeoutError, Sender};
use std::io;
use std::ops::ControlFlow;
use std::time::Duration;

/// Handle to a running periodic task
pub struct PeriodicTask {
    name: String,
    cancel: Option<Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn a task calling `tick` every `interval`
    ///
    /// The first tick runs immediately. Returning [`ControlFlow::Break`]
    /// from `tick` ends the task.
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                if tick().is_break() {
                    break;
                }
                match cancel_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    // Disconnected (cancelled) or an explicit wake-up
                    _ => break,
                }
            })?;

        tracing::debug!(task = name, ?interval, "Periodic task started");

        Ok(Self {
            name: name.to_string(),
            cancel: Some(cancel_tx),
            thread: Some(thread),
        })
    }

    /// Stop the task
    ///
    /// Waits for a tick in progress to finish, so no tick runs after this
    /// returns. Called from the task's own thread it only signals the stop.
    pub fn cancel(&mut self) {
        drop(self.cancel.take());
        if let Some(h) = self.thread.take() {
            if h.thread().id() != std::thread::current().id() {
                let _ = h.join();
            }
            tracing::debug!(task = %self.name, "Periodic task cancelled");
        }
    }

    /// Whether the task thread is still running
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
