use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Fixed-delay driver for the check cycle.
///
/// At most one cycle is ever in flight: the loop runs a cycle to
/// completion, then sleeps, then runs the next. `stop` cancels a pending
/// sleep but never interrupts a running cycle; awaiting it gives callers a
/// clean point to tear down shared resources behind the cycle. A panic
/// inside a cycle is contained to that round: the loop logs it and stays
/// on schedule.
pub struct SchedulerLoop {
    state: Mutex<Option<RunningLoop>>,
}

struct RunningLoop {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SchedulerLoop {
    /// Create a stopped scheduler.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Whether the loop is currently running.
    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }

    /// Start the loop: run one cycle immediately, then one per delay.
    ///
    /// Returns `false` without side effects if the loop is already running.
    /// Restarting after a stop is allowed once `stop` has resolved.
    pub fn start<F, Fut>(&self, delay: Duration, cycle: F) -> bool
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock().unwrap();
        if state.is_some() {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            loop {
                // Each cycle runs on its own task: a panic inside it kills
                // that round, not the loop.
                if let Err(e) = tokio::spawn(cycle()).await {
                    tracing::error!(error = %e, "Check cycle panicked");
                }

                // A stop requested while the cycle ran wins over the sleep.
                if *shutdown_rx.borrow() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => {}
                }
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            tracing::debug!("Watchdog loop exited");
        });

        *state = Some(RunningLoop { shutdown_tx, handle });
        true
    }

    /// Stop the loop and wait for any in-flight cycle to finish.
    ///
    /// Resolves immediately when nothing is running. A panic inside the
    /// loop task is logged, never propagated.
    pub async fn stop(&self) {
        let running = match self.state.lock().unwrap().take() {
            Some(running) => running,
            None => return,
        };

        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.handle.await {
            tracing::error!(error = %e, "Watchdog loop task failed");
        }
    }
}

impl Default for SchedulerLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SchedulerLoop {
    fn drop(&mut self) {
        // An abandoned handle must not leave the loop spinning; the task
        // winds down on its own after any in-flight cycle.
        if let Some(running) = self.state.lock().unwrap().take() {
            let _ = running.shutdown_tx.send(true);
        }
    }
}
