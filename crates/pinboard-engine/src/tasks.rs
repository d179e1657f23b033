// Imports
use std::sync::mpsc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("the background worker thread is gone")]
    WorkerGone,
}

/// Runs a fixed task once after a quiet period, on a background thread.
///
/// Arming starts the quiet period; arming again before it elapses restarts it, so a burst
/// of [Debouncer::arm] calls collapses into a single run. This is what makes the debounced
/// persists (viewport after zoom/pan, surface resize) idempotent under event streams.
/// The worker survives across runs and ends when the handle is dropped; a pending quiet
/// period is cancelled with it.
#[derive(Debug)]
pub struct Debouncer {
    arm_tx: mpsc::Sender<()>,
}

impl Debouncer {
    pub fn new<F>(task: F, delay: Duration) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (arm_tx, arm_rx) = mpsc::channel::<()>();
        std::thread::spawn(move || {
            loop {
                // Parked until armed for the first time.
                if arm_rx.recv().is_err() {
                    break;
                }
                // Armed. Every further arm restarts the quiet period.
                loop {
                    match arm_rx.recv_timeout(delay) {
                        Ok(()) => continue,
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            task();
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Disconnected) => return,
                    }
                }
            }
        });

        Self { arm_tx }
    }

    /// Start or restart the quiet period.
    pub fn arm(&self) -> Result<(), ScheduleError> {
        self.arm_tx.send(()).map_err(|_| ScheduleError::WorkerGone)
    }
}

/// Outcome of one poll round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Continue,
    Stop,
}

/// Calls a task on a fixed interval, on a background thread.
///
/// Used for the 1 Hz device scale-factor poll. Polling ends when the task returns
/// [PollOutcome::Stop], when [Poller::stop] is called, or when the handle is dropped.
#[derive(Debug)]
pub struct Poller {
    stop_tx: mpsc::Sender<()>,
}

impl Poller {
    pub fn new<F>(task: F, interval: Duration) -> Self
    where
        F: Fn() -> PollOutcome + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if task() == PollOutcome::Stop {
                        break;
                    }
                }
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        });

        Self { stop_tx }
    }

    /// Stop polling before the handle is dropped.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn debouncer_collapses_bursts_into_one_run() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_in_task = Arc::clone(&runs);
        let debouncer = Debouncer::new(
            move || {
                runs_in_task.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(20),
        );

        for _ in 0..5 {
            debouncer.arm().unwrap();
        }
        thread::sleep(Duration::from_millis(200));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // The worker survives the first run and can be armed again.
        debouncer.arm().unwrap();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn poller_honors_stop_outcome() {
        let rounds = Arc::new(AtomicUsize::new(0));
        let rounds_in_task = Arc::clone(&rounds);
        let poller = Poller::new(
            move || {
                rounds_in_task.fetch_add(1, Ordering::SeqCst);
                PollOutcome::Stop
            },
            Duration::from_millis(10),
        );

        thread::sleep(Duration::from_millis(200));
        assert_eq!(rounds.load(Ordering::SeqCst), 1);
        // Stopping an already-finished worker is a no-op.
        poller.stop();
    }
}
