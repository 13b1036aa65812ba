//! Periodic tick scheduling.
//!
//! A [`Ticker`] runs a task once per fixed period until the returned
//! [`TickHandle`] is cancelled. The tracker owns at most one live handle and
//! cancels it on every status change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Work run on every tick.
pub type TickTask = Arc<dyn Fn() + Send + Sync>;

/// Cancellation handle for a scheduled task.
#[derive(Debug, Clone, Default)]
pub struct TickHandle {
    cancelled: Arc<AtomicBool>,
}

impl TickHandle {
    /// Creates a live handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops further ticks. A tick already in progress runs to completion.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) was called on this handle or a clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Something that can run a task periodically.
pub trait Ticker: Send + Sync {
    /// Runs `task` every `period` until the returned handle is cancelled.
    fn schedule(&self, period: Duration, task: TickTask) -> TickHandle;
}

/// Ticker backed by one sleeping thread per schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadTicker;

impl Ticker for ThreadTicker {
    fn schedule(&self, period: Duration, task: TickTask) -> TickHandle {
        let handle = TickHandle::new();
        let thread_handle = handle.clone();

        let spawned = thread::Builder::new()
            .name("wt-ticker".to_string())
            .spawn(move || {
                loop {
                    thread::sleep(period);
                    if thread_handle.is_cancelled() {
                        break;
                    }
                    task();
                }
            });

        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to spawn ticker thread");
            handle.cancel();
        }

        handle
    }
}

/// Ticker that only fires when a test calls [`fire`](Self::fire).
#[derive(Clone, Default)]
pub struct ManualTicker {
    scheduled: Arc<Mutex<Vec<(TickHandle, Duration, TickTask)>>>,
}

impl ManualTicker {
    /// Creates a ticker with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every live task once and returns how many ran.
    ///
    /// Tasks are run without holding the internal lock, so a task may
    /// schedule or cancel others.
    pub fn fire(&self) -> usize {
        let live: Vec<(TickHandle, TickTask)> = {
            let mut scheduled = self
                .scheduled
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            scheduled.retain(|(handle, _, _)| !handle.is_cancelled());
            scheduled
                .iter()
                .map(|(handle, _, task)| (handle.clone(), Arc::clone(task)))
                .collect()
        };

        let mut ran = 0;
        for (handle, task) in live {
            if !handle.is_cancelled() {
                task();
                ran += 1;
            }
        }
        ran
    }

    /// Number of schedules that have not been cancelled.
    pub fn live_count(&self) -> usize {
        self.scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(handle, _, _)| !handle.is_cancelled())
            .count()
    }

    /// Period of the most recent live schedule, if any.
    pub fn live_period(&self) -> Option<Duration> {
        self.scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(handle, _, _)| !handle.is_cancelled())
            .map(|(_, period, _)| *period)
    }
}

impl Ticker for ManualTicker {
    fn schedule(&self, period: Duration, task: TickTask) -> TickHandle {
        let handle = TickHandle::new();
        self.scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((handle.clone(), period, task));
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_task() -> (Arc<AtomicUsize>, TickTask) {
        let count = Arc::new(AtomicUsize::new(0));
        let task_count = Arc::clone(&count);
        let task: TickTask = Arc::new(move || {
            task_count.fetch_add(1, Ordering::SeqCst);
        });
        (count, task)
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let handle = TickHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn manual_ticker_skips_cancelled_tasks() {
        let ticker = ManualTicker::new();
        let (count, task) = counting_task();
        let handle = ticker.schedule(Duration::from_secs(1), task);

        assert_eq!(ticker.fire(), 1);
        assert_eq!(ticker.live_period(), Some(Duration::from_secs(1)));
        handle.cancel();
        assert_eq!(ticker.fire(), 0);
        assert_eq!(ticker.live_count(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn thread_ticker_runs_until_cancelled() {
        let (count, task) = counting_task();
        let handle = ThreadTicker.schedule(Duration::from_millis(5), task);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        handle.cancel();
        assert!(count.load(Ordering::SeqCst) >= 3);

        // One in-flight tick may still land after cancel.
        thread::sleep(Duration::from_millis(30));
        let settled = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), settled);
    }
}
