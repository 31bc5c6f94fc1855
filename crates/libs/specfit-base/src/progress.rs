//! Progress reporting.
//!
//! Reporting is observational only: no fitting result depends on whether a
//! monitor is attached or on what it does with the notifications.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Receiver of progress notifications emitted by the fitting pipeline.
///
/// Every method has an empty default implementation so that a monitor only
/// needs to implement the notifications it cares about. Methods may be
/// called from worker threads.
pub trait ProgressMonitor: Sync {
    /// A new stage started.
    fn set_stage(&self, _stage: usize, _name: &str) {}

    /// Sets the maximum progress value of the current stage.
    fn set_max_progress(&self, _max: f64) {}

    /// Reports the progress of the current stage.
    fn set_progress(&self, _progress: f64, _message: &str) {}

    /// The whole process has finished.
    fn complete(&self) {}
}

/// Progress monitor ignoring all notifications.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoProgress;

impl ProgressMonitor for NoProgress {}

/// Progress monitor forwarding notifications to the logger.
#[derive(Debug, Default, Copy, Clone)]
pub struct LogProgress;

impl ProgressMonitor for LogProgress {
    fn set_stage(&self, stage: usize, name: &str) { log::info!("[Stage {}] {}", stage, name); }

    fn set_progress(&self, progress: f64, message: &str) {
        log::debug!("  - {:.0}: {}", progress, message);
    }

    fn complete(&self) { log::info!("Fitting complete."); }
}

/// Thread-safe counter of completed work items (views, blocks) forwarding
/// every increment to a monitor.
pub struct ProgressCounter<'a> {
    count: AtomicUsize,
    total: usize,
    monitor: &'a dyn ProgressMonitor,
}

impl<'a> ProgressCounter<'a> {
    /// Creates a counter for `total` items and announces the maximum to the
    /// monitor.
    pub fn new(total: usize, monitor: &'a dyn ProgressMonitor) -> Self {
        monitor.set_max_progress(total as f64);
        Self {
            count: AtomicUsize::new(0),
            total,
            monitor,
        }
    }

    /// Marks one more item as done and returns the number of finished items.
    pub fn increment(&self, message: &str) -> usize {
        let done = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        self.monitor.set_progress(done as f64, message);
        done
    }

    /// Number of items finished so far.
    pub fn count(&self) -> usize { self.count.load(Ordering::Relaxed) }

    /// Total number of items.
    pub fn total(&self) -> usize { self.total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        max: Mutex<f64>,
        last: Mutex<f64>,
    }

    impl ProgressMonitor for Recorder {
        fn set_max_progress(&self, max: f64) { *self.max.lock().unwrap() = max; }

        fn set_progress(&self, progress: f64, _message: &str) {
            let mut last = self.last.lock().unwrap();
            *last = last.max(progress);
        }
    }

    #[test]
    fn test_progress_counter_parallel() {
        let recorder = Recorder::default();
        let counter = ProgressCounter::new(64, &recorder);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..16 {
                        counter.increment("item");
                    }
                });
            }
        });
        assert_eq!(counter.count(), 64);
        assert_eq!(*recorder.max.lock().unwrap(), 64.0);
        assert_eq!(*recorder.last.lock().unwrap(), 64.0);
    }
}
