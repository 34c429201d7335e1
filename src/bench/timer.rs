use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// One completed measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    pub label: String,
    pub elapsed: Duration,
}

/// In-memory list of every measurement taken by one process.
#[derive(Debug, Default)]
pub struct TimingLog {
    entries: Mutex<Vec<Timing>>,
}

impl TimingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a measurement. The elapsed time is recorded when the returned
    /// guard is dropped, whichever way the enclosing scope is left.
    pub fn measure(&self, label: impl Into<String>) -> ScopedTimer<'_> {
        let label = label.into();
        log::info!("[..] {label}");
        ScopedTimer {
            log: self,
            label,
            start: Instant::now(),
        }
    }

    pub fn record(&self, timing: Timing) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(timing);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Timing> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Arithmetic mean in seconds, `None` when nothing was measured.
    pub fn mean_seconds(&self) -> Option<f64> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.is_empty() {
            return None;
        }
        let total: f64 = entries.iter().map(|t| t.elapsed.as_secs_f64()).sum();
        Some(total / entries.len() as f64)
    }
}

/// Guard returned by [`TimingLog::measure`].
#[must_use = "the measurement ends when the guard is dropped"]
pub struct ScopedTimer<'a> {
    log: &'a TimingLog,
    label: String,
    start: Instant,
}

impl ScopedTimer<'_> {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        log::info!("[ok] {} ({:.3}s)", self.label, elapsed.as_secs_f64());
        self.log.record(Timing {
            label: std::mem::take(&mut self.label),
            elapsed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_records_on_drop() {
        let log = TimingLog::new();
        {
            let _t = log.measure("compute");
            assert!(log.is_empty());
        }
        let timings = log.snapshot();
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].label, "compute");
    }

    #[test]
    fn test_guard_records_on_early_error() {
        fn failing(log: &TimingLog) -> Result<(), String> {
            let _t = log.measure("fails");
            Err("boom".into())
        }

        let log = TimingLog::new();
        assert!(failing(&log).is_err());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_mean_seconds() {
        let log = TimingLog::new();
        assert_eq!(log.mean_seconds(), None);
        log.record(Timing {
            label: "a".into(),
            elapsed: Duration::from_millis(1000),
        });
        log.record(Timing {
            label: "b".into(),
            elapsed: Duration::from_millis(3000),
        });
        let mean = log.mean_seconds().unwrap();
        assert!((mean - 2.0).abs() < 1e-9);
    }
}
