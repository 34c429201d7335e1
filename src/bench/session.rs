use crate::error::StoreError;

use super::store::{BenchmarkRecord, LogStore};
use super::timer::{ScopedTimer, TimingLog};

/// One benchmark run of one script under one preset.
///
/// Call [`BenchSession::shutdown`] before the process exits; a session that
/// is only dropped never writes its record.
pub struct BenchSession {
    script: String,
    preset: String,
    timings: TimingLog,
    store: LogStore,
    closed: bool,
}

impl BenchSession {
    /// Fails up front when `script` or `preset` could not be written as one
    /// readable log line.
    pub fn open(
        script: impl Into<String>,
        preset: impl Into<String>,
        store: LogStore,
    ) -> Result<Self, StoreError> {
        let script = script.into();
        let preset = preset.into();
        BenchmarkRecord::check_field("script", &script)?;
        BenchmarkRecord::check_field("preset", &preset)?;

        let session = Self {
            script,
            preset,
            timings: TimingLog::new(),
            store,
            closed: false,
        };
        for line in session.header() {
            log::info!("{line}");
        }
        Ok(session)
    }

    fn header(&self) -> [String; 4] {
        let bar = "=".repeat(self.script.len() + 18);
        [
            bar.clone(),
            format!("  Mandelbrot Runner: {}  ", self.script),
            format!("  Config Preset: {}  ", self.preset),
            bar,
        ]
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn preset(&self) -> &str {
        &self.preset
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn timings(&self) -> &TimingLog {
        &self.timings
    }

    pub fn measure(&self, label: impl Into<String>) -> ScopedTimer<'_> {
        self.timings.measure(label)
    }

    /// Appends the mean of every measurement as one record and returns it.
    /// Nothing is written when no measurement was taken.
    pub fn shutdown(mut self) -> Result<Option<BenchmarkRecord>, StoreError> {
        self.closed = true;
        let Some(avg) = self.timings.mean_seconds() else {
            log::info!("No timings recorded for {}; nothing appended", self.script);
            return Ok(None);
        };
        let record = BenchmarkRecord::now(self.script.as_str(), self.preset.as_str(), avg);
        self.store.append(&record)?;
        Ok(Some(record))
    }
}

impl Drop for BenchSession {
    fn drop(&mut self) {
        if !self.closed && !self.timings.is_empty() {
            log::warn!(
                "{} dropped without shutdown; {} timing(s) not written to {}",
                self.script,
                self.timings.len(),
                self.store.path().display()
            );
        }
    }
}
