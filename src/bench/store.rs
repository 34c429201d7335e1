//! Append-only benchmark log.
//!
//! One line per process run:
//!
//! ```text
//! 2025-01-31 14:02:11 | mandelbrot-scalar | medium | avg_compute_time=1.2345s
//! ```

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime, Timelike};

use crate::error::{LogCorruption, StoreError};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Written in place of a timestamp that could not be read back.
const UNKNOWN_TIMESTAMP: &str = "-";

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRecord {
    /// `None` when the line's first field was not a readable timestamp; the
    /// timing itself is still counted.
    pub timestamp: Option<NaiveDateTime>,
    pub script: String,
    pub preset: String,
    pub avg_elapsed_seconds: f64,
}

impl BenchmarkRecord {
    /// Record stamped with the current local time, truncated to seconds.
    pub fn now(script: impl Into<String>, preset: impl Into<String>, avg: f64) -> Self {
        let now = Local::now().naive_local();
        let timestamp = now.with_nanosecond(0).unwrap_or(now);
        Self {
            timestamp: Some(timestamp),
            script: script.into(),
            preset: preset.into(),
            avg_elapsed_seconds: avg,
        }
    }

    /// Rejects a script or preset name that would not survive a round trip
    /// through one log line.
    pub fn check_field(field: &'static str, value: &str) -> Result<(), StoreError> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed != value || value.contains(['|', '\n', '\r']) {
            return Err(StoreError::InvalidField {
                field,
                value: value.to_string(),
            });
        }
        Ok(())
    }

    /// The log line, without the trailing newline.
    pub fn to_line(&self) -> String {
        let timestamp = match self.timestamp {
            Some(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
            None => UNKNOWN_TIMESTAMP.to_string(),
        };
        format!(
            "{timestamp} | {} | {} | avg_compute_time={:.4}s",
            self.script,
            self.preset,
            self.avg_elapsed_seconds
        )
    }

    pub fn parse_line(line: &str) -> Result<Self, LogCorruption> {
        let fields: Vec<&str> = line.trim().split('|').map(str::trim).collect();
        let &[timestamp, script, preset, time] = &fields[..] else {
            return Err(LogCorruption::FieldCount(fields.len()));
        };

        let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok();

        let value = time.rsplit('=').next().unwrap_or(time);
        let value = value.strip_suffix('s').unwrap_or(value);
        let avg_elapsed_seconds = value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| LogCorruption::Elapsed(time.to_string()))?;

        Ok(Self {
            timestamp,
            script: script.to_string(),
            preset: preset.to_string(),
            avg_elapsed_seconds,
        })
    }
}

/// File-backed store. Holds only the path; every operation reopens the file.
#[derive(Debug, Clone)]
pub struct LogStore {
    path: PathBuf,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Appends one line and forces it to storage before returning.
    ///
    /// The line goes out in a single write on an append-mode handle. There is
    /// no cross-process lock; concurrent writers can still interleave.
    pub fn append(&self, record: &BenchmarkRecord) -> Result<(), StoreError> {
        BenchmarkRecord::check_field("script", &record.script)?;
        BenchmarkRecord::check_field("preset", &record.preset)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        let line = format!("{}\n", record.to_line());
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_all())
            .map_err(|e| self.io_error(e))?;
        log::info!("Appended to {}: {}", self.path.display(), record.to_line());
        Ok(())
    }

    /// Every well-formed record in file order. Malformed lines are skipped;
    /// a missing file reads as empty.
    pub fn load_all(&self) -> Result<Vec<BenchmarkRecord>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        let text = String::from_utf8_lossy(&bytes);

        let mut records = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match BenchmarkRecord::parse_line(line) {
                Ok(record) => records.push(record),
                Err(e) => log::debug!("{}:{}: skipped ({e})", self.path.display(), lineno + 1),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(script: &str, preset: &str, avg: f64) -> BenchmarkRecord {
        BenchmarkRecord {
            timestamp: NaiveDateTime::parse_from_str("2024-05-01 12:00:00", TIMESTAMP_FORMAT).ok(),
            script: script.into(),
            preset: preset.into(),
            avg_elapsed_seconds: avg,
        }
    }

    #[test]
    fn test_line_format() {
        assert_eq!(
            record("mandelbrot-scalar", "easy", 1.23456).to_line(),
            "2024-05-01 12:00:00 | mandelbrot-scalar | easy | avg_compute_time=1.2346s"
        );
    }

    #[test]
    fn test_parse_line() {
        let line = "2024-05-01 12:00:00 | run.py | hard | avg_compute_time=0.5000s\n";
        let parsed = BenchmarkRecord::parse_line(line).unwrap();
        assert_eq!(parsed, record("run.py", "hard", 0.5));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert_eq!(
            BenchmarkRecord::parse_line("2024-05-01 12:00:00 | run.py"),
            Err(LogCorruption::FieldCount(2))
        );
        assert!(matches!(
            BenchmarkRecord::parse_line("2024-05-01 12:00:00 | a | easy | avg_compute_time=fast"),
            Err(LogCorruption::Elapsed(_))
        ));
        assert!(matches!(
            BenchmarkRecord::parse_line("2024-05-01 12:00:00 | a | easy | avg_compute_time=NaNs"),
            Err(LogCorruption::Elapsed(_))
        ));
    }

    #[test]
    fn test_unreadable_timestamp_keeps_timing() {
        let parsed =
            BenchmarkRecord::parse_line("yesterday | a | easy | avg_compute_time=1.5s").unwrap();
        assert_eq!(parsed.timestamp, None);
        assert_eq!(parsed.script, "a");
        assert_eq!(parsed.avg_elapsed_seconds, 1.5);
        assert!(parsed.to_line().starts_with("- | a | easy |"));
    }

    #[test]
    fn test_line_round_trip() {
        for r in [
            record("mandelbrot-multiprocess", "hard", 12.5),
            record("my script.py", "custom", 0.0625),
            BenchmarkRecord {
                timestamp: None,
                ..record("a", "easy", 3.0)
            },
        ] {
            assert_eq!(BenchmarkRecord::parse_line(&r.to_line()), Ok(r));
        }
    }

    #[test]
    fn test_check_field_rejects_delimiters() {
        for bad in ["a|b", "a\nb", "a\rb", "", "  ", " padded"] {
            assert!(
                matches!(
                    BenchmarkRecord::check_field("script", bad),
                    Err(StoreError::InvalidField { field: "script", .. })
                ),
                "{bad:?}"
            );
        }
        assert!(BenchmarkRecord::check_field("script", "mandelbrot-scalar").is_ok());
        assert!(BenchmarkRecord::check_field("script", "my script.py").is_ok());
    }

    #[test]
    fn test_append_refuses_unreadable_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path().join("mandelbrot.log"));
        assert!(matches!(
            store.append(&record("a|b", "easy", 1.0)),
            Err(StoreError::InvalidField { .. })
        ));
        assert!(!store.exists());
    }

    #[test]
    fn test_load_all_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mandelbrot.log");
        fs::write(
            &path,
            "2024-05-01 12:00:00 | a | easy | avg_compute_time=1.0000s\n2024-05-01 12:00:01 | b\n",
        )
        .unwrap();

        let records = LogStore::new(&path).load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].script, "a");
    }

    #[test]
    fn test_load_all_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path().join("absent.log"));
        assert!(!store.exists());
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_append_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path().join("mandelbrot.log"));
        store.append(&record("a", "easy", 1.0)).unwrap();
        store.append(&record("b", "medium", 2.5)).unwrap();

        let records = store.load_all().unwrap();
        assert_eq!(records, vec![record("a", "easy", 1.0), record("b", "medium", 2.5)]);
    }

    #[test]
    fn test_append_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path().join("no-such-dir").join("mandelbrot.log"));
        assert!(matches!(
            store.append(&record("a", "easy", 1.0)),
            Err(StoreError::Io { .. })
        ));
    }
}
