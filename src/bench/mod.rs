//! Timing capture, the durable benchmark log and offline aggregation.

mod aggregate;
mod session;
mod store;
mod timer;

pub use aggregate::{aggregate, render_report, BenchmarkSummary, PresetRanking, RankedScript};
pub use session::BenchSession;
pub use store::{BenchmarkRecord, LogStore, TIMESTAMP_FORMAT};
pub use timer::{ScopedTimer, Timing, TimingLog};
