//! mandelbench: Mandelbrot escape-time grids computed by interchangeable
//! backends, plus a durable benchmark log and its aggregation.
//!
//! - [`backend`]: scalar, vectorized (ndarray), multi-process, GPU (wgpu,
//!   `gpu` feature) and C-ABI native backends behind one [`Backend`] value
//! - [`viewport`]: plane geometry and the drag/click selection transforms
//! - [`bench`]: scoped timers, the append-only log, ranking and reports
//! - [`config`]: presets and settings loaded from TOML or JSON

pub mod backend;
pub mod bench;
pub mod config;
pub mod error;
pub mod grid;
pub mod ipc;
pub mod viewport;

pub use backend::{Backend, BackendKind, BackendOptions, ComputeOutput};
pub use bench::{aggregate, BenchSession, BenchmarkRecord, BenchmarkSummary, LogStore};
pub use config::{Preset, PresetConfig, Settings};
pub use error::{ComputeError, ConfigError, LogCorruption, StoreError};
pub use grid::IterationGrid;
pub use viewport::{default_view, from_selection, PlanePoint, Viewport};
