//! Compute backends.
//!
//! Every backend turns a [`Viewport`] into an [`IterationGrid`] with the same
//! escape-time rule; they differ only in how the work is executed. The
//! backend is chosen once at startup through [`BackendKind`] and held as a
//! [`Backend`] value.

mod multiprocess;
mod native;
mod scalar;
mod vectorized;

#[cfg(feature = "gpu")]
mod gpu;

pub use multiprocess::{
    partition_rows, run_band_worker, Band, MultiProcessBackend, BAND_WORKER_FLAG,
};
pub use native::{native_escape_grid, NativeBackend, NativeRequest, NativeRoutine};
pub use scalar::ScalarBackend;
pub use vectorized::VectorizedBackend;

#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{error::ComputeError, grid::IterationGrid, viewport::Viewport};

/// Squared escape radius (`|z| > 2`).
pub const ESCAPE_RADIUS_SQ: f64 = 4.0;

/// Result of one compute call. Only the GPU backend fills `total_iterations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeOutput {
    pub grid: IterationGrid,
    pub total_iterations: Option<u64>,
}

impl ComputeOutput {
    pub fn grid_only(grid: IterationGrid) -> Self {
        Self {
            grid,
            total_iterations: None,
        }
    }
}

// ------------------------- Kernel -------------------------

/// One `z <- z^2 + c` step.
#[inline(always)]
pub(crate) fn step(zr: f64, zi: f64, cr: f64, ci: f64) -> (f64, f64) {
    let zr2 = zr * zr;
    let zi2 = zi * zi;
    (zr2 - zi2 + cr, 2.0 * zr * zi + ci)
}

#[inline(always)]
pub(crate) fn escaped(zr: f64, zi: f64) -> bool {
    zr * zr + zi * zi > ESCAPE_RADIUS_SQ
}

/// Completed iterations before `|z|` first exceeds 2, capped at `max_iter`.
#[inline]
pub fn escape_time(cr: f64, ci: f64, max_iter: u32) -> u32 {
    let (mut zr, mut zi) = (0.0f64, 0.0f64);
    for i in 0..max_iter {
        (zr, zi) = step(zr, zi, cr, ci);
        if escaped(zr, zi) {
            return i;
        }
    }
    max_iter
}

/// Fills `out` with the rows `row_start..` of `viewport`, one full row per
/// `width` cells.
pub(crate) fn fill_rows(viewport: &Viewport, row_start: u32, out: &mut [u32]) {
    let width = viewport.width() as usize;
    let max_iter = viewport.max_iter();
    for (offset, row) in out.chunks_mut(width).enumerate() {
        let y = row_start + offset as u32;
        for (x, cell) in row.iter_mut().enumerate() {
            let (cr, ci) = viewport.point(x as u32, y);
            *cell = escape_time(cr, ci, max_iter);
        }
    }
}

// ------------------------- Selection -------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Scalar,
    Vectorized,
    MultiProcess,
    Gpu,
    Native,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Scalar,
        BackendKind::Vectorized,
        BackendKind::MultiProcess,
        BackendKind::Gpu,
        BackendKind::Native,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BackendKind::Scalar => "Scalar",
            BackendKind::Vectorized => "Vectorized",
            BackendKind::MultiProcess => "Multi-process",
            BackendKind::Gpu => "GPU compute",
            BackendKind::Native => "External native",
        }
    }

    /// Name recorded as the `script` column of the benchmark log.
    pub fn script_name(&self) -> &'static str {
        match self {
            BackendKind::Scalar => "mandelbrot-scalar",
            BackendKind::Vectorized => "mandelbrot-vectorized",
            BackendKind::MultiProcess => "mandelbrot-multiprocess",
            BackendKind::Gpu => "mandelbrot-gpu",
            BackendKind::Native => "mandelbrot-native",
        }
    }

    /// Whether results are computed in float64 (bit-identical to Scalar).
    pub fn is_double_precision(&self) -> bool {
        !matches!(self, BackendKind::Gpu)
    }
}

/// Construction options that only some backends consume.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// Band worker count; `None` = cores - 1.
    pub workers: Option<usize>,
    /// Executable re-launched in worker mode; `None` = the current executable.
    pub worker_binary: Option<PathBuf>,
}

/// One constructed backend. Construction checks availability, so a value of
/// this type is always usable.
pub enum Backend {
    Scalar(ScalarBackend),
    Vectorized(VectorizedBackend),
    MultiProcess(MultiProcessBackend),
    #[cfg(feature = "gpu")]
    Gpu(GpuBackend),
    Native(NativeBackend),
}

impl Backend {
    pub fn build(kind: BackendKind, options: &BackendOptions) -> Result<Self, ComputeError> {
        match kind {
            BackendKind::Scalar => Ok(Self::scalar()),
            BackendKind::Vectorized => Ok(Self::vectorized()),
            BackendKind::MultiProcess => Self::multi_process(options),
            BackendKind::Gpu => Self::gpu(),
            BackendKind::Native => Ok(Self::native()),
        }
    }

    pub fn scalar() -> Self {
        Backend::Scalar(ScalarBackend)
    }

    pub fn vectorized() -> Self {
        Backend::Vectorized(VectorizedBackend)
    }

    pub fn multi_process(options: &BackendOptions) -> Result<Self, ComputeError> {
        let backend = match &options.worker_binary {
            Some(binary) => MultiProcessBackend::with_worker_binary(binary.clone())?,
            None => MultiProcessBackend::new()?,
        };
        let backend = match options.workers {
            Some(workers) => backend.with_workers(workers),
            None => backend,
        };
        Ok(Backend::MultiProcess(backend))
    }

    #[cfg(feature = "gpu")]
    pub fn gpu() -> Result<Self, ComputeError> {
        GpuBackend::new().map(Backend::Gpu)
    }

    #[cfg(not(feature = "gpu"))]
    pub fn gpu() -> Result<Self, ComputeError> {
        Err(ComputeError::BackendUnavailable(
            "built without the `gpu` feature".into(),
        ))
    }

    pub fn native() -> Self {
        Backend::Native(NativeBackend::bundled())
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Scalar(_) => BackendKind::Scalar,
            Backend::Vectorized(_) => BackendKind::Vectorized,
            Backend::MultiProcess(_) => BackendKind::MultiProcess,
            #[cfg(feature = "gpu")]
            Backend::Gpu(_) => BackendKind::Gpu,
            Backend::Native(_) => BackendKind::Native,
        }
    }

    /// Computes the escape-time grid for `viewport`. Blocks until done.
    pub fn compute(&mut self, viewport: &Viewport) -> Result<ComputeOutput, ComputeError> {
        match self {
            Backend::Scalar(b) => b.compute(viewport).map(ComputeOutput::grid_only),
            Backend::Vectorized(b) => b.compute(viewport).map(ComputeOutput::grid_only),
            Backend::MultiProcess(b) => b.compute(viewport).map(ComputeOutput::grid_only),
            #[cfg(feature = "gpu")]
            Backend::Gpu(b) => b.compute(viewport),
            Backend::Native(b) => b.compute(viewport).map(ComputeOutput::grid_only),
        }
    }
}
