//! Cross-backend behaviour. The multi-process backend re-launches the
//! compiled `mandelbench` binary as its band worker.

use std::path::PathBuf;

use mandelbench::{
    backend::{escape_time, Backend, BackendKind, BackendOptions, MultiProcessBackend},
    config::PresetConfig,
    viewport::{default_view, Viewport},
    ComputeError, IterationGrid,
};

fn worker_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mandelbench"))
}

fn options(workers: usize) -> BackendOptions {
    BackendOptions {
        workers: Some(workers),
        worker_binary: Some(worker_binary()),
    }
}

fn cpu_backends(workers: usize) -> Vec<Backend> {
    vec![
        Backend::scalar(),
        Backend::vectorized(),
        Backend::multi_process(&options(workers)).unwrap(),
        Backend::native(),
    ]
}

fn grid_64() -> Viewport {
    default_view(PresetConfig {
        width: 64,
        height: 64,
        max_iter: 50,
    })
}

#[test]
fn test_float64_backends_are_bit_identical() {
    let view = grid_64();
    let reference = Backend::scalar().compute(&view).unwrap().grid;
    for mut backend in cpu_backends(3) {
        let output = backend.compute(&view).unwrap();
        assert_eq!(output.grid, reference, "{} differs", backend.kind().label());
        assert_eq!(output.total_iterations, None);
    }
}

#[test]
fn test_dims_follow_viewport() {
    let view = default_view(PresetConfig {
        width: 37,
        height: 11,
        max_iter: 20,
    });
    for mut backend in cpu_backends(4) {
        let grid = backend.compute(&view).unwrap().grid;
        assert_eq!(grid.dims(), (11, 37), "{}", backend.kind().label());
        assert!(grid.max_value() <= 20);
    }
}

/// 5x3 grid over [-2, 2] x [-1, 1]: column 2 of row 1 samples c = 0 and
/// column 4 of row 1 samples c = 2.
fn landmark_view(max_iter: u32) -> Viewport {
    Viewport::new(
        -2.0,
        2.0,
        -1.0,
        1.0,
        PresetConfig {
            width: 5,
            height: 3,
            max_iter,
        },
    )
    .unwrap()
}

#[test]
fn test_origin_and_two_on_every_backend() {
    let view = landmark_view(40);
    assert_eq!(view.point(2, 1), (0.0, 0.0));
    assert_eq!(view.point(4, 1), (2.0, 0.0));

    for mut backend in cpu_backends(2) {
        let grid = backend.compute(&view).unwrap().grid;
        let label = backend.kind().label();
        assert_eq!(grid.get(2, 1), Some(40), "{label}: c = 0");
        assert_eq!(grid.get(4, 1), Some(1), "{label}: c = 2");
    }
}

#[test]
fn test_more_workers_than_rows() {
    let view = default_view(PresetConfig {
        width: 16,
        height: 3,
        max_iter: 30,
    });
    let reference = Backend::scalar().compute(&view).unwrap().grid;
    let mut backend = Backend::multi_process(&options(12)).unwrap();
    assert_eq!(backend.compute(&view).unwrap().grid, reference);
}

#[test]
fn test_invalid_viewport_rejected_everywhere() {
    let view = grid_64().with_bounds(0.5, 0.5, -1.0, 1.0);
    for mut backend in cpu_backends(2) {
        assert!(
            matches!(backend.compute(&view), Err(ComputeError::InvalidViewport(_))),
            "{}",
            backend.kind().label()
        );
    }
}

#[test]
fn test_worker_binary_without_worker_mode_fails() {
    // `true` exits 0 without answering: the driver must not hang or succeed.
    let Ok(backend) = MultiProcessBackend::with_worker_binary(PathBuf::from("/bin/true")) else {
        return;
    };
    let result = backend.with_workers(2).compute(&grid_64());
    assert!(matches!(result, Err(ComputeError::WorkerFailed(_))));
}

#[test]
fn test_scalar_grid_matches_kernel() {
    let view = grid_64();
    let grid: IterationGrid = Backend::scalar().compute(&view).unwrap().grid;
    for (x, y) in [(0, 0), (31, 17), (63, 63), (40, 32)] {
        let (cr, ci) = view.point(x, y);
        assert_eq!(grid.get(x, y), Some(escape_time(cr, ci, 50)));
    }
}

#[test]
fn test_backend_kind_round_trip() {
    for kind in BackendKind::ALL {
        if kind == BackendKind::Gpu {
            continue;
        }
        let backend = Backend::build(kind, &options(2)).unwrap();
        assert_eq!(backend.kind(), kind);
    }
}

#[cfg(feature = "gpu")]
mod gpu {
    use super::*;

    fn gpu_or_skip() -> Option<Backend> {
        match Backend::gpu() {
            Ok(backend) => Some(backend),
            Err(ComputeError::BackendUnavailable(reason)) => {
                eprintln!("skipping GPU test: {reason}");
                None
            }
            Err(other) => panic!("unexpected GPU error: {other}"),
        }
    }

    #[test]
    fn test_gpu_within_two_steps() {
        let Some(mut gpu) = gpu_or_skip() else {
            return;
        };
        let view = grid_64();
        let reference = Backend::scalar().compute(&view).unwrap().grid;
        let output = gpu.compute(&view).unwrap();
        assert_eq!(output.grid.dims(), (64, 64));
        assert!(output.grid.max_abs_diff(&reference).unwrap() <= 2);
        assert_eq!(output.total_iterations, Some(output.grid.sum()));
    }

    #[test]
    fn test_gpu_landmarks() {
        let Some(mut gpu) = gpu_or_skip() else {
            return;
        };
        let grid = gpu.compute(&landmark_view(40)).unwrap().grid;
        assert_eq!(grid.get(2, 1), Some(40));
        assert_eq!(grid.get(4, 1), Some(1));
    }
}
