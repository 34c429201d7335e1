//! mandelbench: run Mandelbrot backends under a timer and rank them.
//! - `run`: time one backend over the default view, a selection or the zoom suite
//! - `report`: ranked per-preset summary of the benchmark log
//! - `compare`: cross-backend consistency against the scalar reference

use std::{io, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;

use mandelbench::{
    backend::{run_band_worker, Backend, BackendKind, BackendOptions},
    bench::{aggregate, render_report, BenchSession, BenchmarkRecord, LogStore},
    config::{Preset, PresetConfig, Settings},
    error::{ComputeError, ConfigError, StoreError},
    ipc::FrameError,
    viewport::{default_view, from_selection_with_epsilon, PlanePoint, Viewport, DEFAULT_BOUNDS},
};

// ------------------------- CLI -------------------------

#[derive(Parser)]
#[command(name = "mandelbench")]
#[command(about = "Mandelbrot escape-time backends and benchmark log")]
struct Args {
    /// Settings file (.toml / .json); defaults to ./mandelbench.toml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Internal: answer one band request on stdin/stdout (multi-process backend)
    #[arg(long, hide = true)]
    band_worker: bool,

    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Time one backend and append the run's average to the log
    Run {
        #[arg(short, long, value_enum)]
        backend: BackendKind,
        #[arg(short, long, value_enum, ignore_case = true)]
        preset: Option<Preset>,
        /// Number of passes over the selected views
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Default view, then [-0.5, 0.5]^2, then [-0.1, 0.1]^2
        #[arg(long, conflicts_with = "select")]
        zoom_suite: bool,
        /// Drag from (X0, Y0) to (X1, Y1) applied to the default view
        #[arg(
            long,
            num_args = 4,
            value_names = ["X0", "Y0", "X1", "Y1"],
            allow_negative_numbers = true
        )]
        select: Option<Vec<f64>>,
        /// Name recorded in the log instead of the backend's script name
        #[arg(long, value_parser = parse_script_name)]
        script: Option<String>,
        #[arg(long)]
        log: Option<PathBuf>,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Print the ranked benchmark summary
    Report {
        #[arg(long)]
        log: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ReportFormat::Human)]
        format: ReportFormat,
    },
    /// Check every available backend against the scalar reference
    Compare {
        #[arg(long, default_value_t = 64)]
        size: u32,
        #[arg(long, default_value_t = 50)]
        max_iter: u32,
        #[arg(long)]
        workers: Option<usize>,
    },
}

fn parse_script_name(name: &str) -> Result<String, String> {
    BenchmarkRecord::check_field("script", name)
        .map(|()| name.to_string())
        .map_err(|e| e.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Human,
    Json,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Compute(#[from] ComputeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("band worker: {0}")]
    Worker(#[from] FrameError),
    #[error("{0} backend(s) disagree with the scalar reference")]
    Mismatch(usize),
}

// ------------------------- Entry -------------------------

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match dispatch(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(args: Args) -> Result<(), CliError> {
    // Worker mode first: stdout is reserved for the reply frame.
    if args.band_worker {
        return Ok(run_band_worker(io::stdin().lock(), io::stdout().lock())?);
    }

    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::discover()?,
    };

    match args.cmd {
        Some(Cmd::Run {
            backend,
            preset,
            repeat,
            zoom_suite,
            select,
            script,
            log,
            workers,
        }) => {
            let preset = preset.unwrap_or(settings.preset);
            let default = default_view(preset.config());
            let views = if zoom_suite {
                zoom_suite_views(&default)
            } else if let Some(corners) = select {
                vec![("selection".to_string(), selection_view(&corners, &default, &settings))]
            } else {
                vec![("default view".to_string(), default)]
            };
            let options = BackendOptions {
                workers: workers.or(settings.workers),
                worker_binary: None,
            };
            let script = script.unwrap_or_else(|| backend.script_name().to_string());
            let store = LogStore::new(log.unwrap_or_else(|| settings.log_file.clone()));
            run_benchmark(backend, &options, preset, &views, repeat, script, store)
        }
        Some(Cmd::Report { log, format }) => {
            report(LogStore::new(log.unwrap_or(settings.log_file)), format)
        }
        Some(Cmd::Compare {
            size,
            max_iter,
            workers,
        }) => {
            let options = BackendOptions {
                workers: workers.or(settings.workers),
                worker_binary: None,
            };
            compare(size, max_iter, &options)
        }
        None => report(LogStore::new(settings.log_file), ReportFormat::Human),
    }
}

// ------------------------- Run -------------------------

fn zoom_suite_views(default: &Viewport) -> Vec<(String, Viewport)> {
    vec![
        ("default view".to_string(), *default),
        ("zoom [-0.5, 0.5]".to_string(), default.with_bounds(-0.5, 0.5, -0.5, 0.5)),
        ("zoom [-0.1, 0.1]".to_string(), default.with_bounds(-0.1, 0.1, -0.1, 0.1)),
    ]
}

fn selection_view(corners: &[f64], default: &Viewport, settings: &Settings) -> Viewport {
    let p0 = PlanePoint::new(corners[0], corners[1]);
    let p1 = PlanePoint::new(corners[2], corners[3]);
    from_selection_with_epsilon(p0, p1, default, settings.selection_epsilon)
}

fn run_benchmark(
    kind: BackendKind,
    options: &BackendOptions,
    preset: Preset,
    views: &[(String, Viewport)],
    repeat: u32,
    script: String,
    store: LogStore,
) -> Result<(), CliError> {
    let mut backend = Backend::build(kind, options)?;
    let session = BenchSession::open(script, preset.name(), store)?;

    for pass in 1..=repeat.max(1) {
        for (label, view) in views {
            let output = {
                let _timer = session.measure(format!("{} {label} (pass {pass})", kind.label()));
                backend.compute(view)?
            };
            let grid = &output.grid;
            let in_set = grid
                .as_slice()
                .iter()
                .filter(|&&v| v == view.max_iter())
                .count();
            let device_total = output
                .total_iterations
                .map(|t| format!(", device total {t}"))
                .unwrap_or_default();
            println!(
                "{label}: {}x{} max_iter {} | in set {in_set} | iterations {}{device_total}",
                grid.width(),
                grid.height(),
                view.max_iter(),
                grid.sum()
            );
        }
    }

    match session.shutdown() {
        Ok(Some(record)) => println!("Logged: {}", record.to_line()),
        Ok(None) => {}
        // The run itself succeeded; losing its record is reported, not fatal.
        Err(err) => log::error!("Error writing to log file: {err}"),
    }
    Ok(())
}

// ------------------------- Report -------------------------

fn report(store: LogStore, format: ReportFormat) -> Result<(), CliError> {
    if !store.exists() {
        println!("No log file found.");
        return Ok(());
    }
    let records = store.load_all()?;
    if records.is_empty() {
        println!("No valid log entries found.");
        return Ok(());
    }
    let summary = aggregate(&records);
    match format {
        ReportFormat::Human => print!("{}", render_report(&summary)),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}

// ------------------------- Compare -------------------------

fn compare(size: u32, max_iter: u32, options: &BackendOptions) -> Result<(), CliError> {
    let [re_min, re_max, im_min, im_max] = DEFAULT_BOUNDS;
    let config = PresetConfig {
        width: size,
        height: size,
        max_iter,
    };
    let view = Viewport::new(re_min, re_max, im_min, im_max, config)?;
    let reference = Backend::scalar().compute(&view)?.grid;

    println!("{:<16} {:>10}  {}", "Backend", "max |diff|", "Status");
    let mut mismatches = 0;
    for kind in BackendKind::ALL {
        if kind == BackendKind::Scalar {
            continue;
        }
        let mut backend = match Backend::build(kind, options) {
            Ok(backend) => backend,
            Err(err) => {
                println!("{:<16} {:>10}  skipped ({err})", kind.label(), "-");
                continue;
            }
        };
        let output = backend.compute(&view)?;
        let tolerance = if kind.is_double_precision() { 0 } else { 2 };
        match reference.max_abs_diff(&output.grid) {
            Some(diff) if diff <= tolerance => {
                println!("{:<16} {:>10}  ok (tolerance {tolerance})", kind.label(), diff)
            }
            Some(diff) => {
                println!("{:<16} {:>10}  MISMATCH (tolerance {tolerance})", kind.label(), diff);
                mismatches += 1;
            }
            None => {
                println!("{:<16} {:>10}  MISMATCH (shape)", kind.label(), "-");
                mismatches += 1;
            }
        }
    }

    if mismatches > 0 {
        return Err(CliError::Mismatch(mismatches));
    }
    Ok(())
}
