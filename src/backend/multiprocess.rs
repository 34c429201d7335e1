//! Row bands evaluated in separate OS processes.
//!
//! The driver re-launches a worker executable (normally itself) once per band
//! with [`BAND_WORKER_FLAG`]. Nothing is shared: each worker receives its band
//! and the viewport by value over stdin and returns its row block over stdout.
//! Blocks are placed by band index, so the result does not depend on the
//! order in which workers finish.

use std::{
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
};

use crate::{
    error::ComputeError,
    grid::IterationGrid,
    ipc::{read_frame, write_frame, BandReply, BandRequest, FrameError, PROTOCOL_VERSION},
    viewport::Viewport,
};

use super::fill_rows;

/// Hidden CLI flag that switches the executable into band-worker mode.
pub const BAND_WORKER_FLAG: &str = "--band-worker";

/// Contiguous rows `row_start..row_end` handled by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub index: usize,
    pub row_start: u32,
    pub row_end: u32,
}

impl Band {
    pub fn rows(&self) -> u32 {
        self.row_end - self.row_start
    }
}

/// Splits `height` rows into at most `workers` contiguous bands whose sizes
/// differ by at most one row. Never yields an empty band.
pub fn partition_rows(height: u32, workers: usize) -> Vec<Band> {
    if height == 0 {
        return Vec::new();
    }
    let count = workers.clamp(1, height as usize) as u32;
    let base = height / count;
    let extra = height % count;
    let mut bands = Vec::with_capacity(count as usize);
    let mut row = 0;
    for index in 0..count {
        let rows = base + u32::from(index < extra);
        bands.push(Band {
            index: index as usize,
            row_start: row,
            row_end: row + rows,
        });
        row += rows;
    }
    bands
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

// ------------------------- Driver -------------------------

#[derive(Debug, Clone)]
pub struct MultiProcessBackend {
    worker_binary: PathBuf,
    workers: usize,
}

impl MultiProcessBackend {
    /// Uses the running executable as the worker binary.
    pub fn new() -> Result<Self, ComputeError> {
        let binary = std::env::current_exe().map_err(|e| {
            ComputeError::BackendUnavailable(format!("cannot locate own executable: {e}"))
        })?;
        Self::with_worker_binary(binary)
    }

    pub fn with_worker_binary(binary: PathBuf) -> Result<Self, ComputeError> {
        if !binary.is_file() {
            return Err(ComputeError::BackendUnavailable(format!(
                "worker binary {} not found",
                binary.display()
            )));
        }
        Ok(Self {
            worker_binary: binary,
            workers: default_workers(),
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn compute(&self, viewport: &Viewport) -> Result<IterationGrid, ComputeError> {
        viewport.validate()?;
        let bands = partition_rows(viewport.height(), self.workers);

        // Spawn everything first so the bands run concurrently. Dropping a
        // handle kills its process, which covers every early return below.
        let mut handles = Vec::with_capacity(bands.len());
        for band in &bands {
            handles.push(BandWorker::spawn(&self.worker_binary, viewport, *band)?);
        }
        log::debug!(
            "dispatched {} bands to {}",
            handles.len(),
            self.worker_binary.display()
        );

        let width = viewport.width() as usize;
        let mut blocks: Vec<Option<Vec<u32>>> = vec![None; bands.len()];
        for handle in &mut handles {
            let (index, rows) = handle.collect()?;
            let band = bands.get(index).ok_or_else(|| {
                ComputeError::WorkerFailed(format!("reply for unknown band {index}"))
            })?;
            if rows.len() != band.rows() as usize * width {
                return Err(ComputeError::WorkerFailed(format!(
                    "band {index} returned {} cells, expected {}",
                    rows.len(),
                    band.rows() as usize * width
                )));
            }
            if blocks[index].replace(rows).is_some() {
                return Err(ComputeError::WorkerFailed(format!(
                    "band {index} answered twice"
                )));
            }
        }

        let blocks = blocks
            .into_iter()
            .enumerate()
            .map(|(index, block)| {
                block.ok_or_else(|| ComputeError::WorkerFailed(format!("band {index} missing")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        IterationGrid::from_row_blocks(viewport.width(), blocks)
            .filter(|grid| grid.height() == viewport.height())
            .ok_or_else(|| ComputeError::WorkerFailed("row blocks do not tile the grid".into()))
    }
}

struct BandWorker {
    child: Child,
    stdout: BufReader<ChildStdout>,
    band: Band,
}

impl BandWorker {
    fn spawn(binary: &Path, viewport: &Viewport, band: Band) -> Result<Self, ComputeError> {
        let mut child = Command::new(binary)
            .arg(BAND_WORKER_FLAG)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ComputeError::WorkerFailed(format!("spawn failed: {e}")))?;

        let stdout = child.stdout.take();
        let stdin = child.stdin.take();
        let worker = match stdout {
            Some(stdout) => Self {
                child,
                stdout: BufReader::new(stdout),
                band,
            },
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ComputeError::WorkerFailed("worker stdout not piped".into()));
            }
        };

        let mut stdin = stdin
            .ok_or_else(|| ComputeError::WorkerFailed("worker stdin not piped".into()))?;
        write_frame(&mut stdin, &band_request(viewport, band)).map_err(|e| {
            ComputeError::WorkerFailed(format!("band {}: sending request: {e}", band.index))
        })?;
        // Closing stdin tells the worker no more input follows.
        drop(stdin);
        log::debug!(
            "band {} rows {}..{} -> pid {}",
            band.index,
            band.row_start,
            band.row_end,
            worker.child.id()
        );
        Ok(worker)
    }

    fn collect(&mut self) -> Result<(usize, Vec<u32>), ComputeError> {
        let index = self.band.index;
        let reply: BandReply = read_frame(&mut self.stdout).map_err(|e| match e {
            FrameError::EndOfStream => {
                ComputeError::WorkerFailed(format!("band {index}: worker exited without reply"))
            }
            other => ComputeError::WorkerFailed(format!("band {index}: {other}")),
        })?;
        let status = self
            .child
            .wait()
            .map_err(|e| ComputeError::WorkerFailed(format!("band {index}: wait failed: {e}")))?;
        if !status.success() {
            return Err(ComputeError::WorkerFailed(format!(
                "band {index}: worker exited with {status}"
            )));
        }
        match reply {
            BandReply::Rows { band_index, rows } => Ok((band_index as usize, rows)),
            BandReply::Failure {
                band_index,
                message,
            } => Err(ComputeError::WorkerFailed(format!(
                "band {band_index}: {message}"
            ))),
        }
    }
}

impl Drop for BandWorker {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn band_request(viewport: &Viewport, band: Band) -> BandRequest {
    BandRequest {
        protocol_version: PROTOCOL_VERSION,
        band_index: band.index as u32,
        row_start: band.row_start,
        row_end: band.row_end,
        re_min: viewport.re_min(),
        re_max: viewport.re_max(),
        im_min: viewport.im_min(),
        im_max: viewport.im_max(),
        width: viewport.width(),
        height: viewport.height(),
        max_iter: viewport.max_iter(),
    }
}

// ------------------------- Worker -------------------------

/// Worker-mode entry point: answers one request from `input` on `output`.
pub fn run_band_worker<R: Read, W: Write>(input: R, output: W) -> Result<(), FrameError> {
    let mut reader = BufReader::new(input);
    let mut writer = BufWriter::new(output);
    let request: BandRequest = read_frame(&mut reader)?;
    let reply = match compute_band(&request) {
        Ok(rows) => BandReply::Rows {
            band_index: request.band_index,
            rows,
        },
        Err(message) => {
            log::error!("band {} rejected: {message}", request.band_index);
            BandReply::Failure {
                band_index: request.band_index,
                message,
            }
        }
    };
    write_frame(&mut writer, &reply)
}

fn compute_band(request: &BandRequest) -> Result<Vec<u32>, String> {
    if request.protocol_version != PROTOCOL_VERSION {
        return Err(format!(
            "protocol version {} (worker speaks {PROTOCOL_VERSION})",
            request.protocol_version
        ));
    }
    let viewport = Viewport::new(
        request.re_min,
        request.re_max,
        request.im_min,
        request.im_max,
        crate::config::PresetConfig {
            width: request.width,
            height: request.height,
            max_iter: request.max_iter,
        },
    )
    .map_err(|e| e.to_string())?;
    if request.row_start >= request.row_end || request.row_end > viewport.height() {
        return Err(format!(
            "row range {}..{} outside 0..{}",
            request.row_start,
            request.row_end,
            viewport.height()
        ));
    }
    let rows = (request.row_end - request.row_start) as usize;
    let mut block = vec![0u32; rows * viewport.width() as usize];
    fill_rows(&viewport, request.row_start, &mut block);
    Ok(block)
}
