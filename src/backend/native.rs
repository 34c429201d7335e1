//! Backend that hands the whole grid to a precompiled routine over the C ABI.
//!
//! The routine is opaque: the backend only checks the call's status and that
//! every returned cell lies in `[0, max_iter]`.

use rayon::prelude::*;

use crate::{config::PresetConfig, error::ComputeError, grid::IterationGrid, viewport::Viewport};

use super::fill_rows;

pub const NATIVE_OK: i32 = 0;
pub const NATIVE_BAD_ARGS: i32 = 1;

/// Parameters passed to a native routine.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeRequest {
    pub re_min: f64,
    pub re_max: f64,
    pub im_min: f64,
    pub im_max: f64,
    pub width: u32,
    pub height: u32,
    pub max_iter: u32,
}

impl From<&Viewport> for NativeRequest {
    fn from(v: &Viewport) -> Self {
        Self {
            re_min: v.re_min(),
            re_max: v.re_max(),
            im_min: v.im_min(),
            im_max: v.im_max(),
            width: v.width(),
            height: v.height(),
            max_iter: v.max_iter(),
        }
    }
}

/// Writes `width * height` row-major counts into `out` and returns
/// [`NATIVE_OK`], or a non-zero status without touching `out`.
pub type NativeRoutine =
    unsafe extern "C" fn(request: *const NativeRequest, out: *mut u32, len: usize) -> i32;

/// Bundled routine: rows evaluated in parallel on the rayon pool.
///
/// # Safety
/// `request` must be null or point to a valid [`NativeRequest`]; `out` must be
/// null or valid for writes of `len` values.
pub unsafe extern "C" fn native_escape_grid(
    request: *const NativeRequest,
    out: *mut u32,
    len: usize,
) -> i32 {
    let Some(request) = request.as_ref() else {
        return NATIVE_BAD_ARGS;
    };
    if out.is_null() {
        return NATIVE_BAD_ARGS;
    }
    let config = PresetConfig {
        width: request.width,
        height: request.height,
        max_iter: request.max_iter,
    };
    let Ok(viewport) = Viewport::new(
        request.re_min,
        request.re_max,
        request.im_min,
        request.im_max,
        config,
    ) else {
        return NATIVE_BAD_ARGS;
    };
    if len != viewport.pixel_count() {
        return NATIVE_BAD_ARGS;
    }

    let cells = std::slice::from_raw_parts_mut(out, len);
    cells
        .par_chunks_mut(viewport.width() as usize)
        .enumerate()
        .for_each(|(y, row)| fill_rows(&viewport, y as u32, row));
    NATIVE_OK
}

pub struct NativeBackend {
    routine: NativeRoutine,
    name: &'static str,
}

impl NativeBackend {
    pub fn bundled() -> Self {
        Self {
            routine: native_escape_grid,
            name: "bundled",
        }
    }

    /// # Safety
    /// `routine` must honour the pointer contract of [`NativeRoutine`].
    pub unsafe fn from_routine(routine: NativeRoutine, name: &'static str) -> Self {
        Self { routine, name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn compute(&self, viewport: &Viewport) -> Result<IterationGrid, ComputeError> {
        viewport.validate()?;
        let request = NativeRequest::from(viewport);
        let mut data = vec![0u32; viewport.pixel_count()];
        // SAFETY: `request` outlives the call and `data` holds exactly `len` cells.
        let status = unsafe { (self.routine)(&request, data.as_mut_ptr(), data.len()) };
        if status != NATIVE_OK {
            return Err(ComputeError::NativeContract(format!(
                "{} routine returned status {status}",
                self.name
            )));
        }
        if let Some(bad) = data.iter().find(|&&v| v > viewport.max_iter()) {
            return Err(ComputeError::NativeContract(format!(
                "{} routine produced {bad} > max_iter {}",
                self.name,
                viewport.max_iter()
            )));
        }
        IterationGrid::from_vec(viewport.width(), viewport.height(), data).ok_or_else(|| {
            ComputeError::NativeContract("grid size does not match viewport".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScalarBackend;
    use crate::viewport::default_view;

    fn small_view() -> Viewport {
        default_view(PresetConfig {
            width: 33,
            height: 21,
            max_iter: 64,
        })
    }

    #[test]
    fn test_bundled_matches_scalar() {
        let view = small_view();
        let native = NativeBackend::bundled().compute(&view).unwrap();
        assert_eq!(native, ScalarBackend.compute(&view).unwrap());
    }

    #[test]
    fn test_bundled_rejects_wrong_length() {
        let request = NativeRequest::from(&small_view());
        let mut out = vec![0u32; 5];
        let status = unsafe { native_escape_grid(&request, out.as_mut_ptr(), out.len()) };
        assert_eq!(status, NATIVE_BAD_ARGS);
        assert!(out.iter().all(|&v| v == 0));
    }

    unsafe extern "C" fn failing_routine(_: *const NativeRequest, _: *mut u32, _: usize) -> i32 {
        7
    }

    unsafe extern "C" fn overflowing_routine(
        request: *const NativeRequest,
        out: *mut u32,
        len: usize,
    ) -> i32 {
        let max_iter = (*request).max_iter;
        std::slice::from_raw_parts_mut(out, len).fill(max_iter + 1);
        NATIVE_OK
    }

    #[test]
    fn test_status_is_checked() {
        let backend = unsafe { NativeBackend::from_routine(failing_routine, "failing") };
        assert!(matches!(
            backend.compute(&small_view()),
            Err(ComputeError::NativeContract(_))
        ));
    }

    #[test]
    fn test_postcondition_is_checked() {
        let backend = unsafe { NativeBackend::from_routine(overflowing_routine, "overflowing") };
        assert!(matches!(
            backend.compute(&small_view()),
            Err(ComputeError::NativeContract(_))
        ));
    }
}
