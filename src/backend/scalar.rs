use crate::{error::ComputeError, grid::IterationGrid, viewport::Viewport};

use super::fill_rows;

/// One point at a time, float64, single thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarBackend;

impl ScalarBackend {
    pub fn compute(&self, viewport: &Viewport) -> Result<IterationGrid, ComputeError> {
        viewport.validate()?;
        let mut data = vec![0u32; viewport.pixel_count()];
        fill_rows(viewport, 0, &mut data);
        IterationGrid::from_vec(viewport.width(), viewport.height(), data).ok_or_else(|| {
            ComputeError::InvalidViewport("grid size does not match viewport".into())
        })
    }
}
