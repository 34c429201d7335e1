use ndarray::{Array2, Zip};

use crate::{error::ComputeError, grid::IterationGrid, viewport::Viewport};

use super::{escaped, step};

/// Whole-grid evaluation over dense float64 arrays.
///
/// Every lane carries a "still iterating" flag. A step only touches live
/// lanes; the first step whose result leaves the radius stores its index and
/// clears the flag, after which the lane is frozen.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorizedBackend;

impl VectorizedBackend {
    pub fn compute(&self, viewport: &Viewport) -> Result<IterationGrid, ComputeError> {
        viewport.validate()?;
        let shape = (viewport.height() as usize, viewport.width() as usize);
        let max_iter = viewport.max_iter();

        let c_re = Array2::from_shape_fn(shape, |(y, x)| viewport.point(x as u32, y as u32).0);
        let c_im = Array2::from_shape_fn(shape, |(y, x)| viewport.point(x as u32, y as u32).1);
        let mut z_re = Array2::<f64>::zeros(shape);
        let mut z_im = Array2::<f64>::zeros(shape);
        let mut live = Array2::from_elem(shape, true);
        let mut counts = Array2::from_elem(shape, max_iter);

        let mut remaining = viewport.pixel_count();
        for i in 0..max_iter {
            if remaining == 0 {
                break;
            }
            Zip::from(&mut z_re)
                .and(&mut z_im)
                .and(&mut live)
                .and(&mut counts)
                .and(&c_re)
                .and(&c_im)
                .for_each(|zr, zi, alive, count, &cr, &ci| {
                    if !*alive {
                        return;
                    }
                    (*zr, *zi) = step(*zr, *zi, cr, ci);
                    if escaped(*zr, *zi) {
                        *count = i;
                        *alive = false;
                        remaining -= 1;
                    }
                });
        }

        IterationGrid::from_vec(viewport.width(), viewport.height(), counts.into_raw_vec())
            .ok_or_else(|| ComputeError::InvalidViewport("grid size does not match viewport".into()))
    }
}
