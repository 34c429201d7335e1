//! Viewport geometry and the selection transforms used by an interactive
//! front end (drag = zoom to rectangle, click = reset).

use serde::{Deserialize, Serialize};

use crate::config::{PresetConfig, DEFAULT_SELECTION_EPSILON};
use crate::error::ComputeError;

/// `(re_min, re_max, im_min, im_max)` of the initial view.
pub const DEFAULT_BOUNDS: [f64; 4] = [-2.0, 1.0, -1.0, 1.0];

/// Rectangular region of the complex plane plus raster size and iteration bound.
///
/// A viewport is never edited in place; transforms build a new value. Fields
/// are private so every constructor funnels through [`Viewport::validate`],
/// except [`Viewport::with_bounds`], which may produce a degenerate selection
/// that backends reject at compute time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    re_min: f64,
    re_max: f64,
    im_min: f64,
    im_max: f64,
    width: u32,
    height: u32,
    max_iter: u32,
}

/// A point in plane coordinates, e.g. a pointer position mapped into data space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanePoint {
    pub x: f64,
    pub y: f64,
}

impl PlanePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Viewport {
    pub fn new(
        re_min: f64,
        re_max: f64,
        im_min: f64,
        im_max: f64,
        config: PresetConfig,
    ) -> Result<Self, ComputeError> {
        let viewport = Self {
            re_min,
            re_max,
            im_min,
            im_max,
            width: config.width,
            height: config.height,
            max_iter: config.max_iter,
        };
        viewport.validate()?;
        Ok(viewport)
    }

    /// Same resolution and iteration bound, new bounds. Not validated.
    pub fn with_bounds(&self, re_min: f64, re_max: f64, im_min: f64, im_max: f64) -> Self {
        Self {
            re_min,
            re_max,
            im_min,
            im_max,
            ..*self
        }
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        let bounds = self.bounds();
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(ComputeError::InvalidViewport(format!(
                "non-finite bounds {bounds:?}"
            )));
        }
        if self.re_min >= self.re_max {
            return Err(ComputeError::InvalidViewport(format!(
                "re_min {} must be below re_max {}",
                self.re_min, self.re_max
            )));
        }
        if self.im_min >= self.im_max {
            return Err(ComputeError::InvalidViewport(format!(
                "im_min {} must be below im_max {}",
                self.im_min, self.im_max
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ComputeError::InvalidViewport(format!(
                "empty raster {}x{}",
                self.width, self.height
            )));
        }
        if self.max_iter == 0 {
            return Err(ComputeError::InvalidViewport(
                "max_iter must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn re_min(&self) -> f64 {
        self.re_min
    }

    pub fn re_max(&self) -> f64 {
        self.re_max
    }

    pub fn im_min(&self) -> f64 {
        self.im_min
    }

    pub fn im_max(&self) -> f64 {
        self.im_max
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn max_iter(&self) -> u32 {
        self.max_iter
    }

    pub fn bounds(&self) -> [f64; 4] {
        [self.re_min, self.re_max, self.im_min, self.im_max]
    }

    pub fn config(&self) -> PresetConfig {
        PresetConfig {
            width: self.width,
            height: self.height,
            max_iter: self.max_iter,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Complex point sampled by pixel `(x, y)`. Both endpoints are included
    /// when an axis has at least two samples.
    #[inline]
    pub fn point(&self, x: u32, y: u32) -> (f64, f64) {
        (
            axis_sample(self.re_min, self.re_max, x, self.width),
            axis_sample(self.im_min, self.im_max, y, self.height),
        )
    }
}

#[inline]
fn axis_sample(min: f64, max: f64, i: u32, n: u32) -> f64 {
    if n < 2 {
        min
    } else {
        min + (max - min) * f64::from(i) / f64::from(n - 1)
    }
}

// ------------------------- Transforms -------------------------

pub fn default_view(config: PresetConfig) -> Viewport {
    let [re_min, re_max, im_min, im_max] = DEFAULT_BOUNDS;
    Viewport {
        re_min,
        re_max,
        im_min,
        im_max,
        width: config.width,
        height: config.height,
        max_iter: config.max_iter,
    }
}

/// Rectangle spanned by a drag from `p0` to `p1`, or `default` when the
/// drag is shorter than [`DEFAULT_SELECTION_EPSILON`] on both axes.
pub fn from_selection(p0: PlanePoint, p1: PlanePoint, default: &Viewport) -> Viewport {
    from_selection_with_epsilon(p0, p1, default, DEFAULT_SELECTION_EPSILON)
}

pub fn from_selection_with_epsilon(
    p0: PlanePoint,
    p1: PlanePoint,
    default: &Viewport,
    epsilon: f64,
) -> Viewport {
    if (p1.x - p0.x).abs() < epsilon && (p1.y - p0.y).abs() < epsilon {
        return *default;
    }
    // No minimum span: thin rectangles are passed through as-is.
    default.with_bounds(
        p0.x.min(p1.x),
        p0.x.max(p1.x),
        p0.y.min(p1.y),
        p0.y.max(p1.y),
    )
}
