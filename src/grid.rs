use serde::Serialize;

/// Row-major `height x width` matrix of escape counts in `[0, max_iter]`.
/// A cell equal to `max_iter` did not escape within the bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationGrid {
    width: u32,
    height: u32,
    data: Vec<u32>,
}

impl IterationGrid {
    /// Wraps a dense buffer. Returns `None` if its length is not `width * height`.
    pub fn from_vec(width: u32, height: u32, data: Vec<u32>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Concatenates row blocks in the order given.
    pub fn from_row_blocks<I>(width: u32, blocks: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec<u32>>,
    {
        let mut data = Vec::new();
        for block in blocks {
            if width == 0 || block.len() % width as usize != 0 {
                return None;
            }
            data.extend(block);
        }
        let height = u32::try_from(data.len() / width as usize).ok()?;
        Self::from_vec(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(height, width)`, matching the row-major layout.
    pub fn dims(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn row(&self, y: u32) -> Option<&[u32]> {
        if y >= self.height {
            return None;
        }
        let w = self.width as usize;
        let start = y as usize * w;
        Some(&self.data[start..start + w])
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u32> {
        self.data
    }

    /// Host-side sum of all counts.
    pub fn sum(&self) -> u64 {
        self.data.iter().map(|&v| u64::from(v)).sum()
    }

    pub fn max_value(&self) -> u32 {
        self.data.iter().copied().max().unwrap_or(0)
    }

    /// Largest per-cell difference, `None` when the shapes differ.
    pub fn max_abs_diff(&self, other: &IterationGrid) -> Option<u32> {
        if self.dims() != other.dims() {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a.abs_diff(*b))
                .max()
                .unwrap_or(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_checks_length() {
        assert!(IterationGrid::from_vec(3, 2, vec![0; 6]).is_some());
        assert!(IterationGrid::from_vec(3, 2, vec![0; 5]).is_none());
    }

    #[test]
    fn test_row_major_access() {
        let grid = IterationGrid::from_vec(3, 2, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(grid.dims(), (2, 3));
        assert_eq!(grid.get(0, 1), Some(4));
        assert_eq!(grid.get(2, 0), Some(3));
        assert_eq!(grid.get(3, 0), None);
        assert_eq!(grid.row(1), Some(&[4, 5, 6][..]));
        assert_eq!(grid.row(2), None);
        assert_eq!(grid.sum(), 21);
        assert_eq!(grid.max_value(), 6);
    }

    #[test]
    fn test_row_blocks_keep_order() {
        let grid =
            IterationGrid::from_row_blocks(2, vec![vec![1, 2], vec![3, 4, 5, 6], vec![7, 8]])
                .unwrap();
        assert_eq!(grid.dims(), (4, 2));
        assert_eq!(grid.as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_row_blocks_reject_ragged_rows() {
        assert!(IterationGrid::from_row_blocks(2, vec![vec![1, 2, 3]]).is_none());
    }

    #[test]
    fn test_max_abs_diff() {
        let a = IterationGrid::from_vec(2, 1, vec![10, 4]).unwrap();
        let b = IterationGrid::from_vec(2, 1, vec![8, 5]).unwrap();
        let c = IterationGrid::from_vec(1, 2, vec![8, 5]).unwrap();
        assert_eq!(a.max_abs_diff(&b), Some(2));
        assert_eq!(a.max_abs_diff(&c), None);
    }
}
