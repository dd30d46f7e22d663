use rayon::prelude::*;

/// A 2D grid stored row-major.
///
/// Every stage uses the same convention: `x` is the column index (0 = west
/// edge) and `y` is the row index (0 = north edge, the first row stored in
/// the source raster). Nothing wraps; lookups that must tolerate
/// out-of-range coordinates go through the clamping accessors.
#[derive(Clone, Debug, PartialEq)]
pub struct Tilemap<T> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Tilemap<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }
}

impl<T: Clone> Tilemap<T> {
    pub fn new_with(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Fill the entire map with a value.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T> Tilemap<T> {
    /// Wrap an existing row-major buffer. Returns `None` if the length does
    /// not match `width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        if width.checked_mul(height) != Some(data.len()) {
            return None;
        }
        Some(Self { width, height, data })
    }

    fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height, "({x}, {y}) outside {}x{}", self.width, self.height);
        y * self.width + x
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    /// Get a cell with signed coordinates clamped to the grid edge
    /// (edge replication).
    pub fn get_clamped(&self, x: isize, y: isize) -> &T {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.get(cx, cy)
    }

    /// Get 8-connected neighbors. Cells on the border simply have fewer.
    pub fn neighbors_8(&self, x: usize, y: usize) -> Vec<(usize, usize)> {
        let mut result = Vec::with_capacity(8);

        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }

                let nx = x as isize + dx;
                let ny = y as isize + dy;
                if nx >= 0 && ny >= 0 && (nx as usize) < self.width && (ny as usize) < self.height {
                    result.push((nx as usize, ny as usize));
                }
            }
        }

        result
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let width = self.width;
        self.data.iter().enumerate().map(move |(idx, val)| {
            let x = idx % width;
            let y = idx / width;
            (x, y, val)
        })
    }

    /// Iterate mutably over all cells with their coordinates.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut T)> {
        let width = self.width;
        self.data.iter_mut().enumerate().map(move |(idx, val)| {
            let x = idx % width;
            let y = idx / width;
            (x, y, val)
        })
    }

    /// A single row as a slice.
    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Build a new map of the same shape by applying `f` to every cell.
    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Tilemap<U> {
        Tilemap {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(f).collect(),
        }
    }
}

impl<T: Send> Tilemap<T> {
    /// Overwrite every row in parallel. `f` receives the row index and the
    /// row slice; rows are disjoint so workers never contend.
    pub fn par_fill_rows<F>(&mut self, f: F)
    where
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        if self.width == 0 {
            return;
        }
        self.data
            .par_chunks_mut(self.width)
            .enumerate()
            .for_each(|(y, row)| f(y, row));
    }
}

/// Sampling and range helpers for f32 tilemaps
impl Tilemap<f32> {
    /// Sample at fractional coordinates using bilinear interpolation.
    ///
    /// Coordinates are clamped to `[0, width-1] x [0, height-1]`, so nothing
    /// is extrapolated past the grid boundary. Integer coordinates return
    /// the stored sample exactly.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> f32 {
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let v00 = *self.get(x0, y0) as f64;
        let v10 = *self.get(x1, y0) as f64;
        let v01 = *self.get(x0, y1) as f64;
        let v11 = *self.get(x1, y1) as f64;

        let v0 = v00 * (1.0 - fx) + v10 * fx;
        let v1 = v01 * (1.0 - fx) + v11 * fx;
        (v0 * (1.0 - fy) + v1 * fy) as f32
    }

    /// Smallest and largest value, or `None` for an empty map.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let mut iter = self.data.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    /// Min and max of the 3x3 window around `(x, y)`, edge-clamped.
    pub fn window_min_max(&self, x: usize, y: usize) -> (f32, f32) {
        let mut lo = f32::MAX;
        let mut hi = f32::MIN;
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                let v = *self.get_clamped(x as isize + dx, y as isize + dy);
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        (lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_layout() {
        let map = Tilemap::from_vec(3, 2, vec![0, 1, 2, 10, 11, 12]).unwrap();
        assert_eq!(*map.get(2, 0), 2);
        assert_eq!(*map.get(0, 1), 10);
        assert_eq!(map.row(1), &[10, 11, 12]);
        assert!(Tilemap::from_vec(3, 2, vec![0; 5]).is_none());
        assert!(Tilemap::from_vec(3, usize::MAX / 3 + 1, vec![0; 1]).is_none());
    }

    #[test]
    fn test_clamped_access_does_not_wrap() {
        let map = Tilemap::from_vec(3, 1, vec![1.0f32, 2.0, 3.0]).unwrap();
        assert_eq!(*map.get_clamped(-1, 0), 1.0);
        assert_eq!(*map.get_clamped(5, 3), 3.0);
    }

    #[test]
    fn test_neighbors_at_corner() {
        let map = Tilemap::new_with(4, 4, 0u8);
        let mut n = map.neighbors_8(0, 0);
        n.sort();
        assert_eq!(n, vec![(0, 1), (1, 0), (1, 1)]);
        assert_eq!(map.neighbors_8(2, 2).len(), 8);
    }

    #[test]
    fn test_bilinear_sampling() {
        let map = Tilemap::from_vec(2, 2, vec![0.0f32, 10.0, 20.0, 30.0]).unwrap();
        assert_eq!(map.sample_bilinear(0.0, 0.0), 0.0);
        assert_eq!(map.sample_bilinear(1.0, 1.0), 30.0);
        assert!((map.sample_bilinear(0.5, 0.5) - 15.0).abs() < 1e-5);
        // Clamped past the edge
        assert_eq!(map.sample_bilinear(7.0, -3.0), 10.0);
    }

    #[test]
    fn test_par_fill_rows() {
        let mut map = Tilemap::new_with(4, 3, 0usize);
        map.par_fill_rows(|y, row| {
            for (x, cell) in row.iter_mut().enumerate() {
                *cell = y * 10 + x;
            }
        });
        assert_eq!(*map.get(3, 2), 23);
        assert_eq!(*map.get(0, 1), 10);
    }

    #[test]
    fn test_min_max() {
        let map = Tilemap::from_vec(2, 2, vec![-3.0f32, 8.0, 1.0, 0.5]).unwrap();
        assert_eq!(map.min_max(), Some((-3.0, 8.0)));
        assert_eq!(Tilemap::<f32>::new(0, 0).min_max(), None);
    }
}
