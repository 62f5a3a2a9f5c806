use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::tensor::Tensor;

/// `n` evenly spaced values from `start` to `end`, both included
pub fn linspace(start: f32, end: f32, n: usize) -> Vec<f32> {
    assert!(n >= 2, "linspace needs at least 2 points, got {}", n);
    let step = (end - start) / (n - 1) as f32;
    (0..n).map(|i| start + step * i as f32).collect()
}

/// A loss function sampled on a regular grid
///
/// `z[row][col]` is the loss at `(xs[col], ys[row])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossSurface {
    pub xs: Vec<f32>,
    pub ys: Vec<f32>,
    pub z: Vec<Vec<f32>>,
}

impl LossSurface {
    /// Wide enough in x to hold the usual (2.5, 2.5) start point
    pub const DEFAULT_X_RANGE: [f32; 2] = [-2.0, 3.5];
    pub const DEFAULT_Y_RANGE: [f32; 2] = [-1.0, 3.0];
    pub const DEFAULT_POINTS: usize = 100;

    /// Evaluate `f` on an `n_points` x `n_points` grid in one vectorised call.
    ///
    /// # Panics
    /// If `n_points < 2`.
    #[instrument(skip(f))]
    pub fn sample<F>(f: F, x_range: [f32; 2], y_range: [f32; 2], n_points: usize) -> Self
    where
        F: Fn(&Tensor, &Tensor) -> Tensor,
    {
        let xs = linspace(x_range[0], x_range[1], n_points);
        let ys = linspace(y_range[0], y_range[1], n_points);

        let mut grid_x = Vec::with_capacity(n_points * n_points);
        let mut grid_y = Vec::with_capacity(n_points * n_points);
        for &y in &ys {
            for &x in &xs {
                grid_x.push(x);
                grid_y.push(y);
            }
        }

        let shape = vec![n_points * n_points];
        let values = f(&Tensor::new(grid_x, shape.clone()), &Tensor::new(grid_y, shape)).to_vec();
        assert_eq!(
            values.len(),
            n_points * n_points,
            "Loss function must be element-wise over its inputs"
        );

        let z = values.chunks(n_points).map(<[f32]>::to_vec).collect();
        LossSurface { xs, ys, z }
    }

    /// Sample over the default plotting window
    pub fn sample_default<F>(f: F) -> Self
    where
        F: Fn(&Tensor, &Tensor) -> Tensor,
    {
        Self::sample(
            f,
            Self::DEFAULT_X_RANGE,
            Self::DEFAULT_Y_RANGE,
            Self::DEFAULT_POINTS,
        )
    }

    /// Lowest sampled point as (x, y, loss)
    pub fn argmin(&self) -> (f32, f32, f32) {
        let mut best = (self.xs[0], self.ys[0], self.z[0][0]);
        for (row, values) in self.z.iter().enumerate() {
            for (col, &v) in values.iter().enumerate() {
                if v.total_cmp(&best.2).is_lt() {
                    best = (self.xs[col], self.ys[row], v);
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landscape::functions::{bowl_loss, pathological_curve_loss};

    #[test]
    fn test_linspace_includes_ends() {
        assert_eq!(linspace(-1.0, 1.0, 5), vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    #[should_panic(expected = "at least 2 points")]
    fn test_linspace_too_few_points() {
        linspace(0.0, 1.0, 1);
    }

    #[test]
    fn test_surface_layout() {
        // f = x + 10 y makes row/column placement visible
        let surface = LossSurface::sample(
            |x, y| x.add(&y.mul_scalar(10.0)),
            [0.0, 1.0],
            [0.0, 2.0],
            3,
        );
        assert_eq!(surface.xs, vec![0.0, 0.5, 1.0]);
        assert_eq!(surface.ys, vec![0.0, 1.0, 2.0]);
        assert_eq!(surface.z.len(), 3);
        assert_eq!(surface.z[0], vec![0.0, 0.5, 1.0]);
        assert_eq!(surface.z[2], vec![20.0, 20.5, 21.0]);
    }

    #[test]
    fn test_bowl_argmin() {
        let surface = LossSurface::sample(bowl_loss, [-1.0, 1.0], [-1.0, 1.0], 5);
        assert_eq!(surface.argmin(), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_default_window() {
        let surface = LossSurface::sample_default(pathological_curve_loss);
        assert_eq!(surface.xs.len(), LossSurface::DEFAULT_POINTS);
        assert_eq!(surface.z.len(), LossSurface::DEFAULT_POINTS);
        assert_eq!(surface.xs[0], -2.0);
        assert_eq!(surface.ys[0], -1.0);
        assert!((surface.xs[LossSurface::DEFAULT_POINTS - 1] - 3.5).abs() < 1e-5);

        // sigmoid(y) keeps falling towards the bottom edge
        let (_, y_min, _) = surface.argmin();
        assert_eq!(y_min, -1.0);
    }
}
