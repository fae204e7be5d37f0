//! # Local Affine Multidimensional Projection (LAMP)
//!
//! Places points from a K-dimensional space into a D-dimensional target space
//! using a set of control points whose positions in both spaces are known.
//!
//! For every point `x`:
//!
//! 1. weights `α_i = 1 / max(‖Xs_i − x‖, tol)`, the `tol` floor guarding the
//!    division when `x` coincides with a control point;
//! 2. weighted centroids `x̃ = Σα_i Xs_i / Σα_i`, `ỹ = Σα_i Ys_i / Σα_i`;
//! 3. centred controls `x̂_i = Xs_i − x̃`, `ŷ_i = Ys_i − ỹ`;
//! 4. `A_i = √α_i x̂_i`, `B_i = √α_i ŷ_i`, and the SVD `AᵀB = UΣVᵀ`;
//! 5. orthogonal map `M = U Vᵀ` (K×D);
//! 6. `y = (x − x̃) M + ỹ`.
//!
//! Points are independent of each other, so rows are projected in parallel;
//! output order always matches input order. Control points are never
//! appended to the output.

use log::{debug, info, trace};
use nalgebra::{DMatrix, SVD};
use rayon::prelude::*;

use crate::core::uniform_width;
use crate::errors::{LampError, Result};

pub const LAMP_DEFAULT_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Copy, Debug)]
pub struct Lamp {
    pub tolerance: f64,
}

impl Default for Lamp {
    fn default() -> Self {
        Self {
            tolerance: LAMP_DEFAULT_TOLERANCE,
        }
    }
}

impl Lamp {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Projects every row of `x` (M×K) given controls `xs` (C×K) placed at
    /// `ys` (C×D). Returns an M×D matrix.
    ///
    /// # Errors
    /// - `DimensionMismatch` if `xs` and `ys` row counts differ, if `x` and
    ///   `xs` column counts differ, or if any input is ragged
    /// - `InvalidArgument` if there are no control points
    pub fn project(
        &self,
        x: &[Vec<f64>],
        xs: &[Vec<f64>],
        ys: &[Vec<f64>],
    ) -> Result<Vec<Vec<f64>>> {
        if xs.is_empty() {
            return Err(LampError::InvalidArgument(
                "LAMP needs at least one control point".to_string(),
            ));
        }
        if xs.len() != ys.len() {
            return Err(LampError::DimensionMismatch(format!(
                "{} control points in the original space, {} in the projected space",
                xs.len(),
                ys.len()
            )));
        }
        let k = uniform_width(xs).ok_or_else(|| {
            LampError::DimensionMismatch("control points have different lengths".to_string())
        })?;
        let d = uniform_width(ys).ok_or_else(|| {
            LampError::DimensionMismatch("projected controls have different lengths".to_string())
        })?;
        if let Some(bad) = x.iter().position(|r| r.len() != k) {
            return Err(LampError::DimensionMismatch(format!(
                "point {} has {} columns, control points have {}",
                bad,
                x[bad].len(),
                k
            )));
        }

        info!(
            "LAMP: projecting {} points with {} controls ({} -> {} dims)",
            x.len(),
            xs.len(),
            k,
            d
        );
        debug!("LAMP tolerance {:e}", self.tolerance);

        x.par_iter()
            .map(|point| self.project_point(point, xs, ys, k, d))
            .collect()
    }

    fn project_point(
        &self,
        point: &[f64],
        xs: &[Vec<f64>],
        ys: &[Vec<f64>],
        k: usize,
        d: usize,
    ) -> Result<Vec<f64>> {
        let c = xs.len();

        // Eq. 2
        let alphas: Vec<f64> = xs
            .iter()
            .map(|ctrl| {
                let dist = ctrl
                    .iter()
                    .zip(point)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt();
                1.0 / dist.max(self.tolerance)
            })
            .collect();
        let sum_alpha: f64 = alphas.iter().sum();

        // Eq. 3
        let mut x_tilde = vec![0.0; k];
        let mut y_tilde = vec![0.0; d];
        for i in 0..c {
            for j in 0..k {
                x_tilde[j] += alphas[i] * xs[i][j];
            }
            for j in 0..d {
                y_tilde[j] += alphas[i] * ys[i][j];
            }
        }
        x_tilde.iter_mut().for_each(|v| *v /= sum_alpha);
        y_tilde.iter_mut().for_each(|v| *v /= sum_alpha);

        // Eq. 4 and 6
        let a = DMatrix::from_fn(c, k, |i, j| alphas[i].sqrt() * (xs[i][j] - x_tilde[j]));
        let b = DMatrix::from_fn(c, d, |i, j| alphas[i].sqrt() * (ys[i][j] - y_tilde[j]));

        // Eq. 7
        let svd = SVD::new(a.transpose() * b, true, true);
        let u = svd
            .u
            .as_ref()
            .ok_or_else(|| LampError::Decomposition("SVD returned no U factor".to_string()))?;
        let v_t = svd
            .v_t
            .as_ref()
            .ok_or_else(|| LampError::Decomposition("SVD returned no Vᵀ factor".to_string()))?;

        // Eq. 8
        let m = u * v_t;
        trace!("LAMP orthogonal map {}×{}", m.nrows(), m.ncols());

        let centred = DMatrix::from_fn(1, k, |_, j| point[j] - x_tilde[j]);
        let y = centred * m;
        Ok((0..d).map(|j| y[(0, j)] + y_tilde[j]).collect())
    }
}
