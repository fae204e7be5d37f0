//! # Classical Multidimensional Scaling
//!
//! Embeds a precomputed N×N dissimilarity matrix in a `dims`-dimensional space.
//!
//! Two stages:
//!
//! 1. **Torgerson scaling**: double-centre the squared dissimilarities,
//!    `B = -½ J D² J` with `J = I - 11ᵀ/N`, and take the top `dims`
//!    eigenpairs of `B` (scaled by `√λ`, negative eigenvalues clamped to 0).
//! 2. **SMACOF refinement** (optional, on by default): Guttman-transform
//!    iterations that minimise raw stress `Σ_{i<j} (δ_ij(X) - d_ij)²`,
//!    starting from the Torgerson solution. Iteration stops once the
//!    normalised stress improves by less than `tolerance`, or after
//!    `max_iter` rounds.
//!
//! Identical input gives an identical embedding. The layout is only defined
//! up to rotation and reflection, so axis orientation is not stable across
//! different inputs.

use log::{debug, info, trace};
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

use crate::errors::{LampError, Result};

pub const MDS_DEFAULT_TOLERANCE: f64 = 1e-9;
pub const MDS_DEFAULT_MAX_ITER: usize = 500;
pub const MDS_MIN_INSTANCES: usize = 3;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MdsParams {
    pub tolerance: f64,
    pub max_iter: usize,
    /// Run SMACOF after the eigen solution.
    pub refine: bool,
}

impl Default for MdsParams {
    fn default() -> Self {
        Self {
            tolerance: MDS_DEFAULT_TOLERANCE,
            max_iter: MDS_DEFAULT_MAX_ITER,
            refine: true,
        }
    }
}

impl PartialEq for MdsParams {
    fn eq(&self, other: &Self) -> bool {
        self.max_iter == other.max_iter
            && self.refine == other.refine
            && approx::relative_eq!(self.tolerance, other.tolerance)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ClassicalMds {
    pub params: MdsParams,
}

impl ClassicalMds {
    pub fn new(params: MdsParams) -> Self {
        Self { params }
    }

    /// Embeds `dissimilarities` (N×N) into an N×`dims` configuration.
    ///
    /// # Errors
    /// - `InvalidArgument` if `dims < 2` or the matrix is not square
    /// - `InsufficientData` if N < 3
    /// - `InvalidInput` if any dissimilarity is negative or non-finite
    pub fn embed(&self, dissimilarities: &[Vec<f64>], dims: usize) -> Result<Vec<Vec<f64>>> {
        if dims < 2 {
            return Err(LampError::InvalidArgument(format!(
                "invalid number of dimensions {} < 2",
                dims
            )));
        }
        let n = dissimilarities.len();
        if n < MDS_MIN_INSTANCES {
            return Err(LampError::InsufficientData {
                required: MDS_MIN_INSTANCES,
                found: n,
            });
        }
        if dissimilarities.iter().any(|r| r.len() != n) {
            return Err(LampError::InvalidArgument(
                "dissimilarity matrix must be square".to_string(),
            ));
        }
        if dissimilarities
            .iter()
            .flatten()
            .any(|d| !d.is_finite() || *d < 0.0)
        {
            return Err(LampError::InvalidInput(
                "dissimilarities must be finite and non-negative".to_string(),
            ));
        }

        info!("MDS embedding of {} instances into {} dimensions", n, dims);
        let mut config = torgerson(dissimilarities, dims);

        if self.params.refine {
            let iters = smacof(
                dissimilarities,
                &mut config,
                self.params.tolerance,
                self.params.max_iter,
            );
            debug!(
                "SMACOF stopped after {} iterations, stress {:.6e}",
                iters,
                stress(dissimilarities, &config)
            );
        }
        Ok(config)
    }
}

/// Raw stress `Σ_{i<j} (‖c_i - c_j‖ - d_ij)²` of a configuration.
pub fn stress(dissimilarities: &[Vec<f64>], config: &[Vec<f64>]) -> f64 {
    let n = config.len();
    let mut s = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let diff = euclid(&config[i], &config[j]) - dissimilarities[i][j];
            s += diff * diff;
        }
    }
    s
}

#[inline]
fn euclid(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn torgerson(d: &[Vec<f64>], dims: usize) -> Vec<Vec<f64>> {
    let n = d.len();
    let sq = DMatrix::from_fn(n, n, |i, j| d[i][j] * d[i][j]);
    let row_means: Vec<f64> = (0..n).map(|i| sq.row(i).sum() / n as f64).collect();
    let col_means: Vec<f64> = (0..n).map(|j| sq.column(j).sum() / n as f64).collect();
    let grand = row_means.iter().sum::<f64>() / n as f64;

    let b = DMatrix::from_fn(n, n, |i, j| {
        -0.5 * (sq[(i, j)] - row_means[i] - col_means[j] + grand)
    });

    let eig = SymmetricEigen::new(b);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&x, &y| {
        eig.eigenvalues[y]
            .partial_cmp(&eig.eigenvalues[x])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    trace!(
        "Leading eigenvalues: {:?}",
        order.iter().take(dims).map(|&k| eig.eigenvalues[k]).collect::<Vec<_>>()
    );

    let mut config = vec![vec![0.0; dims]; n];
    // fewer than `dims` eigenpairs only when n < dims; leave those axes at 0
    for (axis, &k) in order.iter().take(dims).enumerate() {
        let scale = eig.eigenvalues[k].max(0.0).sqrt();
        for (i, point) in config.iter_mut().enumerate() {
            point[axis] = eig.eigenvectors[(i, k)] * scale;
        }
    }
    config
}

/// Guttman-transform iterations in place; returns the iteration count.
fn smacof(d: &[Vec<f64>], config: &mut Vec<Vec<f64>>, tol: f64, max_iter: usize) -> usize {
    let n = d.len();
    let dims = config.first().map(|p| p.len()).unwrap_or(0);
    let norm: f64 = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .map(|(i, j)| d[i][j] * d[i][j])
        .sum();
    if norm <= 0.0 {
        // all dissimilarities are zero: the eigen solution is already exact
        return 0;
    }

    let mut prev = stress(d, config) / norm;
    for it in 0..max_iter {
        let mut next = vec![vec![0.0; dims]; n];
        for i in 0..n {
            let mut diag = 0.0;
            for j in 0..n {
                if i == j {
                    continue;
                }
                let delta = euclid(&config[i], &config[j]);
                let bij = if delta > f64::EPSILON { -d[i][j] / delta } else { 0.0 };
                diag -= bij;
                for k in 0..dims {
                    next[i][k] += bij * config[j][k];
                }
            }
            for k in 0..dims {
                next[i][k] += diag * config[i][k];
                next[i][k] /= n as f64;
            }
        }
        *config = next;

        let current = stress(d, config) / norm;
        trace!("SMACOF iteration {}: normalised stress {:.6e}", it, current);
        if prev - current < tol {
            return it + 1;
        }
        prev = current;
    }
    max_iter
}
