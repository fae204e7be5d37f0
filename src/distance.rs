//! Pairwise distances over row vectors.
//!
//! - `pairwise`: full symmetric N×N matrix with zero diagonal
//! - `baseline_distances`: a single row of that matrix, without building it
//!
//! All metrics are deterministic and never produce NaN: correlation and
//! cosine on flat/zero rows resolve to 0 for identical rows and 1 otherwise.

use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::uniform_width;
use crate::errors::{check_index, LampError, Result};

/// Below this, a row's spread/norm is treated as zero.
pub const DEGENERATE_FLOOR: f64 = 1e-12;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    SqEuclidean,
    Manhattan,
    Chebyshev,
    /// 1 − Pearson correlation.
    Correlation,
    /// 1 − cosine similarity.
    Cosine,
}

impl DistanceMetric {
    /// Distance between two equal-length rows.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len(), "Dimension mismatch");
        match self {
            DistanceMetric::Euclidean => sq_euclidean(a, b).sqrt(),
            DistanceMetric::SqEuclidean => sq_euclidean(a, b),
            DistanceMetric::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Chebyshev => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).abs())
                .fold(0.0, f64::max),
            DistanceMetric::Correlation => {
                let ma = mean(a);
                let mb = mean(b);
                let ca: Vec<f64> = a.iter().map(|x| x - ma).collect();
                let cb: Vec<f64> = b.iter().map(|x| x - mb).collect();
                one_minus_cosine(&ca, &cb, a, b)
            }
            DistanceMetric::Cosine => one_minus_cosine(a, b, a, b),
        }
    }
}

#[inline]
fn sq_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[inline]
fn mean(a: &[f64]) -> f64 {
    if a.is_empty() {
        0.0
    } else {
        a.iter().sum::<f64>() / a.len() as f64
    }
}

/// `1 - cos(u, v)`; `orig_*` decide the degenerate case.
fn one_minus_cosine(u: &[f64], v: &[f64], orig_a: &[f64], orig_b: &[f64]) -> f64 {
    let nu = u.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nv = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if nu <= DEGENERATE_FLOOR || nv <= DEGENERATE_FLOOR {
        return if orig_a == orig_b { 0.0 } else { 1.0 };
    }
    let dot: f64 = u.iter().zip(v).map(|(x, y)| x * y).sum();
    // clamp rounding noise so identical rows give exactly 0
    (1.0 - dot / (nu * nv)).max(0.0)
}

fn validate_rows(rows: &[Vec<f64>]) -> Result<usize> {
    if rows.len() < 2 {
        return Err(LampError::InvalidInput(format!(
            "pairwise distances need at least 2 rows, got {}",
            rows.len()
        )));
    }
    let width = uniform_width(rows)
        .ok_or_else(|| LampError::InvalidInput("rows have different lengths".to_string()))?;
    if rows.iter().flatten().any(|v| !v.is_finite()) {
        return Err(LampError::InvalidInput(
            "rows contain non-finite values".to_string(),
        ));
    }
    Ok(width)
}

/// Symmetric N×N distance matrix of `rows` under `metric`.
///
/// Fails with `InvalidInput` if there are fewer than 2 rows, the rows are
/// ragged, or any value is not finite.
pub fn pairwise(rows: &[Vec<f64>], metric: DistanceMetric) -> Result<Vec<Vec<f64>>> {
    let width = validate_rows(rows)?;
    let n = rows.len();
    debug!("Pairwise {:?} distances: {} rows × {} columns", metric, n, width);

    // upper triangle per row, mirrored afterwards
    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| metric.distance(&rows[i], &rows[j]))
                .collect()
        })
        .collect();

    let mut d = vec![vec![0.0; n]; n];
    for (i, row) in upper.into_iter().enumerate() {
        for (off, dist) in row.into_iter().enumerate() {
            let j = i + 1 + off;
            d[i][j] = dist;
            d[j][i] = dist;
        }
    }
    trace!("Pairwise matrix filled");
    Ok(d)
}

/// Row `baseline` of `pairwise(rows, metric)`.
pub fn baseline_distances(
    rows: &[Vec<f64>],
    baseline: usize,
    metric: DistanceMetric,
) -> Result<Vec<f64>> {
    validate_rows(rows)?;
    check_index(baseline, rows.len())?;
    let base = &rows[baseline];
    Ok(rows
        .iter()
        .enumerate()
        .map(|(j, r)| if j == baseline { 0.0 } else { metric.distance(base, r) })
        .collect())
}
