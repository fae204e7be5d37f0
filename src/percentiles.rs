//! Ensemble percentile curves.
//!
//! Used two ways: as the bands of a fan chart (many percentiles) and as
//! summary reference curves (P10/P50/P90) appended to the ensemble so they can
//! serve as baselines. Percentiles use linear interpolation between the two
//! nearest order statistics, matching numpy's default.

use log::debug;

use crate::core::CurveMatrix;
use crate::errors::{LampError, Result};

/// Percentiles appended as reference curves.
pub const REFERENCE_PERCENTILES: [f64; 3] = [10.0, 50.0, 90.0];

/// Fan chart bands: 0, 10, …, 100.
pub fn fan_percentiles() -> Vec<f64> {
    (0..=10).map(|i| i as f64 * 10.0).collect()
}

/// `q`-th percentile (0..=100) of `values`, linearly interpolated.
pub fn percentile(values: &[f64], q: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(LampError::InvalidInput(
            "percentile of an empty sample".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&q) {
        return Err(LampError::InvalidArgument(format!(
            "percentile {} outside [0, 100]",
            q
        )));
    }
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q / 100.0 * (v.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Ok(v[lo] + (v[hi] - v[lo]) * (pos - lo as f64))
}

/// One curve per entry of `qs`: the percentile of the ensemble at every
/// timestep.
pub fn percentile_curves(curves: &CurveMatrix, qs: &[f64]) -> Result<Vec<Vec<f64>>> {
    debug!("Computing {} percentile curves", qs.len());
    let columns: Vec<Vec<f64>> = (0..curves.ntimesteps()).map(|t| curves.column(t)).collect();
    qs.iter()
        .map(|&q| columns.iter().map(|col| percentile(col, q)).collect())
        .collect()
}

/// Appends the `qs` percentile curves (named `P<q>`) after the ensemble.
///
/// Returns the augmented matrix and the indices of the new rows.
pub fn with_percentile_curves(curves: &CurveMatrix, qs: &[f64]) -> Result<(CurveMatrix, Vec<usize>)> {
    let extra = percentile_curves(curves, qs)?;
    let names = qs.iter().map(|q| format!("P{}", q)).collect();
    let first = curves.ncurves();
    let out = curves.append_rows(extra, Some(names))?;
    Ok((out, (first..first + qs.len()).collect()))
}
