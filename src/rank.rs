//! Baseline rankings (bump chart) and baseline distances (distance chart).
//!
//! For every timestep `t` (1-based, `1..=T`) the curves are compared with the
//! baseline over `curves[:, 0:t]` (or the trailing `window` samples), and the
//! non-baseline curves are ranked by that distance.
//!
//! - Ties: a non-baseline curve at exactly zero distance gets `RANK_JITTER`
//!   added; equal distances then keep index order (stable sort).
//! - Ascending ranks are `0..N-1` over the N-1 ranked curves; inverted ranks
//!   (farthest first) are `1..=N-1`.
//! - The baseline slot keeps its default value and is reported as `None`.

use std::ops::Range;

use log::{debug, info, trace};
use rayon::prelude::*;

use crate::core::CurveMatrix;
use crate::distance::{baseline_distances, DistanceMetric};
use crate::errors::{check_index, LampError, Result};

/// Added to non-baseline zero distances before ranking.
pub const RANK_JITTER: f64 = 1e-6;

/// N×T ranks relative to one baseline curve.
#[derive(Clone, Debug, PartialEq)]
pub struct RankMatrix {
    ranks: Vec<usize>, // row-major, ncurves × ntimesteps
    ncurves: usize,
    ntimesteps: usize,
    baseline: usize,
    inverted: bool,
}

impl RankMatrix {
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.ncurves, self.ntimesteps)
    }

    #[inline]
    pub fn baseline(&self) -> usize {
        self.baseline
    }

    #[inline]
    pub fn inverted(&self) -> bool {
        self.inverted
    }

    /// Rank of curve `i` at column `t`; `None` for the baseline or when out
    /// of bounds.
    pub fn rank(&self, i: usize, t: usize) -> Option<usize> {
        if i == self.baseline || i >= self.ncurves || t >= self.ntimesteps {
            return None;
        }
        Some(self.ranks[i * self.ntimesteps + t])
    }

    /// Raw entry, including the baseline's unused default.
    pub fn raw(&self, i: usize, t: usize) -> usize {
        self.ranks[i * self.ntimesteps + t]
    }

    /// Rank series of curve `i` over time; `None` for the baseline.
    pub fn series(&self, i: usize) -> Option<&[usize]> {
        if i == self.baseline || i >= self.ncurves {
            return None;
        }
        let start = i * self.ntimesteps;
        Some(&self.ranks[start..start + self.ntimesteps])
    }

    /// Ranks of every curve at column `t`, baseline as `None`.
    pub fn column(&self, t: usize) -> Vec<Option<usize>> {
        (0..self.ncurves).map(|i| self.rank(i, t)).collect()
    }
}

/// Ranking configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RankEngine {
    pub metric: DistanceMetric,
    /// Trailing samples per comparison; `None` uses everything up to `t`.
    pub window: Option<usize>,
    pub inverted: bool,
}

impl RankEngine {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            ..Default::default()
        }
    }

    pub fn with_window(mut self, window: Option<usize>) -> Self {
        self.window = window;
        self
    }

    pub fn with_inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    /// Ranks every curve against `baseline` at every timestep.
    ///
    /// # Errors
    /// - `IndexOutOfRange` if `baseline >= N`
    /// - `InvalidInput` with fewer than two curves
    /// - `InvalidArgument` if the window is zero or longer than the series
    pub fn rank(&self, curves: &CurveMatrix, baseline: usize) -> Result<RankMatrix> {
        let (n, t_len) = curves.shape();
        check_index(baseline, n)?;
        if n < 2 {
            return Err(LampError::InvalidInput(
                "ranking needs at least 2 curves".to_string(),
            ));
        }
        if let Some(w) = self.window {
            if w == 0 || w > t_len {
                return Err(LampError::InvalidArgument(format!(
                    "window length {} must be in [1, {}]",
                    w, t_len
                )));
            }
        }
        info!(
            "Ranking {} curves over {} timesteps against baseline {} ({:?}, inverted={})",
            n, t_len, baseline, self.metric, self.inverted
        );

        // one column per timestep, computed independently
        let columns: Vec<Vec<usize>> = (1..=t_len)
            .into_par_iter()
            .map(|t| {
                let lo = self.window.map(|w| t - w.min(t)).unwrap_or(0);
                self.rank_column(curves, baseline, lo..t)
            })
            .collect();

        let mut ranks = vec![0usize; n * t_len];
        for (t, col) in columns.into_iter().enumerate() {
            for (i, r) in col.into_iter().enumerate() {
                ranks[i * t_len + t] = r;
            }
        }
        debug!("Rank matrix {}x{} built", n, t_len);

        Ok(RankMatrix {
            ranks,
            ncurves: n,
            ntimesteps: t_len,
            baseline,
            inverted: self.inverted,
        })
    }

    fn rank_column(&self, curves: &CurveMatrix, baseline: usize, cols: Range<usize>) -> Vec<usize> {
        let n = curves.ncurves();
        let base = &curves.row(baseline)[cols.clone()];

        let mut dists: Vec<(usize, f64)> = (0..n)
            .filter(|&i| i != baseline)
            .map(|i| {
                let d = self.metric.distance(base, &curves.row(i)[cols.clone()]);
                if d == 0.0 {
                    (i, d + RANK_JITTER)
                } else {
                    (i, d)
                }
            })
            .collect();

        if self.inverted {
            dists.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        } else {
            dists.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        }
        trace!("Column {:?}: order {:?}", cols, dists.iter().map(|d| d.0).collect::<Vec<_>>());

        let offset = usize::from(self.inverted);
        let mut column = vec![0usize; n];
        for (pos, (i, _)) in dists.into_iter().enumerate() {
            column[i] = pos + offset;
        }
        column
    }
}

/// Ranks `curves` against `baseline`; see [`RankEngine::rank`].
pub fn rank(
    curves: &CurveMatrix,
    baseline: usize,
    metric: DistanceMetric,
    window: Option<usize>,
    inverted: bool,
) -> Result<RankMatrix> {
    RankEngine::new(metric)
        .with_window(window)
        .with_inverted(inverted)
        .rank(curves, baseline)
}

/// Distance of every curve from the baseline over `columns`, as plotted by
/// the distance chart. With `log_scale` values are `log10`, and the infinities
/// this produces (the baseline itself) are mapped to 0.
pub fn baseline_distance_values(
    curves: &CurveMatrix,
    baseline: usize,
    metric: DistanceMetric,
    columns: Range<usize>,
    log_scale: bool,
) -> Result<Vec<f64>> {
    let (n, t_len) = curves.shape();
    check_index(baseline, n)?;
    if columns.start >= columns.end || columns.end > t_len {
        return Err(LampError::InvalidRange(format!(
            "columns {:?} do not fit a series of {} timesteps",
            columns, t_len
        )));
    }
    let sliced = curves.slice_columns(columns.start, columns.end, 1);
    let values = baseline_distances(&sliced, baseline, metric)?;
    if !log_scale {
        return Ok(values);
    }
    Ok(values
        .into_iter()
        .map(|d| {
            let l = d.log10();
            if l.is_infinite() {
                0.0
            } else {
                l
            }
        })
        .collect())
}

/// Group selection on the bump chart: curves ranked strictly below
/// `threshold` at column `t` that pass `is_normal`.
pub fn select_below_rank(
    ranks: &RankMatrix,
    t: usize,
    threshold: f64,
    is_normal: impl Fn(usize) -> bool,
) -> Vec<usize> {
    (0..ranks.ncurves)
        .filter(|&i| is_normal(i))
        .filter(|&i| matches!(ranks.rank(i, t), Some(r) if (r as f64) < threshold))
        .collect()
}

/// Group selection on the distance chart: curves whose value is at or
/// below `threshold` that pass `is_normal`.
pub fn select_below_distance(
    values: &[f64],
    threshold: f64,
    is_normal: impl Fn(usize) -> bool,
) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|&(i, &v)| is_normal(i) && v <= threshold)
        .map(|(i, _)| i)
        .collect()
}
