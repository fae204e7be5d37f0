//! CurveMatrix: the immutable N×T ensemble every other module reads from.
//!
//! Rows are curves (ensemble members), columns are timesteps. Storage is a
//! dense row-major buffer so that row slices are zero-copy; conversion to and
//! from smartcore's `DenseMatrix` is provided for callers that already hold
//! their data in that form.
//!
//! # Examples
//!
//! ```
//! use lampview::core::CurveMatrix;
//!
//! let curves = CurveMatrix::new(vec![
//!     vec![0.0, 1.0, 2.0],
//!     vec![0.0, 2.0, 4.0],
//! ]).unwrap();
//!
//! assert_eq!(curves.shape(), (2, 3));
//! assert_eq!(curves.row(1), &[0.0, 2.0, 4.0]);
//! ```
//!
//! # Panics
//!
//! - `row` and `get` panic on out-of-bounds indices, like slice indexing.
//!   Fallible, user-facing paths validate indices before reaching them.

use log::{debug, warn};
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::errors::{LampError, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct CurveMatrix {
    values: Vec<f64>, // row-major, ncurves × ntimesteps
    ncurves: usize,
    ntimesteps: usize,
    names: Option<Vec<String>>,
}

impl CurveMatrix {
    /// Builds a matrix from one `Vec` per curve.
    ///
    /// Fails with `InvalidArgument` on an empty ensemble or ragged rows and
    /// with `InvalidInput` if any value is NaN or infinite.
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self> {
        let ncurves = rows.len();
        let ntimesteps = rows.first().map(|r| r.len()).unwrap_or(0);
        if ncurves == 0 || ntimesteps == 0 {
            return Err(LampError::InvalidArgument(
                "curve matrix must have at least one curve and one timestep".to_string(),
            ));
        }
        if let Some(bad) = rows.iter().position(|r| r.len() != ntimesteps) {
            return Err(LampError::InvalidArgument(format!(
                "curve {} has {} timesteps, expected {}",
                bad,
                rows[bad].len(),
                ntimesteps
            )));
        }
        let values: Vec<f64> = rows.into_iter().flatten().collect();
        Self::from_flat(values, ncurves, ntimesteps)
    }

    /// Builds a matrix from a row-major buffer.
    pub fn from_flat(values: Vec<f64>, ncurves: usize, ntimesteps: usize) -> Result<Self> {
        if ncurves == 0 || ntimesteps == 0 {
            return Err(LampError::InvalidArgument(
                "curve matrix must have at least one curve and one timestep".to_string(),
            ));
        }
        if values.len() != ncurves * ntimesteps {
            return Err(LampError::DimensionMismatch(format!(
                "buffer holds {} values, shape {}x{} needs {}",
                values.len(),
                ncurves,
                ntimesteps,
                ncurves * ntimesteps
            )));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(LampError::InvalidInput(format!(
                "non-finite value at curve {}, timestep {}",
                pos / ntimesteps,
                pos % ntimesteps
            )));
        }
        debug!("CurveMatrix created: {} curves × {} timesteps", ncurves, ntimesteps);
        Ok(Self {
            values,
            ncurves,
            ntimesteps,
            names: None,
        })
    }

    /// Copies a smartcore matrix (rows are curves).
    pub fn from_dense(dense: &DenseMatrix<f64>) -> Result<Self> {
        let (n, t) = dense.shape();
        let mut values = Vec::with_capacity(n * t);
        for i in 0..n {
            values.extend(dense.get_row(i).iterator(0).copied());
        }
        Self::from_flat(values, n, t)
    }

    /// Exports the curves as a row-major smartcore matrix.
    pub fn to_dense(&self) -> DenseMatrix<f64> {
        DenseMatrix::from_iterator(
            self.values.iter().copied(),
            self.ncurves,
            self.ntimesteps,
            0,
        )
    }

    /// Attaches display names, matched 1:1 with rows.
    ///
    /// Names are best-effort metadata: a length mismatch is logged and the
    /// names that do line up are kept.
    pub fn with_names(mut self, names: Vec<String>) -> Self {
        if names.len() != self.ncurves {
            warn!(
                "Got {} curve names for {} curves; unmatched rows fall back to index labels",
                names.len(),
                self.ncurves
            );
        }
        self.names = Some(names);
        self
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.ncurves, self.ntimesteps)
    }

    #[inline]
    pub fn ncurves(&self) -> usize {
        self.ncurves
    }

    #[inline]
    pub fn ntimesteps(&self) -> usize {
        self.ntimesteps
    }

    /// Zero-copy view of curve `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        assert!(i < self.ncurves, "Curve index out of bounds");
        let start = i * self.ntimesteps;
        &self.values[start..start + self.ntimesteps]
    }

    #[inline]
    pub fn get(&self, i: usize, t: usize) -> f64 {
        assert!(t < self.ntimesteps, "Timestep index out of bounds");
        self.row(i)[t]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.values.chunks_exact(self.ntimesteps)
    }

    /// Column `t` across all curves.
    pub fn column(&self, t: usize) -> Vec<f64> {
        assert!(t < self.ntimesteps, "Timestep index out of bounds");
        self.rows().map(|r| r[t]).collect()
    }

    /// Owned copy of every curve, `curves[:, :]`.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows().map(|r| r.to_vec()).collect()
    }

    /// Owned `curves[:, start:end:step]`; `end` is clamped to T.
    pub fn slice_columns(&self, start: usize, end: usize, step: usize) -> Vec<Vec<f64>> {
        let end = end.min(self.ntimesteps);
        let step = step.max(1);
        self.rows()
            .map(|r| {
                if start >= end {
                    Vec::new()
                } else {
                    r[start..end].iter().step_by(step).copied().collect()
                }
            })
            .collect()
    }

    /// Returns a new matrix with `extra` rows appended. Rows without a name
    /// on either side get an empty one.
    pub fn append_rows(
        &self,
        extra: Vec<Vec<f64>>,
        extra_names: Option<Vec<String>>,
    ) -> Result<Self> {
        let added = extra.len();
        let mut rows = self.to_rows();
        rows.extend(extra);
        let mut out = Self::new(rows)?;
        if self.names.is_some() || extra_names.is_some() {
            let mut all = self.names.clone().unwrap_or_default();
            all.resize(self.ncurves, String::new());
            let mut more = extra_names.unwrap_or_default();
            more.resize(added, String::new());
            all.extend(more);
            out.names = Some(all);
        }
        Ok(out)
    }

    pub fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    /// Display name for curve `i`.
    ///
    /// Missing or empty names degrade to `"Curve <i>"` with a warning; this is
    /// a presentation helper and never fails.
    pub fn curve_name(&self, i: usize) -> String {
        match self.names.as_ref().and_then(|n| n.get(i)) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => {
                warn!("No name for curve {}, using its index", i);
                format!("Curve {}", i)
            }
        }
    }
}

/// Pads (with zeros) or leaves untouched every row so that all rows are
/// exactly `width` long. Rows longer than `width` are returned unchanged.
pub fn zero_pad(rows: &[Vec<f64>], width: usize) -> Vec<Vec<f64>> {
    rows.iter()
        .map(|r| {
            let mut out = r.clone();
            if out.len() < width {
                out.resize(width, 0.0);
            }
            out
        })
        .collect()
}

/// Column count shared by every row, or `None` for ragged/empty input.
pub(crate) fn uniform_width(rows: &[Vec<f64>]) -> Option<usize> {
    let w = rows.first()?.len();
    rows.iter().all(|r| r.len() == w).then_some(w)
}
