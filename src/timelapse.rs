//! # Time-lapse projection
//!
//! Turns every curve of an N×T ensemble into a 2-D path that grows with the
//! revealed time window:
//!
//! 1. **Control points**: classical MDS over `curves[:, start:end:step]` places
//!    all N curves in 2-D once per window.
//! 2. **Frames**: for every `t` in `start+2 ..= end`, LAMP projects the slice
//!    `curves[:, start:t]` against the full-width curves (controls in the
//!    original space) and the MDS layout (controls in the target space).
//! 3. **Paths**: frame `k` contributes point `k` of every curve's path, so a
//!    window of `end - start` timesteps yields `end - start - 1` points (two
//!    timesteps are needed before the first point exists).
//!
//! The slice and the controls generally differ in width; the narrower side is
//! zero-padded, so the control identity stays fixed across the animation while
//! the control geometry changes from frame to frame.
//!
//! Results are immutable (`TimeLapseProjection`) and shared through `Arc`, so
//! a recompute replaces them wholesale and never patches a live projection.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::{zero_pad, CurveMatrix};
use crate::distance::{pairwise, DistanceMetric};
use crate::errors::{check_index, LampError, Result};
use crate::lamp::Lamp;
use crate::mds::{ClassicalMds, MdsParams};

/// Target dimensionality; the views only ever draw planar paths.
pub const PROJECTION_DIMS: usize = 2;

/// Half-open timestep window `[start, end)` sampled every `step` for MDS.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: usize,
    pub end: usize,
    pub step: usize,
}

impl TimeWindow {
    pub fn new(start: usize, end: usize, step: usize) -> Self {
        Self { start, end, step }
    }

    /// `[0, ntimesteps)` with unit step.
    pub fn full(ntimesteps: usize) -> Self {
        Self::new(0, ntimesteps, 1)
    }

    /// Checks the window against a series of `ntimesteps` samples.
    pub fn validate(&self, ntimesteps: usize) -> Result<()> {
        if self.start >= self.end {
            return Err(LampError::InvalidRange(format!(
                "start {} is larger or equal to end {}",
                self.start, self.end
            )));
        }
        if self.step == 0 {
            return Err(LampError::InvalidRange("step must be positive".to_string()));
        }
        if self.step >= self.end - self.start {
            return Err(LampError::InvalidRange(format!(
                "step {} is larger than the range [{}, {})",
                self.step, self.start, self.end
            )));
        }
        if self.end > ntimesteps {
            return Err(LampError::InvalidRange(format!(
                "end {} exceeds the series length {}",
                self.end, ntimesteps
            )));
        }
        Ok(())
    }

    /// Keeps `previous` when it still fits `ntimesteps`, otherwise falls
    /// back to the full range.
    pub fn fit_or_full(previous: Option<TimeWindow>, ntimesteps: usize) -> Self {
        match previous {
            Some(w) if w.validate(ntimesteps).is_ok() => w,
            Some(w) => {
                warn!(
                    "Window [{}, {}) step {} does not fit {} timesteps, using the full range",
                    w.start, w.end, w.step, ntimesteps
                );
                Self::full(ntimesteps)
            }
            None => Self::full(ntimesteps),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Points per projected path.
    #[inline]
    pub fn path_len(&self) -> usize {
        self.len().saturating_sub(1)
    }

    /// Absolute timestep of the last sample folded into path point `k`.
    #[inline]
    pub fn timestep_of(&self, k: usize) -> usize {
        self.start + k + 1
    }
}

/// A finished projection: control points plus one frame per path step.
#[derive(Clone, Debug)]
pub struct TimeLapseProjection {
    window: TimeWindow,
    control_points: Vec<Vec<f64>>,
    frames: Arc<Vec<Vec<[f64; 2]>>>, // frames[k][curve]
    ncurves: usize,
}

impl TimeLapseProjection {
    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// N×2 MDS layout used as the target-space controls.
    pub fn control_points(&self) -> &[Vec<f64>] {
        &self.control_points
    }

    pub fn ncurves(&self) -> usize {
        self.ncurves
    }

    pub fn nframes(&self) -> usize {
        self.frames.len()
    }

    /// All curves' positions at path step `k`.
    pub fn frame(&self, k: usize) -> Option<&[[f64; 2]]> {
        self.frames.get(k).map(|f| f.as_slice())
    }

    pub fn path(&self, curve: usize) -> Result<ProjectionPath> {
        check_index(curve, self.ncurves)?;
        Ok(ProjectionPath {
            frames: Arc::clone(&self.frames),
            curve,
        })
    }

    /// One path per curve, in row order.
    pub fn paths(&self) -> Vec<ProjectionPath> {
        (0..self.ncurves)
            .map(|curve| ProjectionPath {
                frames: Arc::clone(&self.frames),
                curve,
            })
            .collect()
    }

    /// Closest projected point to `(x, y)` among curves not in `hidden`.
    pub fn nearest_point(&self, x: f64, y: f64, hidden: &BTreeSet<usize>) -> Option<PickedPoint> {
        self.frames
            .par_iter()
            .enumerate()
            .flat_map_iter(|(k, frame)| {
                frame
                    .iter()
                    .enumerate()
                    .filter(move |(curve, _)| !hidden.contains(curve))
                    .map(move |(curve, p)| {
                        let d2 = (p[0] - x) * (p[0] - x) + (p[1] - y) * (p[1] - y);
                        (curve, k, d2)
                    })
            })
            // ties go to the lowest (curve, step)
            .min_by(|a, b| {
                a.2.partial_cmp(&b.2)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
                    .then(a.1.cmp(&b.1))
            })
            .map(|(curve, k, d2)| PickedPoint {
                curve,
                path_index: k,
                timestep: self.window.timestep_of(k),
                distance: d2.sqrt(),
            })
    }
}

/// Lazy view of one curve's path over shared frames.
///
/// Iterating is allocation-free and can be restarted at will; the frames are
/// shared with every other path from the same projection.
#[derive(Clone, Debug)]
pub struct ProjectionPath {
    frames: Arc<Vec<Vec<[f64; 2]>>>,
    curve: usize,
}

impl ProjectionPath {
    pub fn curve(&self) -> usize {
        self.curve
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, k: usize) -> Option<[f64; 2]> {
        self.frames.get(k).map(|f| f[self.curve])
    }

    pub fn points(&self) -> impl ExactSizeIterator<Item = [f64; 2]> + '_ {
        self.frames.iter().map(move |f| f[self.curve])
    }

    pub fn to_vec(&self) -> Vec<[f64; 2]> {
        self.points().collect()
    }
}

impl<'a> IntoIterator for &'a ProjectionPath {
    type Item = [f64; 2];
    type IntoIter = Box<dyn ExactSizeIterator<Item = [f64; 2]> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.points())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickedPoint {
    pub curve: usize,
    /// Index into the curve's path.
    pub path_index: usize,
    /// Absolute timestep of that path point.
    pub timestep: usize,
    pub distance: f64,
}

/// MDS layout of `curves[:, start:end:step]` (Euclidean dissimilarities).
pub fn control_points(
    curves: &CurveMatrix,
    window: TimeWindow,
    mds: &ClassicalMds,
) -> Result<Vec<Vec<f64>>> {
    let sampled = curves.slice_columns(window.start, window.end, window.step);
    debug!(
        "Control points from {} sampled timesteps",
        sampled.first().map(|r| r.len()).unwrap_or(0)
    );
    let d = pairwise(&sampled, DistanceMetric::Euclidean)?;
    mds.embed(&d, PROJECTION_DIMS)
}

/// Runs LAMP once per step `t` in `start+2 ..= end` and returns the frames.
///
/// `data` supplies the growing slices, `controls_orig`/`controls_proj` the
/// control pairs. Whichever of slice and controls is narrower is zero-padded.
pub fn time_lapse_lamp(
    data: &CurveMatrix,
    controls_orig: &[Vec<f64>],
    controls_proj: &[Vec<f64>],
    start: usize,
    end: usize,
    lamp: &Lamp,
) -> Result<Vec<Vec<Vec<f64>>>> {
    let end = end.min(data.ntimesteps());
    let ctrl_width = controls_orig.first().map(|r| r.len()).unwrap_or(0);
    let mut frames = Vec::with_capacity(end.saturating_sub(start + 1));

    for t in (start + 2)..=end {
        let slice = data.slice_columns(start, t, 1);
        let width = t - start;
        let frame = if width < ctrl_width {
            lamp.project(&zero_pad(&slice, ctrl_width), controls_orig, controls_proj)?
        } else if width > ctrl_width {
            lamp.project(&slice, &zero_pad(controls_orig, width), controls_proj)?
        } else {
            lamp.project(&slice, controls_orig, controls_proj)?
        };
        trace!("Frame for t={} projected", t);
        frames.push(frame);
    }
    Ok(frames)
}

/// Full projection pipeline for `window`; validates first.
pub fn compute_projection(
    curves: &CurveMatrix,
    window: TimeWindow,
    mds: &ClassicalMds,
    lamp: &Lamp,
) -> Result<TimeLapseProjection> {
    window.validate(curves.ntimesteps())?;
    info!(
        "Time-lapse projection of {} curves over [{}, {}) step {}",
        curves.ncurves(),
        window.start,
        window.end,
        window.step
    );

    let ctrl_proj = control_points(curves, window, mds)?;
    let ctrl_orig = curves.to_rows();
    let raw = time_lapse_lamp(curves, &ctrl_orig, &ctrl_proj, window.start, window.end, lamp)?;

    let frames: Vec<Vec<[f64; 2]>> = raw
        .into_iter()
        .map(|frame| frame.into_iter().map(|p| [p[0], p[1]]).collect())
        .collect();
    debug!("Projection finished: {} frames", frames.len());

    Ok(TimeLapseProjection {
        window,
        control_points: ctrl_proj,
        frames: Arc::new(frames),
        ncurves: curves.ncurves(),
    })
}

/// Stateful driver: holds the curves, the active window and the current
/// projection, recomputing the whole projection whenever either changes.
#[derive(Debug, Default)]
pub struct TimeLapseEngine {
    mds: ClassicalMds,
    lamp: Lamp,
    curves: Option<Arc<CurveMatrix>>,
    window: Option<TimeWindow>,
    projection: Option<Arc<TimeLapseProjection>>,
    hidden: BTreeSet<usize>,
}

impl TimeLapseEngine {
    pub fn new(mds_params: MdsParams, lamp_tolerance: f64) -> Self {
        Self {
            mds: ClassicalMds::new(mds_params),
            lamp: Lamp::new(lamp_tolerance),
            ..Default::default()
        }
    }

    /// Replaces the curves and recomputes everything.
    ///
    /// A window set earlier is kept when it still fits the new series and
    /// reset to the full range otherwise. On error the engine is unchanged.
    pub fn set_curves(&mut self, curves: Arc<CurveMatrix>) -> Result<()> {
        let window = TimeWindow::fit_or_full(self.window, curves.ntimesteps());
        let projection = compute_projection(&curves, window, &self.mds, &self.lamp)?;

        self.curves = Some(curves);
        self.window = Some(window);
        self.hidden.clear();
        self.projection = Some(Arc::new(projection));
        Ok(())
    }

    /// Changes the window and recomputes control points and paths.
    pub fn set_timestep_range(&mut self, start: usize, end: usize, step: usize) -> Result<()> {
        let window = TimeWindow::new(start, end, step);
        let curves = self.curves.as_ref().ok_or_else(|| {
            LampError::InvalidState("set curves before choosing a timestep range".to_string())
        })?;
        let projection = compute_projection(curves, window, &self.mds, &self.lamp)?;
        self.window = Some(window);
        self.projection = Some(Arc::new(projection));
        Ok(())
    }

    pub fn window(&self) -> Option<TimeWindow> {
        self.window
    }

    pub fn curves(&self) -> Option<&Arc<CurveMatrix>> {
        self.curves.as_ref()
    }

    pub fn projection(&self) -> Option<Arc<TimeLapseProjection>> {
        self.projection.clone()
    }

    pub fn control_points(&self) -> Option<&[Vec<f64>]> {
        self.projection.as_ref().map(|p| p.control_points())
    }

    /// One lazy path per curve; empty before any curves are set.
    pub fn projected_curves(&self) -> Vec<ProjectionPath> {
        self.projection
            .as_ref()
            .map(|p| p.paths())
            .unwrap_or_default()
    }

    /// Hidden curves are still projected but ignored by picking.
    pub fn set_curve_visible(&mut self, idx: usize, visible: bool) -> Result<()> {
        let n = self.curves.as_ref().map(|c| c.ncurves()).unwrap_or(0);
        check_index(idx, n)?;
        if visible {
            self.hidden.remove(&idx);
        } else {
            self.hidden.insert(idx);
        }
        Ok(())
    }

    pub fn is_curve_visible(&self, idx: usize) -> Result<bool> {
        let n = self.curves.as_ref().map(|c| c.ncurves()).unwrap_or(0);
        check_index(idx, n)?;
        Ok(!self.hidden.contains(&idx))
    }

    pub fn nearest_point(&self, x: f64, y: f64) -> Option<PickedPoint> {
        self.projection
            .as_ref()
            .and_then(|p| p.nearest_point(x, y, &self.hidden))
    }
}

/// Per-timestep variance across curves, min-max scaled to `[0, 1]`.
///
/// Constant variance maps to all zeros.
pub fn timestep_variance(curves: &CurveMatrix) -> Vec<f64> {
    let n = curves.ncurves() as f64;
    let var: Vec<f64> = (0..curves.ntimesteps())
        .map(|t| {
            let col = curves.column(t);
            let mean = col.iter().sum::<f64>() / n;
            col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
        })
        .collect();
    let lo = var.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = var.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if hi - lo <= f64::EPSILON {
        return vec![0.0; var.len()];
    }
    var.into_iter().map(|v| (v - lo) / (hi - lo)).collect()
}

/// `n` evenly spaced values from `a` to `b` inclusive.
pub fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![a],
        _ => (0..n)
            .map(|i| a + (b - a) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

/// How colour saturation varies along a path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaturationMap {
    #[default]
    Constant,
    LinearIncreasing,
    LinearDecreasing,
    /// Low ensemble variance at a timestep gives a saturated point.
    Variance,
}

impl SaturationMap {
    /// One saturation factor per path point of `window`.
    pub fn values(&self, window: TimeWindow, variance: &[f64]) -> Vec<f64> {
        let n = window.path_len();
        match self {
            SaturationMap::Constant => vec![1.0; n],
            SaturationMap::LinearIncreasing => linspace(0.01, 0.95, n),
            SaturationMap::LinearDecreasing => linspace(0.95, 0.01, n),
            SaturationMap::Variance => (0..n)
                .map(|k| 1.0 - variance.get(window.timestep_of(k)).copied().unwrap_or(0.0))
                .collect(),
        }
    }
}

/// How glyph size varies along a path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlyphSizeMap {
    #[default]
    LinearIncreasing,
    LinearDecreasing,
}

impl GlyphSizeMap {
    pub fn sizes(&self, npoints: usize, limits: (f64, f64)) -> Vec<f64> {
        match self {
            GlyphSizeMap::LinearIncreasing => linspace(limits.0, limits.1, npoints),
            GlyphSizeMap::LinearDecreasing => linspace(limits.1, limits.0, npoints),
        }
    }
}
