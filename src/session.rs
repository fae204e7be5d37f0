//! `Session`: one ensemble with everything derived from it.
//!
//! The derived state (projection, ranks, distance values) lives in an
//! immutable `SessionSnapshot`. Readers clone the current `Arc` and never see
//! a half-built state; every recompute builds a fresh snapshot and swaps it in
//! under a short write lock.
//!
//! Every request (curve load, baseline, window, metric) takes a generation
//! number when it is issued. The `*_async` variants run on the rayon pool and
//! follow these rules:
//!
//! - a result is dropped only when a newer request of the same kind was
//!   issued; a baseline is also dropped by a newer curve load, which clears it
//! - a baseline or window request issued while a curve load is pending waits
//!   for that load and then applies to the new curves
//! - a result built on a snapshot that was replaced in the meantime is rebuilt
//!   on the current one before it is installed
//!
//! The synchronous calls apply to the installed state immediately.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, info, trace, warn};

use crate::builder::SessionConfig;
use crate::core::CurveMatrix;
use crate::distance::DistanceMetric;
use crate::errors::{check_index, LampError, Result};
use crate::lamp::Lamp;
use crate::mds::ClassicalMds;
use crate::percentiles::with_percentile_curves;
use crate::rank::{self, baseline_distance_values, RankEngine, RankMatrix};
use crate::selection::{
    CurveRole, ReferenceStyle, SelectionCoordinator, SelectionState, Subscription,
};
use crate::timelapse::{
    compute_projection, timestep_variance, PickedPoint, ProjectionPath, TimeLapseProjection,
    TimeWindow,
};

/// Called with `Ok(true)` when an async result was installed, `Ok(false)`
/// when a newer request superseded it.
pub type CompletionCallback = Box<dyn FnOnce(Result<bool>) + Send + 'static>;

/// Immutable derived state.
#[derive(Clone, Debug, Default)]
pub struct SessionSnapshot {
    /// Generation of the request that produced this snapshot.
    pub generation: u64,
    pub metric: DistanceMetric,
    pub curves: Option<Arc<CurveMatrix>>,
    /// Indices of the appended percentile curves.
    pub percentile_rows: Vec<usize>,
    pub window: Option<TimeWindow>,
    pub projection: Option<Arc<TimeLapseProjection>>,
    /// Min-max scaled ensemble variance per timestep.
    pub variance: Arc<Vec<f64>>,
    pub baseline: Option<usize>,
    pub ranks: Option<Arc<RankMatrix>>,
    pub distances: Option<Arc<Vec<f64>>>,
}

impl SessionSnapshot {
    pub fn ncurves(&self) -> usize {
        self.curves.as_ref().map(|c| c.ncurves()).unwrap_or(0)
    }

    fn require_curves(&self) -> Result<&Arc<CurveMatrix>> {
        self.curves
            .as_ref()
            .ok_or_else(|| LampError::InvalidState("no curves loaded".to_string()))
    }
}

/// What to do to the selection once a snapshot is installed.
enum SelectionUpdate {
    Reset {
        ncurves: usize,
        references: Vec<(usize, ReferenceStyle)>,
    },
    Baseline(usize),
    Keep,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RequestKind {
    Curves,
    Baseline,
    Window,
    Metric,
}

type BuildFn = Box<
    dyn Fn(&SessionInner, &SessionSnapshot, u64) -> Result<(SessionSnapshot, SelectionUpdate)>
        + Send,
>;

struct Request {
    kind: RequestKind,
    generation: u64,
    build: BuildFn,
}

/// Latest generation issued per request kind, plus the curve load that
/// baseline and window requests have to wait for.
#[derive(Default)]
struct RequestLog {
    curves: u64,
    baseline: u64,
    window: u64,
    metric: u64,
    pending_curves: Option<u64>,
    deferred: Vec<(Request, CompletionCallback)>,
}

impl RequestLog {
    fn record(&mut self, kind: RequestKind, generation: u64) {
        match kind {
            RequestKind::Curves => {
                self.curves = generation;
                self.pending_curves = Some(generation);
            }
            RequestKind::Baseline => self.baseline = generation,
            RequestKind::Window => self.window = generation,
            RequestKind::Metric => self.metric = generation,
        }
    }

    fn is_superseded(&self, kind: RequestKind, generation: u64) -> bool {
        match kind {
            RequestKind::Curves => self.curves != generation,
            RequestKind::Baseline => self.baseline != generation || self.curves > generation,
            RequestKind::Window => self.window != generation,
            RequestKind::Metric => self.metric != generation,
        }
    }

    fn waits_for_curves(&self, kind: RequestKind, generation: u64) -> bool {
        kind != RequestKind::Curves && matches!(self.pending_curves, Some(c) if c < generation)
    }
}

// lock order: requests, then snapshot, then selection and hidden
struct SessionInner {
    config: SessionConfig,
    mds: ClassicalMds,
    lamp: Lamp,
    snapshot: RwLock<Arc<SessionSnapshot>>,
    requests: Mutex<RequestLog>,
    selection: Arc<SelectionCoordinator>,
    hidden: Mutex<BTreeSet<usize>>,
    generation: AtomicU64,
    in_flight: AtomicUsize,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .field("generation", &self.inner.generation.load(Ordering::SeqCst))
            .field("in_flight", &self.inner.in_flight.load(Ordering::SeqCst))
            .finish()
    }
}

impl Session {
    pub(crate) fn new(config: SessionConfig) -> Self {
        info!("Creating session");
        let snapshot = SessionSnapshot {
            metric: config.metric,
            ..Default::default()
        };
        Self {
            inner: Arc::new(SessionInner {
                mds: ClassicalMds::new(config.mds),
                lamp: Lamp::new(config.lamp_tolerance),
                config,
                snapshot: RwLock::new(Arc::new(snapshot)),
                requests: Mutex::new(RequestLog::default()),
                selection: Arc::new(SelectionCoordinator::new()),
                hidden: Mutex::new(BTreeSet::new()),
                generation: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Current snapshot; stays valid however the session changes later.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.inner.current()
    }

    /// Generation of the latest request issued.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// True while any async recompute has not finished.
    pub fn is_recomputing(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    // -------------------- recompute --------------------

    /// Replaces the ensemble, recomputes the projection and resets the
    /// selection. With percentile references enabled the percentile curves
    /// are appended and marked as references.
    pub fn set_curves(&self, curves: CurveMatrix) -> Result<()> {
        self.inner
            .run_sync(RequestKind::Curves, Self::curves_request(curves))
    }

    /// Ranks every curve against `idx` and computes its distance values.
    pub fn set_baseline(&self, idx: usize) -> Result<()> {
        self.inner
            .run_sync(RequestKind::Baseline, Self::baseline_request(idx))
    }

    /// Changes the projected window; the selection is untouched.
    pub fn set_timestep_range(&self, start: usize, end: usize, step: usize) -> Result<()> {
        self.inner.run_sync(
            RequestKind::Window,
            Self::window_request(TimeWindow::new(start, end, step)),
        )
    }

    /// Switches the metric used for ranks and distance values.
    pub fn set_metric(&self, metric: DistanceMetric) -> Result<()> {
        self.inner.run_sync(
            RequestKind::Metric,
            Box::new(move |inner: &SessionInner, base: &SessionSnapshot, generation: u64| {
                let mut next = base.clone();
                next.generation = generation;
                next.metric = metric;
                let snapshot = match base.baseline {
                    Some(b) => inner.build_baseline(&next, b, generation)?,
                    None => next,
                };
                Ok((snapshot, SelectionUpdate::Keep))
            }),
        )
    }

    pub fn set_curves_async<F>(&self, curves: CurveMatrix, on_done: F)
    where
        F: FnOnce(Result<bool>) + Send + 'static,
    {
        self.inner.submit(
            RequestKind::Curves,
            Self::curves_request(curves),
            Box::new(on_done),
        );
    }

    pub fn set_baseline_async<F>(&self, idx: usize, on_done: F)
    where
        F: FnOnce(Result<bool>) + Send + 'static,
    {
        self.inner.submit(
            RequestKind::Baseline,
            Self::baseline_request(idx),
            Box::new(on_done),
        );
    }

    pub fn set_timestep_range_async<F>(&self, start: usize, end: usize, step: usize, on_done: F)
    where
        F: FnOnce(Result<bool>) + Send + 'static,
    {
        self.inner.submit(
            RequestKind::Window,
            Self::window_request(TimeWindow::new(start, end, step)),
            Box::new(on_done),
        );
    }

    fn curves_request(curves: CurveMatrix) -> BuildFn {
        Box::new(
            move |inner: &SessionInner, base: &SessionSnapshot, generation: u64| {
                inner.build_curves(base, &curves, generation)
            },
        )
    }

    fn baseline_request(idx: usize) -> BuildFn {
        Box::new(move |inner: &SessionInner, base: &SessionSnapshot, generation: u64| {
            let snapshot = inner.build_baseline(base, idx, generation)?;
            Ok((snapshot, SelectionUpdate::Baseline(idx)))
        })
    }

    fn window_request(window: TimeWindow) -> BuildFn {
        Box::new(move |inner: &SessionInner, base: &SessionSnapshot, generation: u64| {
            let snapshot = inner.build_window(base, window, generation)?;
            Ok((snapshot, SelectionUpdate::Keep))
        })
    }

    // -------------------- read accessors --------------------

    pub fn curves(&self) -> Option<Arc<CurveMatrix>> {
        self.snapshot().curves.clone()
    }

    pub fn window(&self) -> Option<TimeWindow> {
        self.snapshot().window
    }

    pub fn projection(&self) -> Option<Arc<TimeLapseProjection>> {
        self.snapshot().projection.clone()
    }

    pub fn projected_curves(&self) -> Vec<ProjectionPath> {
        self.projection().map(|p| p.paths()).unwrap_or_default()
    }

    pub fn rank_matrix(&self) -> Option<Arc<RankMatrix>> {
        self.snapshot().ranks.clone()
    }

    /// Distance chart values over the whole series.
    pub fn distance_values(&self) -> Option<Arc<Vec<f64>>> {
        self.snapshot().distances.clone()
    }

    /// Distance chart values over `curves[:, 0:t]`, for a time slider.
    pub fn distance_values_until(&self, t: usize) -> Result<Vec<f64>> {
        let snap = self.snapshot();
        let curves = snap.require_curves()?;
        let baseline = snap
            .baseline
            .ok_or_else(|| LampError::InvalidState("no baseline curve set".to_string()))?;
        baseline_distance_values(
            curves,
            baseline,
            snap.metric,
            0..t,
            self.inner.config.log_scale_distances,
        )
    }

    /// Saturation factor for every point of a projection path.
    pub fn path_saturation(&self) -> Vec<f64> {
        let snap = self.snapshot();
        match snap.window {
            Some(w) => self.inner.config.saturation.values(w, &snap.variance),
            None => Vec::new(),
        }
    }

    /// Glyph size for every point of a projection path.
    pub fn path_glyph_sizes(&self) -> Vec<f64> {
        let npoints = self.window().map(|w| w.path_len()).unwrap_or(0);
        self.inner
            .config
            .glyph_size
            .sizes(npoints, self.inner.config.glyph_limits)
    }

    pub fn curve_name(&self, idx: usize) -> Result<String> {
        let snap = self.snapshot();
        let curves = snap.require_curves()?;
        check_index(idx, curves.ncurves())?;
        Ok(curves.curve_name(idx))
    }

    // -------------------- selection --------------------

    pub fn selection(&self) -> &Arc<SelectionCoordinator> {
        &self.inner.selection
    }

    pub fn selection_state(&self) -> SelectionState {
        self.inner.selection.state()
    }

    pub fn role(&self, idx: usize) -> Result<CurveRole> {
        self.inner.selection.role(idx)
    }

    /// Brushes `indices` from view `origin` and notifies the other views.
    pub fn highlight(&self, origin: &str, indices: &[usize], erase: bool) -> Result<()> {
        self.inner.selection.highlight(indices, erase)?;
        self.inner.selection.notify(origin);
        Ok(())
    }

    pub fn toggle_highlight(&self, origin: &str, indices: &[usize]) -> Result<()> {
        self.inner.selection.toggle(indices)?;
        self.inner.selection.notify(origin);
        Ok(())
    }

    pub fn clear_highlight(&self, origin: &str) {
        self.inner.selection.clear_highlight();
        self.inner.selection.notify(origin);
    }

    /// Bump chart group selection: normal curves ranked below `threshold` at
    /// column `t` replace the highlighted set. Returns the selected indices.
    pub fn select_below_rank(&self, origin: &str, t: usize, threshold: f64) -> Result<Vec<usize>> {
        let ranks = self
            .rank_matrix()
            .ok_or_else(|| LampError::InvalidState("no baseline curve set".to_string()))?;
        let sel = &self.inner.selection;
        let picked = rank::select_below_rank(&ranks, t, threshold, |i| sel.is_normal(i));
        sel.replace_highlight(&picked)?;
        sel.notify(origin);
        Ok(picked)
    }

    /// Distance chart group selection over the current distance values.
    pub fn select_below_distance(&self, origin: &str, threshold: f64) -> Result<Vec<usize>> {
        let values = self
            .distance_values()
            .ok_or_else(|| LampError::InvalidState("no baseline curve set".to_string()))?;
        let sel = &self.inner.selection;
        let picked = rank::select_below_distance(&values, threshold, |i| sel.is_normal(i));
        sel.replace_highlight(&picked)?;
        sel.notify(origin);
        Ok(picked)
    }

    pub fn set_reference(&self, idx: usize, is_ref: bool, style: ReferenceStyle) -> Result<()> {
        self.inner.selection.set_reference(idx, is_ref, style)
    }

    pub fn register_view<F>(&self, name: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(&str, &[usize]) + Send + Sync + 'static,
    {
        self.inner.selection.register_view(name, callback)
    }

    pub fn on_selection_changed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str, &[usize]) + Send + Sync + 'static,
    {
        self.inner.selection.on_selection_changed(callback)
    }

    // -------------------- projection view --------------------

    /// Hidden curves stay projected but cannot be picked.
    pub fn set_curve_visible(&self, idx: usize, visible: bool) -> Result<()> {
        check_index(idx, self.snapshot().ncurves())?;
        let mut hidden = self.inner.hidden.lock().unwrap_or_else(|e| e.into_inner());
        if visible {
            hidden.remove(&idx);
        } else {
            hidden.insert(idx);
        }
        Ok(())
    }

    pub fn is_curve_visible(&self, idx: usize) -> Result<bool> {
        check_index(idx, self.snapshot().ncurves())?;
        let hidden = self.inner.hidden.lock().unwrap_or_else(|e| e.into_inner());
        Ok(!hidden.contains(&idx))
    }

    /// Closest visible path point to `(x, y)` in projection space.
    pub fn nearest_point(&self, x: f64, y: f64) -> Option<PickedPoint> {
        let projection = self.projection()?;
        let hidden = self
            .inner
            .hidden
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        projection.nearest_point(x, y, &hidden)
    }
}

impl SessionInner {
    fn current(&self) -> Arc<SessionSnapshot> {
        let guard = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn requests(&self) -> MutexGuard<'_, RequestLog> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn issue(&self, kind: RequestKind, build: BuildFn) -> (Request, MutexGuard<'_, RequestLog>) {
        let mut requests = self.requests();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        requests.record(kind, generation);
        trace!("Issued {:?} request, generation {}", kind, generation);
        let request = Request {
            kind,
            generation,
            build,
        };
        (request, requests)
    }

    fn run_sync(self: &Arc<Self>, kind: RequestKind, build: BuildFn) -> Result<()> {
        let (request, requests) = self.issue(kind, build);
        drop(requests);
        let outcome = self.run(&request);
        if kind == RequestKind::Curves {
            self.finish_curves(request.generation);
        }
        outcome.map(|_| ())
    }

    fn submit(self: &Arc<Self>, kind: RequestKind, build: BuildFn, on_done: CompletionCallback) {
        let (request, mut requests) = self.issue(kind, build);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if requests.waits_for_curves(kind, request.generation) {
            debug!(
                "{:?} request {} waits for curve load {:?}",
                kind, request.generation, requests.pending_curves
            );
            requests.deferred.push((request, on_done));
            return;
        }
        drop(requests);
        self.spawn(request, on_done);
    }

    fn spawn(self: &Arc<Self>, request: Request, on_done: CompletionCallback) {
        let inner = Arc::clone(self);
        debug!(
            "Async {:?} recompute scheduled, generation {}",
            request.kind, request.generation
        );
        rayon::spawn(move || {
            let outcome = inner.run(&request);
            if request.kind == RequestKind::Curves {
                inner.finish_curves(request.generation);
            }
            inner.in_flight.fetch_sub(1, Ordering::SeqCst);
            on_done(outcome);
        });
    }

    /// Releases the requests deferred behind curve load `generation`, if it
    /// is still the pending one.
    fn finish_curves(self: &Arc<Self>, generation: u64) {
        let ready = {
            let mut requests = self.requests();
            if requests.pending_curves != Some(generation) {
                return;
            }
            requests.pending_curves = None;
            std::mem::take(&mut requests.deferred)
        };
        for (request, on_done) in ready {
            self.spawn(request, on_done);
        }
    }

    /// Builds `request` and swaps the result in. Returns `Ok(false)` when a
    /// newer request superseded it.
    fn run(&self, request: &Request) -> Result<bool> {
        let (kind, generation) = (request.kind, request.generation);
        loop {
            let base = self.current();
            if self.requests().is_superseded(kind, generation) {
                debug!("Skipping superseded {:?} request {}", kind, generation);
                return Ok(false);
            }
            let (snapshot, update) = (request.build)(self, &*base, generation)?;

            let requests = self.requests();
            if requests.is_superseded(kind, generation) {
                debug!("Discarding stale {:?} result of generation {}", kind, generation);
                return Ok(false);
            }
            let mut current = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
            if current.generation != base.generation {
                debug!(
                    "{:?} request {} was built on generation {}, rebuilding on {}",
                    kind, generation, base.generation, current.generation
                );
                continue;
            }
            *current = Arc::new(snapshot);
            // selection follows the snapshot under the same locks
            self.apply(update);
            trace!("Installed snapshot generation {}", generation);
            return Ok(true);
        }
    }

    fn apply(&self, update: SelectionUpdate) {
        match update {
            SelectionUpdate::Reset {
                ncurves,
                references,
            } => {
                if let Err(e) = self.selection.reset_with_references(ncurves, references) {
                    warn!("Could not mark percentile references: {}", e);
                    self.selection.reset(ncurves);
                }
                self.hidden
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .clear();
            }
            SelectionUpdate::Baseline(idx) => {
                if let Err(e) = self.selection.set_baseline(idx) {
                    warn!("Could not set baseline {}: {}", idx, e);
                }
            }
            SelectionUpdate::Keep => {}
        }
    }

    fn build_curves(
        &self,
        base: &SessionSnapshot,
        curves: &CurveMatrix,
        generation: u64,
    ) -> Result<(SessionSnapshot, SelectionUpdate)> {
        let original = curves.ncurves();
        let (curves, percentile_rows) = if self.config.percentile_references {
            with_percentile_curves(curves, &self.config.reference_percentiles)?
        } else {
            (curves.clone(), Vec::new())
        };
        info!(
            "Loading {} curves ({} percentile references) × {} timesteps",
            original,
            percentile_rows.len(),
            curves.ntimesteps()
        );

        let window = TimeWindow::fit_or_full(base.window, curves.ntimesteps());
        let projection = compute_projection(&curves, window, &self.mds, &self.lamp)?;
        let variance = timestep_variance(&curves);

        let references = percentile_rows
            .iter()
            .map(|&i| {
                let style = ReferenceStyle {
                    label: Some(curves.curve_name(i)),
                    ..ReferenceStyle::new("black", "--")
                };
                (i, style)
            })
            .collect();
        let update = SelectionUpdate::Reset {
            ncurves: curves.ncurves(),
            references,
        };

        let snapshot = SessionSnapshot {
            generation,
            metric: base.metric,
            curves: Some(Arc::new(curves)),
            percentile_rows,
            window: Some(window),
            projection: Some(Arc::new(projection)),
            variance: Arc::new(variance),
            baseline: None,
            ranks: None,
            distances: None,
        };
        Ok((snapshot, update))
    }

    fn build_baseline(
        &self,
        base: &SessionSnapshot,
        idx: usize,
        generation: u64,
    ) -> Result<SessionSnapshot> {
        let curves = base.require_curves()?;
        check_index(idx, curves.ncurves())?;
        info!("Computing ranks and distances against baseline {}", idx);

        let ranks = RankEngine::new(base.metric)
            .with_window(self.config.rank_window)
            .with_inverted(self.config.rank_inverted)
            .rank(curves, idx)?;
        let distances = baseline_distance_values(
            curves,
            idx,
            base.metric,
            0..curves.ntimesteps(),
            self.config.log_scale_distances,
        )?;

        Ok(SessionSnapshot {
            generation,
            baseline: Some(idx),
            ranks: Some(Arc::new(ranks)),
            distances: Some(Arc::new(distances)),
            ..base.clone()
        })
    }

    fn build_window(
        &self,
        base: &SessionSnapshot,
        window: TimeWindow,
        generation: u64,
    ) -> Result<SessionSnapshot> {
        let curves = base.require_curves()?;
        let projection = compute_projection(curves, window, &self.mds, &self.lamp)?;
        Ok(SessionSnapshot {
            generation,
            window: Some(window),
            projection: Some(Arc::new(projection)),
            ..base.clone()
        })
    }
}
