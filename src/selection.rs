//! Cross-view selection state and brushing & linking.
//!
//! One `SelectionCoordinator` exists per series collection. It owns:
//!
//! - the highlighted set (curves currently brushed),
//! - the reference set (curves drawn with their own style that can never be
//!   highlighted),
//! - the optional baseline curve,
//!
//! and a registry of views that mirror the highlighted set. Every index has
//! exactly one `CurveRole`; the baseline role wins over reference.
//!
//! Lifecycle: `Empty` (no curves) → `Ready` (curves, no baseline) → `Active`
//! (baseline set). Highlighting is only permitted while `Active`; `reset`
//! (called whenever the curves are replaced) always returns to `Ready` and
//! clears everything.
//!
//! Subscriptions are RAII guards: dropping one unregisters its callback.
//! Callbacks run after all internal locks are released, so a callback may
//! call straight back into the coordinator.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::errors::{check_index, LampError, Result};

/// Receives `(origin_view, highlighted_indices)`.
pub type SelectionCallback = Arc<dyn Fn(&str, &[usize]) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveRole {
    Normal,
    Reference,
    Baseline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionPhase {
    Empty,
    Ready,
    Active,
}

/// Drawing hints carried with a reference curve; opaque to the core.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStyle {
    pub color: Option<String>,
    pub marker: Option<String>,
    pub size: Option<f64>,
    pub label: Option<String>,
}

impl ReferenceStyle {
    pub fn new(color: &str, marker: &str) -> Self {
        Self {
            color: Some(color.to_string()),
            marker: Some(marker.to_string()),
            ..Default::default()
        }
    }
}

/// Plain snapshot of the selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionState {
    pub ncurves: usize,
    pub highlighted: BTreeSet<usize>,
    pub references: BTreeMap<usize, ReferenceStyle>,
    pub baseline: Option<usize>,
}

impl SelectionState {
    pub fn phase(&self) -> SelectionPhase {
        match (self.ncurves, self.baseline) {
            (0, _) => SelectionPhase::Empty,
            (_, None) => SelectionPhase::Ready,
            (_, Some(_)) => SelectionPhase::Active,
        }
    }

    pub fn role(&self, idx: usize) -> CurveRole {
        if self.baseline == Some(idx) {
            CurveRole::Baseline
        } else if self.references.contains_key(&idx) {
            CurveRole::Reference
        } else {
            CurveRole::Normal
        }
    }

    fn check_all(&self, indices: &[usize]) -> Result<()> {
        indices
            .iter()
            .try_for_each(|&i| check_index(i, self.ncurves))
    }
}

struct Listener {
    name: Option<String>,
    callback: SelectionCallback,
}

#[derive(Default)]
struct Registry {
    listeners: DashMap<u64, Listener>,
    /// View name to listener id; claimed atomically through `entry`.
    views: DashMap<String, u64>,
}

/// Keeps a view (or anonymous observer) registered while alive.
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Some((_, l)) = registry.listeners.remove(&self.id) {
                if let Some(name) = &l.name {
                    registry.views.remove_if(name, |_, id| *id == self.id);
                }
                trace!("Listener {} ({:?}) unregistered", self.id, l.name);
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

pub struct SelectionCoordinator {
    state: Mutex<SelectionState>,
    registry: Arc<Registry>,
    next_id: AtomicU64,
}

impl Default for SelectionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SelectionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionCoordinator")
            .field("state", &*self.lock())
            .field("listeners", &self.registry.listeners.len())
            .finish()
    }
}

impl SelectionCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SelectionState::default()),
            registry: Arc::new(Registry::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SelectionState> {
        // state is always left consistent, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Forgets every highlight, reference and the baseline, and sizes the
    /// collection for `ncurves` curves.
    pub fn reset(&self, ncurves: usize) {
        info!("Selection reset for {} curves", ncurves);
        *self.lock() = SelectionState {
            ncurves,
            ..Default::default()
        };
    }

    /// `reset` followed by marking `references`, applied under one lock so
    /// no reader sees the collection without its references.
    ///
    /// # Errors
    /// `IndexOutOfRange` if a reference index is not a curve; nothing is
    /// changed then.
    pub fn reset_with_references(
        &self,
        ncurves: usize,
        references: impl IntoIterator<Item = (usize, ReferenceStyle)>,
    ) -> Result<()> {
        let references = references
            .into_iter()
            .map(|(i, style)| check_index(i, ncurves).map(|_| (i, style)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        info!(
            "Selection reset for {} curves with {} references",
            ncurves,
            references.len()
        );
        *self.lock() = SelectionState {
            ncurves,
            references,
            ..Default::default()
        };
        Ok(())
    }

    pub fn state(&self) -> SelectionState {
        self.lock().clone()
    }

    pub fn phase(&self) -> SelectionPhase {
        self.lock().phase()
    }

    pub fn ncurves(&self) -> usize {
        self.lock().ncurves
    }

    // -------------------- highlight --------------------

    /// Adds (`erase == false`) or removes (`erase == true`) `indices` from the
    /// highlighted set. Reference curves are skipped.
    ///
    /// # Errors
    /// - `InvalidState` unless a baseline is set
    /// - `IndexOutOfRange` if any index is invalid; nothing is changed then
    pub fn highlight(&self, indices: &[usize], erase: bool) -> Result<()> {
        let mut st = self.lock();
        Self::require_active(&st)?;
        st.check_all(indices)?;
        for &i in indices {
            if st.references.contains_key(&i) {
                trace!("Curve {} is a reference, highlight ignored", i);
                continue;
            }
            if erase {
                st.highlighted.remove(&i);
            } else {
                st.highlighted.insert(i);
            }
        }
        debug!("Highlighted set now has {} curves", st.highlighted.len());
        Ok(())
    }

    /// Flips the highlight of each index (click selection).
    pub fn toggle(&self, indices: &[usize]) -> Result<()> {
        let mut st = self.lock();
        Self::require_active(&st)?;
        st.check_all(indices)?;
        for &i in indices {
            if st.references.contains_key(&i) {
                continue;
            }
            if !st.highlighted.remove(&i) {
                st.highlighted.insert(i);
            }
        }
        Ok(())
    }

    /// Replaces the highlighted set (group selection).
    pub fn replace_highlight(&self, indices: &[usize]) -> Result<()> {
        let mut st = self.lock();
        Self::require_active(&st)?;
        st.check_all(indices)?;
        let refs: BTreeSet<usize> = st.references.keys().copied().collect();
        st.highlighted = indices
            .iter()
            .copied()
            .filter(|i| !refs.contains(i))
            .collect();
        Ok(())
    }

    pub fn clear_highlight(&self) {
        self.lock().highlighted.clear();
    }

    pub fn is_highlighted(&self, idx: usize) -> bool {
        self.lock().highlighted.contains(&idx)
    }

    /// Highlighted indices in ascending order.
    pub fn highlighted(&self) -> Vec<usize> {
        self.lock().highlighted.iter().copied().collect()
    }

    fn require_active(st: &SelectionState) -> Result<()> {
        match st.phase() {
            SelectionPhase::Active => Ok(()),
            phase => Err(LampError::InvalidState(format!(
                "highlighting requires a baseline curve (phase {:?})",
                phase
            ))),
        }
    }

    // -------------------- references & baseline --------------------

    /// Marks (`is_ref`) or unmarks curve `idx` as a reference. Marking also
    /// removes it from the highlighted set.
    ///
    /// # Errors
    /// - `IndexOutOfRange` if `idx` is not a curve
    /// - `InvalidIndex` when unmarking a curve that is not a reference
    pub fn set_reference(&self, idx: usize, is_ref: bool, params: ReferenceStyle) -> Result<()> {
        let mut st = self.lock();
        check_index(idx, st.ncurves)?;
        if is_ref {
            st.references.insert(idx, params);
            st.highlighted.remove(&idx);
            debug!("Curve {} marked as reference", idx);
        } else if st.references.remove(&idx).is_none() {
            return Err(LampError::InvalidIndex(
                idx,
                "curve is not a reference".to_string(),
            ));
        } else {
            debug!("Curve {} is no longer a reference", idx);
        }
        Ok(())
    }

    pub fn is_reference(&self, idx: usize) -> bool {
        self.lock().references.contains_key(&idx)
    }

    pub fn references(&self) -> Vec<usize> {
        self.lock().references.keys().copied().collect()
    }

    pub fn reference_params(&self, idx: usize) -> Option<ReferenceStyle> {
        self.lock().references.get(&idx).cloned()
    }

    pub fn set_baseline(&self, idx: usize) -> Result<()> {
        let mut st = self.lock();
        check_index(idx, st.ncurves)?;
        st.baseline = Some(idx);
        info!("Baseline set to curve {}", idx);
        Ok(())
    }

    pub fn baseline(&self) -> Option<usize> {
        self.lock().baseline
    }

    pub fn role(&self, idx: usize) -> Result<CurveRole> {
        let st = self.lock();
        check_index(idx, st.ncurves)?;
        Ok(st.role(idx))
    }

    /// Neither reference nor baseline.
    pub fn is_normal(&self, idx: usize) -> bool {
        let st = self.lock();
        idx < st.ncurves && st.role(idx) == CurveRole::Normal
    }

    // -------------------- brushing & linking --------------------

    /// Registers a named view. `notify` from this view skips its own callback.
    pub fn register_view<F>(&self, name: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(&str, &[usize]) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.registry.views.entry(name.to_string()) {
            Entry::Occupied(_) => {
                return Err(LampError::InvalidArgument(format!(
                    "a view named '{}' is already registered",
                    name
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }
        Ok(self.subscribe(id, Some(name.to_string()), Arc::new(callback)))
    }

    /// Anonymous observer; receives every broadcast.
    pub fn on_selection_changed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str, &[usize]) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribe(id, None, Arc::new(callback))
    }

    fn subscribe(&self, id: u64, name: Option<String>, callback: SelectionCallback) -> Subscription {
        debug!("Listener {} registered ({:?})", id, name);
        self.registry
            .listeners
            .insert(id, Listener { name, callback });
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.listeners.len()
    }

    /// Broadcasts the current highlighted set to every listener except the
    /// view named `origin`. Returns how many callbacks ran.
    pub fn notify(&self, origin: &str) -> usize {
        let highlighted = self.highlighted();
        let mut targets: Vec<(u64, SelectionCallback)> = self
            .registry
            .listeners
            .iter()
            .filter(|l| l.value().name.as_deref() != Some(origin))
            .map(|l| (*l.key(), Arc::clone(&l.value().callback)))
            .collect();
        // registration order
        targets.sort_by_key(|(id, _)| *id);

        trace!(
            "Broadcasting {} highlighted curves from '{}' to {} listeners",
            highlighted.len(),
            origin,
            targets.len()
        );
        for (_, cb) in &targets {
            cb(origin, &highlighted);
        }
        targets.len()
    }
}
