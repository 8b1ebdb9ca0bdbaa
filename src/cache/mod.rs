//! Lock-guarded partition of geometries into visible and hidden sets.
//!
//! The [`GeometryCache`] owns every geometry a transformer has derived,
//! partitioned into a *visible* and a *hidden* set, plus the set of element
//! ids the transformer is responsible for. All partition mutation happens
//! behind this type's API under a single mutex; callers never obtain the
//! lock directly. The invariant `visible ∩ hidden = ∅` holds after every
//! operation, and no geometry is ever observable absent from both partitions
//! during a move.
//!
//! Matching between element ids and stored geometries is done by masking
//! each geometry's id with the codec's element mask, so one element may own
//! several geometries under different type tags.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, trace};

use crate::error::TransformError;
use crate::geometry::Geometry;
use crate::id::{ElementId, GeometryId};

/// Visible-set diff produced by a replace operation.
#[derive(Debug, Default)]
pub struct ReplaceOutcome {
    /// Geometries that entered the visible set.
    pub added: Vec<Geometry>,
    /// Geometries that left the visible set.
    pub removed: Vec<Geometry>,
}

#[derive(Default)]
struct CacheState {
    visible: HashMap<GeometryId, Geometry>,
    hidden: HashMap<GeometryId, Geometry>,
    element_ids: HashSet<ElementId>,
}

/// The partitioned geometry cache for one transformer.
pub struct GeometryCache {
    state: Mutex<CacheState>,
    element_mask: u64,
}

impl GeometryCache {
    /// Create an empty cache matching geometry ids with the given mask.
    pub fn new(element_mask: u64) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            element_mask,
        }
    }

    /// Intersect candidate ids with the transformer's id set.
    pub fn ids_of_interest(&self, candidates: &[ElementId]) -> Vec<ElementId> {
        let state = self.lock();
        candidates
            .iter()
            .copied()
            .filter(|id| state.element_ids.contains(id))
            .collect()
    }

    /// Register element ids this transformer is responsible for.
    pub fn add_element_ids(&self, ids: &[ElementId]) {
        let mut state = self.lock();
        state.element_ids.extend(ids.iter().copied());
        trace!(count = ids.len(), "registered element ids");
    }

    /// Drop element ids and every geometry derived from them.
    ///
    /// Returns the geometries that were in the visible set, so the caller
    /// can publish the removals.
    pub fn remove_elements(&self, ids: &[ElementId]) -> Vec<Geometry> {
        let target: HashSet<ElementId> = ids.iter().copied().collect();
        let mut state = self.lock();
        for id in &target {
            state.element_ids.remove(id);
        }
        let removed = Self::drain_matching(&mut state.visible, &target, self.element_mask);
        let _ = Self::drain_matching(&mut state.hidden, &target, self.element_mask);
        debug!(
            elements = target.len(),
            removed_visible = removed.len(),
            "removed elements"
        );
        removed
    }

    /// Replace every geometry for the given elements with freshly derived ones.
    ///
    /// Old geometries for the elements are dropped from both partitions. Each
    /// new geometry lands in the partition its element previously occupied;
    /// elements without prior geometries land in the visible set. Returns the
    /// visible-set diff for publication.
    pub fn replace_elements(&self, ids: &[ElementId], geoms: Vec<Geometry>) -> ReplaceOutcome {
        let target: HashSet<ElementId> = ids.iter().copied().collect();
        let mut state = self.lock();

        let removed = Self::drain_matching(&mut state.visible, &target, self.element_mask);
        let dropped_hidden = Self::drain_matching(&mut state.hidden, &target, self.element_mask);

        // An element is considered hidden only if it had geometries and none
        // of them were visible.
        let was_visible: HashSet<ElementId> = removed
            .iter()
            .map(|g| g.id & self.element_mask)
            .collect();
        let hidden_elements: HashSet<ElementId> = dropped_hidden
            .iter()
            .map(|g| g.id & self.element_mask)
            .filter(|e| !was_visible.contains(e))
            .collect();

        let mut added = Vec::new();
        for mut geom in geoms {
            let element = geom.id & self.element_mask;
            if hidden_elements.contains(&element) {
                geom.props.visible = false;
                state.hidden.insert(geom.id, geom);
            } else {
                geom.props.visible = true;
                added.push(geom.clone());
                state.visible.insert(geom.id, geom);
            }
        }

        debug!(
            elements = target.len(),
            added = added.len(),
            removed = removed.len(),
            "replaced element geometries"
        );
        ReplaceOutcome { added, removed }
    }

    /// Move matching geometries from the visible to the hidden partition.
    ///
    /// Returns the moved geometries so the caller can publish removals.
    pub fn move_to_hidden(&self, ids: &HashSet<ElementId>) -> Vec<Geometry> {
        let mut state = self.lock();
        let mut moved = Self::drain_matching(&mut state.visible, ids, self.element_mask);
        for geom in &mut moved {
            geom.props.visible = false;
        }
        for geom in &moved {
            state.hidden.insert(geom.id, geom.clone());
        }
        trace!(count = moved.len(), "moved geometries to hidden");
        moved
    }

    /// Move matching geometries from the hidden to the visible partition.
    ///
    /// Returns the moved geometries so the caller can publish additions.
    pub fn move_to_visible(&self, ids: &HashSet<ElementId>) -> Vec<Geometry> {
        let mut state = self.lock();
        let mut moved = Self::drain_matching(&mut state.hidden, ids, self.element_mask);
        for geom in &mut moved {
            geom.props.visible = true;
        }
        for geom in &moved {
            state.visible.insert(geom.id, geom.clone());
        }
        trace!(count = moved.len(), "moved geometries to visible");
        moved
    }

    /// Map geometry ids back to their element ids.
    ///
    /// Fails fast on an empty input. Inputs not present in either partition
    /// are silently omitted from the result.
    pub fn element_ids_for_geometry_ids(
        &self,
        geometry_ids: &[GeometryId],
    ) -> Result<HashMap<GeometryId, ElementId>, TransformError> {
        if geometry_ids.is_empty() {
            return Err(TransformError::InvalidArgument(
                "empty geometry id list".to_string(),
            ));
        }
        let state = self.lock();
        Ok(geometry_ids
            .iter()
            .copied()
            .filter(|id| state.visible.contains_key(id) || state.hidden.contains_key(id))
            .map(|id| (id, id & self.element_mask))
            .collect())
    }

    /// Every element id this transformer is responsible for.
    pub fn all_element_ids(&self) -> Vec<ElementId> {
        self.lock().element_ids.iter().copied().collect()
    }

    /// Patch the visibility render property on every geometry.
    ///
    /// Partitions are untouched; this is the cheap path for datatype-level
    /// visibility toggles.
    pub fn patch_visibility(&self, visible: bool) {
        let mut state = self.lock();
        let state = &mut *state;
        for geom in state.visible.values_mut().chain(state.hidden.values_mut()) {
            geom.props.visible = visible;
        }
        debug!(visible, "patched render visibility");
    }

    /// Patch the alpha channel on every geometry's render color.
    pub fn patch_alpha(&self, alpha: u8) {
        let mut state = self.lock();
        let state = &mut *state;
        for geom in state.visible.values_mut().chain(state.hidden.values_mut()) {
            geom.props.color = geom.props.color.with_alpha(alpha);
        }
        debug!(alpha, "patched render opacity");
    }

    /// Patch the selected render property for matching geometries.
    pub fn patch_selected(&self, ids: &HashSet<ElementId>, selected: bool) {
        let mask = self.element_mask;
        let mut state = self.lock();
        let state = &mut *state;
        for geom in state
            .visible
            .values_mut()
            .chain(state.hidden.values_mut())
            .filter(|g| ids.contains(&(g.id & mask)))
        {
            geom.props.selected = selected;
        }
    }

    /// Classify visible geometries with a predicate, under the cache lock.
    ///
    /// Returns the masked element ids of geometries passing and failing the
    /// predicate. Hidden geometries are excluded entirely.
    pub fn classify_visible<F>(&self, mut predicate: F) -> (HashSet<ElementId>, HashSet<ElementId>)
    where
        F: FnMut(&Geometry) -> bool,
    {
        let state = self.lock();
        let mut matching = HashSet::new();
        let mut rest = HashSet::new();
        for geom in state.visible.values() {
            let element = geom.id & self.element_mask;
            if predicate(geom) {
                matching.insert(element);
            } else {
                rest.insert(element);
            }
        }
        // An element with at least one matching geometry counts as matching.
        rest.retain(|e| !matching.contains(e));
        (matching, rest)
    }

    /// Drop everything, returning the formerly visible geometries.
    pub fn clear(&self) -> Vec<Geometry> {
        let mut state = self.lock();
        let removed: Vec<Geometry> = state.visible.drain().map(|(_, g)| g).collect();
        state.hidden.clear();
        state.element_ids.clear();
        debug!(removed_visible = removed.len(), "cleared geometry cache");
        removed
    }

    /// Whether the cache holds no geometries and no element ids.
    pub fn is_empty(&self) -> bool {
        let state = self.lock();
        state.visible.is_empty() && state.hidden.is_empty() && state.element_ids.is_empty()
    }

    /// Geometry ids currently in the visible partition.
    pub fn visible_ids(&self) -> HashSet<GeometryId> {
        self.lock().visible.keys().copied().collect()
    }

    /// Geometry ids currently in the hidden partition.
    pub fn hidden_ids(&self) -> HashSet<GeometryId> {
        self.lock().hidden.keys().copied().collect()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove and return geometries whose masked id is in the target set.
    fn drain_matching(
        partition: &mut HashMap<GeometryId, Geometry>,
        target: &HashSet<ElementId>,
        mask: u64,
    ) -> Vec<Geometry> {
        let matching: Vec<GeometryId> = partition
            .keys()
            .copied()
            .filter(|id| target.contains(&(id & mask)))
            .collect();
        matching
            .into_iter()
            .filter_map(|id| partition.remove(&id))
            .collect()
    }
}
