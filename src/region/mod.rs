//! Spatial select/deselect/purge commands over query polygons.
//!
//! A region command classifies every geometry in the visible partition into
//! an intersecting and a non-intersecting set, under the geometry cache lock
//! as a single atomic unit, then dispatches the matching mutation to the
//! external element store. Hidden geometries never participate.
//!
//! Query polygons arrive already split and normalized by an external
//! geometry-conversion collaborator.

use std::collections::HashSet;
use std::sync::Arc;

use geo::{Intersects, Polygon};
use tracing::{debug, warn};

use crate::cache::GeometryCache;
use crate::geometry::Geometry;
use crate::id::ElementId;
use crate::store::ElementStore;
use crate::time::{TimeManager, TimeSpan};

/// Spatial command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionCommand {
    /// Mark the intersecting set selected.
    Select,
    /// Mark the intersecting set selected and everything else deselected.
    SelectExclusive,
    /// Mark the intersecting set deselected.
    Deselect,
    /// Request deletion of the intersecting elements from the store.
    Purge,
}

impl RegionCommand {
    /// Whether geometries are filtered by their time constraints first.
    ///
    /// Purge operates on everything drawn in the region regardless of the
    /// active time spans; the selection commands honor them.
    fn requires_time_filter(self) -> bool {
        !matches!(self, RegionCommand::Purge)
    }
}

/// Executes region commands for one transformer.
pub struct RegionCommandProcessor {
    cache: Arc<GeometryCache>,
    store: Arc<dyn ElementStore>,
    time: Arc<dyn TimeManager>,
    type_key: String,
    source: String,
    /// Whether the owning data type's loads-to configuration permits
    /// analysis/removal. Supplied by the embedder; opaque to this engine.
    purge_allowed: bool,
}

impl RegionCommandProcessor {
    pub fn new(
        cache: Arc<GeometryCache>,
        store: Arc<dyn ElementStore>,
        time: Arc<dyn TimeManager>,
        type_key: impl Into<String>,
        source: impl Into<String>,
        purge_allowed: bool,
    ) -> Self {
        Self {
            cache,
            store,
            time,
            type_key: type_key.into(),
            source: source.into(),
            purge_allowed,
        }
    }

    /// Classify the visible partition against the query polygons and
    /// dispatch the command.
    ///
    /// An empty intersecting set after filtering performs no mutation.
    pub fn process(&self, polygons: &[Polygon<f64>], command: RegionCommand) {
        if command == RegionCommand::Purge && !self.purge_allowed {
            warn!(
                type_key = %self.type_key,
                "purge rejected: loads-to configuration disallows analysis"
            );
            return;
        }

        let filter_time = command.requires_time_filter();
        let primary_spans = if filter_time {
            self.time.primary_active_spans()
        } else {
            Vec::new()
        };

        let (intersecting, non_intersecting) = self.cache.classify_visible(|geom| {
            if filter_time && !self.passes_time(geom, &primary_spans) {
                return false;
            }
            Self::intersects_any(geom, polygons)
        });

        debug!(
            command = ?command,
            intersecting = intersecting.len(),
            non_intersecting = non_intersecting.len(),
            "region command classified"
        );

        if intersecting.is_empty() {
            return;
        }

        match command {
            RegionCommand::Select => {
                self.store
                    .set_selection_state(&intersecting, &intersecting, &self.type_key, &self.source);
            }
            RegionCommand::SelectExclusive => {
                // Touch both sets so the store sees one consistent state.
                let touched: HashSet<ElementId> = intersecting
                    .union(&non_intersecting)
                    .copied()
                    .collect();
                self.store
                    .set_selection_state(&intersecting, &touched, &self.type_key, &self.source);
            }
            RegionCommand::Deselect => {
                self.store.set_selection_state(
                    &HashSet::new(),
                    &intersecting,
                    &self.type_key,
                    &self.source,
                );
            }
            RegionCommand::Purge => {
                self.store.remove_elements(&self.type_key, &intersecting);
            }
        }
    }

    /// Evaluate a geometry's time constraint against the active spans.
    ///
    /// A geometry without a constraint always passes. An empty active span
    /// list leaves the corresponding dimension unconstrained.
    fn passes_time(&self, geom: &Geometry, primary_spans: &[TimeSpan]) -> bool {
        let Some(constraint) = &geom.time else {
            return true;
        };
        if !primary_spans.is_empty()
            && !primary_spans.iter().any(|s| s.overlaps(&constraint.span))
        {
            return false;
        }
        if let Some(key) = &constraint.secondary_key {
            let secondary = self.time.secondary_active_spans(key);
            if !secondary.is_empty() && !secondary.iter().any(|s| s.overlaps(&constraint.span)) {
                return false;
            }
        }
        true
    }

    /// Whether a geometry's bounds intersect any query polygon.
    ///
    /// Geometries without usable bounds fail the test; they never error.
    fn intersects_any(geom: &Geometry, polygons: &[Polygon<f64>]) -> bool {
        match &geom.bounds {
            Some(bounds) => polygons.iter().any(|p| bounds.intersects(p)),
            None => false,
        }
    }
}
