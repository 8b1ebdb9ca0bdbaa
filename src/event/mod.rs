//! Domain events and the update-strategy decision machine.
//!
//! The [`EventClassifier`] is a pure decision function invoked per incoming
//! event on the update worker, so decisions never interleave. For each event
//! it picks the minimal strategy: a cheap in-place property patch, a partial
//! re-derivation, or a full rebuild. It never touches the geometry cache
//! itself; the worker executes whatever strategy it returns.

use tracing::debug;

use crate::geometry::Color;
use crate::id::ElementId;
use crate::style::StyleResolver;

/// A datatype-level color change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorChange {
    /// The new base color.
    pub color: Color,
    /// Only the alpha channel changed.
    pub opacity_only: bool,
    /// Monotonically increasing update sequence number.
    ///
    /// Guards against out-of-order delivery: an update whose sequence is not
    /// strictly greater than the last applied one is discarded.
    pub sequence: u64,
}

/// Datatype-level metadata events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataTypeEvent {
    /// The lift (altitude offset) configuration changed.
    LiftChanged,
    /// The z-order configuration changed.
    ZOrderChanged,
    /// The loads-to configuration changed.
    LoadsToChanged,
    /// The metadata key mapping changed.
    MetadataKeyChanged,
    /// An explicit rebuild was requested.
    RebuildRequested,
    /// The whole datatype was shown or hidden.
    VisibilityChanged(bool),
    /// The datatype's base color changed.
    ColorChanged(ColorChange),
}

/// Consolidated data-element events, batched over many elements.
///
/// Id lists are expected to be pre-filtered to the transformer's ids of
/// interest before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementEvent {
    /// Elements became visible or invisible.
    Visibility {
        visible: Vec<ElementId>,
        invisible: Vec<ElementId>,
    },
    /// Elements were selected or deselected.
    Selection { ids: Vec<ElementId>, selected: bool },
    /// Element colors changed.
    Color {
        ids: Vec<ElementId>,
        color: Color,
        /// Identity of the component that produced the change, used to
        /// suppress feedback loops.
        source: String,
        /// Externally forced changes are applied even when self-sourced.
        forced: bool,
    },
    /// Elements were highlighted. Handled by the picking path, not here.
    Highlight { ids: Vec<ElementId> },
    /// Catch-all element change requiring re-derivation.
    Refresh { ids: Vec<ElementId> },
}

/// How a color re-derivation obtains its color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSource {
    /// Use this exact color.
    Explicit(Color),
    /// Recompute from the element's selection state.
    Selection { selected: bool },
}

/// The minimal update a classified event requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Nothing to do.
    Ignore,
    /// Patch the visibility render property on every geometry in place.
    PatchVisibility(bool),
    /// Patch the alpha channel on every geometry in place.
    PatchOpacity(u8),
    /// Derive new geometries with an updated color for the given ids,
    /// or for all known ids when `ids` is `None`.
    DeriveColor {
        ids: Option<Vec<ElementId>>,
        color: ColorSource,
    },
    /// Rebuild geometries from source data for the given ids.
    Rebuild { ids: Vec<ElementId> },
    /// Rebuild geometries for every known id.
    RebuildAll,
    /// Move elements between the visible and hidden partitions.
    MovePartition {
        to_visible: Vec<ElementId>,
        to_hidden: Vec<ElementId>,
    },
}

/// Snapshot of the style aggregates consulted during classification.
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleTraits {
    pub applies_to_all_elements: bool,
    pub forces_full_rebuild: bool,
    pub selection_sensitive: bool,
}

impl StyleTraits {
    /// Snapshot the aggregates of a resolver, if the transformer has one.
    pub fn snapshot(resolver: Option<&StyleResolver>) -> Self {
        match resolver {
            Some(r) => Self {
                applies_to_all_elements: r.any_applies_to_all_elements(),
                forces_full_rebuild: r.any_forces_full_rebuild(),
                selection_sensitive: r.any_selection_sensitive(),
            },
            None => Self::default(),
        }
    }

    /// Multi-element styles cannot be patched incrementally; any per-event
    /// decision escalates to a rebuild over all known ids.
    fn escalates(&self) -> bool {
        self.applies_to_all_elements || self.forces_full_rebuild
    }
}

/// Per-transformer event classification state.
///
/// The only persistent state is the color sequence guard; everything else is
/// a pure function of the event and the style traits. Visibility and
/// metadata events intentionally carry no sequence guard.
#[derive(Debug, Default)]
pub struct EventClassifier {
    last_color_sequence: Option<u64>,
}

impl EventClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a datatype-level event.
    pub fn classify_data_type_event(
        &mut self,
        event: &DataTypeEvent,
        traits: &StyleTraits,
    ) -> UpdateStrategy {
        match event {
            DataTypeEvent::LiftChanged
            | DataTypeEvent::ZOrderChanged
            | DataTypeEvent::LoadsToChanged
            | DataTypeEvent::MetadataKeyChanged
            | DataTypeEvent::RebuildRequested => UpdateStrategy::RebuildAll,

            DataTypeEvent::VisibilityChanged(visible) => {
                if traits.escalates() {
                    UpdateStrategy::RebuildAll
                } else {
                    UpdateStrategy::PatchVisibility(*visible)
                }
            }

            DataTypeEvent::ColorChanged(change) => self.classify_color_change(change, traits),
        }
    }

    /// Classify a consolidated element event.
    ///
    /// The event's id lists must already be reduced to the transformer's ids
    /// of interest; an event with no remaining ids is ignored.
    pub fn classify_element_event(
        &self,
        event: &ElementEvent,
        own_source: &str,
        traits: &StyleTraits,
    ) -> UpdateStrategy {
        let decision = match event {
            // Highlighting is the picking path's concern.
            ElementEvent::Highlight { .. } => UpdateStrategy::Ignore,

            ElementEvent::Visibility { visible, invisible } => {
                if visible.is_empty() && invisible.is_empty() {
                    UpdateStrategy::Ignore
                } else {
                    UpdateStrategy::MovePartition {
                        to_visible: visible.clone(),
                        to_hidden: invisible.clone(),
                    }
                }
            }

            ElementEvent::Selection { ids, selected } => {
                if ids.is_empty() {
                    UpdateStrategy::Ignore
                } else if traits.selection_sensitive {
                    UpdateStrategy::Rebuild { ids: ids.clone() }
                } else {
                    UpdateStrategy::DeriveColor {
                        ids: Some(ids.clone()),
                        color: ColorSource::Selection {
                            selected: *selected,
                        },
                    }
                }
            }

            ElementEvent::Color {
                ids,
                color,
                source,
                forced,
            } => {
                if ids.is_empty() || (source == own_source && !forced) {
                    UpdateStrategy::Ignore
                } else {
                    UpdateStrategy::DeriveColor {
                        ids: Some(ids.clone()),
                        color: ColorSource::Explicit(*color),
                    }
                }
            }

            ElementEvent::Refresh { ids } => {
                if ids.is_empty() {
                    UpdateStrategy::Ignore
                } else {
                    UpdateStrategy::Rebuild { ids: ids.clone() }
                }
            }
        };

        if !matches!(decision, UpdateStrategy::Ignore) && traits.escalates() {
            return UpdateStrategy::RebuildAll;
        }
        decision
    }

    fn classify_color_change(
        &mut self,
        change: &ColorChange,
        traits: &StyleTraits,
    ) -> UpdateStrategy {
        if let Some(last) = self.last_color_sequence {
            if change.sequence <= last {
                debug!(
                    sequence = change.sequence,
                    last_applied = last,
                    "discarding stale color update"
                );
                return UpdateStrategy::Ignore;
            }
        }
        self.last_color_sequence = Some(change.sequence);

        if change.opacity_only {
            UpdateStrategy::PatchOpacity(change.color.a)
        } else if traits.escalates() {
            UpdateStrategy::RebuildAll
        } else {
            UpdateStrategy::DeriveColor {
                ids: None,
                color: ColorSource::Explicit(change.color),
            }
        }
    }
}
