//! The single update worker behind a transformer.
//!
//! The worker is the sole writer of the geometry cache and the sole driver
//! of style aggregate recomputation. It drains the update queue one task at
//! a time; a task acquires the cache lock only for the duration of a single
//! partition operation, and registry publishes always happen outside the
//! lock.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::cache::GeometryCache;
use crate::event::{
    ColorSource, DataTypeEvent, ElementEvent, EventClassifier, StyleTraits, UpdateStrategy,
};
use crate::geometry::{Color, DataElement, Geometry, GeometryFactory, GeometryRegistry};
use crate::id::{ElementId, GeometryIdCodec};
use crate::region::RegionCommandProcessor;
use crate::store::ElementStore;
use crate::style::StyleResolver;
use crate::transformer::config::TransformerConfig;
use crate::transformer::task::UpdateTask;

/// How a derivation picks the render color.
#[derive(Debug, Clone, Copy)]
enum DeriveColorMode {
    /// Resolved style color (or the factory's color without a resolver).
    Style,
    /// A specific color pushed by a color-change event.
    Explicit(Color),
    /// Selection-state color.
    Selection { selected: bool },
}

pub(super) struct TransformerWorker {
    config: TransformerConfig,
    codec: Arc<dyn GeometryIdCodec>,
    factory: Arc<dyn GeometryFactory>,
    registry: Arc<dyn GeometryRegistry>,
    store: Arc<dyn ElementStore>,
    cache: Arc<GeometryCache>,
    resolver: Option<Arc<StyleResolver>>,
    region: RegionCommandProcessor,
    classifier: EventClassifier,
    /// Set once the final clear has run; later tasks become no-ops.
    cleared: bool,
}

impl TransformerWorker {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        config: TransformerConfig,
        codec: Arc<dyn GeometryIdCodec>,
        factory: Arc<dyn GeometryFactory>,
        registry: Arc<dyn GeometryRegistry>,
        store: Arc<dyn ElementStore>,
        cache: Arc<GeometryCache>,
        resolver: Option<Arc<StyleResolver>>,
        region: RegionCommandProcessor,
    ) -> Self {
        Self {
            config,
            codec,
            factory,
            registry,
            store,
            cache,
            resolver,
            region,
            classifier: EventClassifier::new(),
            cleared: false,
        }
    }

    /// Drain the update queue until it is closed and empty.
    pub(super) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<UpdateTask>) {
        debug!(type_key = %self.config.type_key, "update worker started");
        while let Some(task) = rx.recv().await {
            self.handle(task);
        }
        debug!(type_key = %self.config.type_key, "update worker stopped (queue closed)");
    }

    fn handle(&mut self, task: UpdateTask) {
        if self.cleared {
            // A task raced shutdown; the cache is gone, nothing to do.
            if let UpdateTask::Flush(done) = task {
                let _ = done.send(());
            } else {
                trace!("task after final clear, ignoring");
            }
            return;
        }

        match task {
            UpdateTask::AddElements(elements) => self.add_elements(elements),
            UpdateTask::RemoveElements(ids) => self.remove_elements(&ids),
            UpdateTask::DataType(event) => self.handle_data_type_event(event),
            UpdateTask::Element(event) => self.handle_element_event(event),
            UpdateTask::Region { polygons, command } => self.region.process(&polygons, command),
            UpdateTask::Flush(done) => {
                let _ = done.send(());
            }
            UpdateTask::Clear => self.clear(),
        }
    }

    fn add_elements(&self, elements: Vec<DataElement>) {
        if elements.is_empty() {
            return;
        }
        let ids: Vec<ElementId> = elements.iter().map(|e| e.id).collect();
        self.cache.add_element_ids(&ids);
        let geoms = self.derive(&elements, DeriveColorMode::Style);
        let outcome = self.cache.replace_elements(&ids, geoms);
        self.publish(outcome.added, outcome.removed);
    }

    fn remove_elements(&self, ids: &[ElementId]) {
        if ids.is_empty() {
            return;
        }
        let removed = self.cache.remove_elements(ids);
        self.publish(Vec::new(), removed);
    }

    fn handle_data_type_event(&mut self, event: DataTypeEvent) {
        let traits = StyleTraits::snapshot(self.resolver.as_deref());
        let strategy = self.classifier.classify_data_type_event(&event, &traits);

        // Color changes additionally push the new state to the element store.
        let store_side_effect = match (&event, &strategy) {
            (DataTypeEvent::ColorChanged(_), UpdateStrategy::PatchOpacity(alpha)) => {
                Some((None, Some(*alpha)))
            }
            (DataTypeEvent::ColorChanged(change), UpdateStrategy::RebuildAll) => {
                Some((Some(change.color), None))
            }
            _ => None,
        };

        self.execute(strategy);

        if let Some((color, alpha)) = store_side_effect {
            let ids = self.cache.all_element_ids();
            if let Some(alpha) = alpha {
                self.store
                    .set_opacity(alpha, &ids, &self.config.type_key, &self.config.source);
            }
            if let Some(color) = color {
                self.store
                    .set_color(color, &ids, &self.config.type_key, &self.config.source);
            }
        }
    }

    fn handle_element_event(&mut self, event: ElementEvent) {
        let event = self.filter_to_interest(event);
        let traits = StyleTraits::snapshot(self.resolver.as_deref());
        let strategy = self
            .classifier
            .classify_element_event(&event, &self.config.source, &traits);
        self.execute(strategy);
    }

    /// Reduce an event's id lists to this transformer's ids of interest.
    fn filter_to_interest(&self, event: ElementEvent) -> ElementEvent {
        match event {
            ElementEvent::Visibility { visible, invisible } => ElementEvent::Visibility {
                visible: self.cache.ids_of_interest(&visible),
                invisible: self.cache.ids_of_interest(&invisible),
            },
            ElementEvent::Selection { ids, selected } => ElementEvent::Selection {
                ids: self.cache.ids_of_interest(&ids),
                selected,
            },
            ElementEvent::Color {
                ids,
                color,
                source,
                forced,
            } => ElementEvent::Color {
                ids: self.cache.ids_of_interest(&ids),
                color,
                source,
                forced,
            },
            ElementEvent::Refresh { ids } => ElementEvent::Refresh {
                ids: self.cache.ids_of_interest(&ids),
            },
            other @ ElementEvent::Highlight { .. } => other,
        }
    }

    fn execute(&mut self, strategy: UpdateStrategy) {
        match strategy {
            UpdateStrategy::Ignore => {}
            UpdateStrategy::PatchVisibility(visible) => self.cache.patch_visibility(visible),
            UpdateStrategy::PatchOpacity(alpha) => self.cache.patch_alpha(alpha),
            UpdateStrategy::DeriveColor { ids, color } => {
                let ids = ids.unwrap_or_else(|| self.cache.all_element_ids());
                let mode = match color {
                    ColorSource::Explicit(c) => DeriveColorMode::Explicit(c),
                    ColorSource::Selection { selected } => DeriveColorMode::Selection { selected },
                };
                self.rebuild(ids, mode);
            }
            UpdateStrategy::Rebuild { ids } => self.rebuild(ids, DeriveColorMode::Style),
            UpdateStrategy::RebuildAll => {
                let ids = self.cache.all_element_ids();
                self.rebuild(ids, DeriveColorMode::Style);
            }
            UpdateStrategy::MovePartition {
                to_visible,
                to_hidden,
            } => self.move_partitions(to_visible, to_hidden),
        }
    }

    /// Re-derive geometries for the given elements and swap them into the
    /// cache, publishing the resulting visible-set diff.
    fn rebuild(&self, ids: Vec<ElementId>, mode: DeriveColorMode) {
        if ids.is_empty() {
            return;
        }
        let elements = self.factory.elements_for_ids(&ids);
        let geoms = self.derive(&elements, mode);
        let outcome = self.cache.replace_elements(&ids, geoms);
        debug!(
            elements = ids.len(),
            derived = outcome.added.len(),
            "rebuilt geometries"
        );
        self.publish(outcome.added, outcome.removed);
    }

    /// Convert elements into geometries with final packed ids.
    ///
    /// A failing element is skipped and logged; the batch continues.
    fn derive(&self, elements: &[DataElement], mode: DeriveColorMode) -> Vec<Geometry> {
        elements
            .iter()
            .filter_map(|element| match self.factory.build_geometry(element) {
                Ok(mut geom) => {
                    let tag = self
                        .resolver
                        .as_ref()
                        .map(|r| r.tag_for(element.shape))
                        .unwrap_or(0);
                    geom.id = self.codec.combine(tag, element.id);
                    geom.shape = element.shape;
                    self.apply_color(&mut geom, element, mode);
                    Some(geom)
                }
                Err(err) => {
                    warn!(
                        element_id = element.id,
                        error = %err,
                        "geometry derivation failed; skipping element"
                    );
                    None
                }
            })
            .collect()
    }

    fn apply_color(&self, geom: &mut Geometry, element: &DataElement, mode: DeriveColorMode) {
        let style_color = self
            .resolver
            .as_ref()
            .map(|r| r.resolve(geom.shape, Some(element.id)).color());
        // A color reported on the payload reflects earlier color events
        // recorded in the store and wins over the resolved style.
        let base_color = element.color.or(style_color);
        match mode {
            DeriveColorMode::Style => {
                if let Some(color) = base_color {
                    geom.props.color = color;
                }
            }
            DeriveColorMode::Explicit(color) => geom.props.color = color,
            DeriveColorMode::Selection { selected } => {
                geom.props.selected = selected;
                geom.props.color = if selected {
                    self.config.selection_color
                } else {
                    base_color.unwrap_or(geom.props.color)
                };
            }
        }
    }

    /// Apply a partition move, publishing the shown diff before the hidden
    /// diff when diff publication is enabled.
    fn move_partitions(&self, to_visible: Vec<ElementId>, to_hidden: Vec<ElementId>) {
        let shown = self
            .cache
            .move_to_visible(&to_visible.into_iter().collect::<HashSet<_>>());
        if self.config.publish_updates && !shown.is_empty() {
            self.registry.publish(shown, Vec::new());
        }
        let hidden = self
            .cache
            .move_to_hidden(&to_hidden.into_iter().collect::<HashSet<_>>());
        if self.config.publish_updates && !hidden.is_empty() {
            self.registry.publish(Vec::new(), hidden);
        }
    }

    /// The final shutdown task: drop every managed geometry.
    fn clear(&mut self) {
        let removed = self.cache.clear();
        self.publish(Vec::new(), removed);
        if let Some(resolver) = &self.resolver {
            resolver.shutdown();
        }
        self.cleared = true;
        debug!(type_key = %self.config.type_key, "transformer state cleared");
    }

    fn publish(&self, adds: Vec<Geometry>, removes: Vec<Geometry>) {
        if adds.is_empty() && removes.is_empty() {
            return;
        }
        self.registry.publish(adds, removes);
    }
}
