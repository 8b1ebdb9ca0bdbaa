//! Integration tests for the layer transformer.
//!
//! These tests verify the complete update flows through the public facade:
//! - Element registration → derivation → registry publication
//! - Visibility events → partition moves with ordered diff publication
//! - Color-change sequencing across stale out-of-order events
//! - Style registry notifications → resolver invalidation → rebuild
//! - Spatial selection and purge commands
//! - Shutdown draining and post-shutdown submission behavior
//!
//! Run with: `cargo test --test transformer_integration`

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use geo::polygon;
use tokio::sync::broadcast;

use geolayer::error::DeriveError;
use geolayer::event::{ColorChange, DataTypeEvent, ElementEvent};
use geolayer::geometry::{
    Color, DataElement, Geometry, GeometryFactory, GeometryRegistry, ShapeClass,
};
use geolayer::id::{ElementId, GeometryIdCodec, IdentityIdCodec, PackedIdCodec};
use geolayer::region::RegionCommand;
use geolayer::store::ElementStore;
use geolayer::style::{Style, StyleEvent, StyleParams, StyleRegistry};
use geolayer::time::UnconstrainedTimeManager;
use geolayer::transformer::{LayerTransformer, TransformerConfig};

// ============================================================================
// Test Helpers
// ============================================================================

/// Factory double serving a fixed element set, with optional failures.
#[derive(Default)]
struct FixedFactory {
    elements: Mutex<HashMap<ElementId, DataElement>>,
}

impl FixedFactory {
    fn with_elements(elements: Vec<DataElement>) -> Self {
        Self {
            elements: Mutex::new(elements.into_iter().map(|e| (e.id, e)).collect()),
        }
    }
}

impl GeometryFactory for FixedFactory {
    fn elements_for_ids(&self, ids: &[ElementId]) -> Vec<DataElement> {
        let elements = self.elements.lock().unwrap();
        ids.iter().filter_map(|id| elements.get(id).cloned()).collect()
    }

    fn build_geometry(&self, element: &DataElement) -> Result<Geometry, DeriveError> {
        let mut geom = Geometry::new(element.id, element.shape);
        geom.bounds = element.bounds.clone();
        geom.time = element.time.clone();
        Ok(geom)
    }
}

/// Registry double recording every publish call in order.
#[derive(Default)]
struct RecordingRegistry {
    published: Mutex<Vec<(Vec<Geometry>, Vec<Geometry>)>>,
}

impl RecordingRegistry {
    fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    fn last_added_colors(&self) -> Vec<Color> {
        let published = self.published.lock().unwrap();
        published
            .last()
            .map(|(adds, _)| adds.iter().map(|g| g.props.color).collect())
            .unwrap_or_default()
    }
}

impl GeometryRegistry for RecordingRegistry {
    fn publish(&self, adds: Vec<Geometry>, removes: Vec<Geometry>) {
        self.published.lock().unwrap().push((adds, removes));
    }
}

/// Store double recording selection and removal calls.
#[derive(Default)]
struct RecordingStore {
    selections: Mutex<Vec<(Vec<ElementId>, Vec<ElementId>)>>,
    removed: Mutex<Vec<Vec<ElementId>>>,
}

impl ElementStore for RecordingStore {
    fn set_selection_state(
        &self,
        selected: &HashSet<ElementId>,
        touched: &HashSet<ElementId>,
        _type_key: &str,
        _source: &str,
    ) {
        let mut sel: Vec<_> = selected.iter().copied().collect();
        let mut tou: Vec<_> = touched.iter().copied().collect();
        sel.sort_unstable();
        tou.sort_unstable();
        self.selections.lock().unwrap().push((sel, tou));
    }

    fn set_opacity(&self, _alpha: u8, _ids: &[ElementId], _type_key: &str, _source: &str) {}

    fn set_color(&self, _color: Color, _ids: &[ElementId], _type_key: &str, _source: &str) {}

    fn remove_elements(&self, _type_key: &str, ids: &HashSet<ElementId>) {
        let mut ids: Vec<_> = ids.iter().copied().collect();
        ids.sort_unstable();
        self.removed.lock().unwrap().push(ids);
    }
}

/// Style registry double with a single shared style and a broadcast channel.
struct TestStyleRegistry {
    style: Mutex<Arc<Style>>,
    events: broadcast::Sender<StyleEvent>,
}

impl TestStyleRegistry {
    fn with_color(color: Color) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            style: Mutex::new(Style::new(StyleParams {
                color,
                ..StyleParams::default()
            })),
            events,
        }
    }

    fn notify(&self, event: StyleEvent) {
        let _ = self.events.send(event);
    }

    fn current_style(&self) -> Arc<Style> {
        Arc::clone(&self.style.lock().unwrap())
    }

    fn install(&self, style: Arc<Style>, type_key: &str) {
        *self.style.lock().unwrap() = style;
        self.notify(StyleEvent::Installed {
            type_key: type_key.to_string(),
        });
    }
}

impl StyleRegistry for TestStyleRegistry {
    fn get_style(&self, _shape: ShapeClass, _type_key: &str, _use_default: bool) -> Arc<Style> {
        self.current_style()
    }

    fn subscribe(&self) -> broadcast::Receiver<StyleEvent> {
        self.events.subscribe()
    }
}

struct Fixture {
    transformer: LayerTransformer,
    registry: Arc<RecordingRegistry>,
    store: Arc<RecordingStore>,
}

fn make_transformer(
    config: TransformerConfig,
    codec: Arc<dyn GeometryIdCodec>,
    factory: FixedFactory,
    styles: Option<Arc<TestStyleRegistry>>,
) -> Fixture {
    let registry = Arc::new(RecordingRegistry::default());
    let store = Arc::new(RecordingStore::default());
    let transformer = LayerTransformer::new(
        config,
        codec,
        Arc::new(factory),
        Arc::clone(&registry) as Arc<dyn GeometryRegistry>,
        Arc::clone(&store) as Arc<dyn ElementStore>,
        Arc::new(UnconstrainedTimeManager),
        styles.map(|s| s as Arc<dyn StyleRegistry>),
    );
    Fixture {
        transformer,
        registry,
        store,
    }
}

fn make_elements(ids: &[ElementId]) -> Vec<DataElement> {
    ids.iter()
        .map(|&id| DataElement::new(id, ShapeClass::Point))
        .collect()
}

/// Element whose geometry carries a unit-square bounds at the given offset.
fn make_bounded_element(id: ElementId, x: f64, y: f64) -> DataElement {
    let mut element = DataElement::new(id, ShapeClass::Polygon);
    element.bounds = Some(
        polygon![
            (x: x, y: y),
            (x: x + 1.0, y: y),
            (x: x + 1.0, y: y + 1.0),
            (x: x, y: y + 1.0),
        ]
        .into(),
    );
    element
}

fn query_polygon(x: f64, y: f64, size: f64) -> geo::Polygon<f64> {
    polygon![
        (x: x, y: y),
        (x: x + size, y: y),
        (x: x + size, y: y + size),
        (x: x, y: y + size),
    ]
}

/// Poll until the condition holds or the deadline expires.
async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within deadline"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Element lifecycle
// ============================================================================

#[tokio::test]
async fn test_add_elements_publishes_derived_geometries() {
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(IdentityIdCodec),
        FixedFactory::with_elements(make_elements(&[1, 2, 3])),
        None,
    );

    fx.transformer.add_elements(make_elements(&[1, 2, 3]));
    fx.transformer.flush().await.unwrap();

    assert_eq!(fx.transformer.visible_geometry_ids(), HashSet::from([1, 2, 3]));
    assert_eq!(fx.registry.publish_count(), 1);

    fx.transformer.shutdown().await;
}

#[tokio::test]
async fn test_remove_elements_publishes_removals() {
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(IdentityIdCodec),
        FixedFactory::with_elements(make_elements(&[1, 2])),
        None,
    );
    fx.transformer.add_elements(make_elements(&[1, 2]));
    fx.transformer.remove_elements(vec![1]);
    fx.transformer.flush().await.unwrap();

    assert_eq!(fx.transformer.visible_geometry_ids(), HashSet::from([2]));
    {
        let published = fx.registry.published.lock().unwrap();
        let (adds, removes) = published.last().unwrap();
        assert!(adds.is_empty());
        assert_eq!(removes.len(), 1);
        assert_eq!(removes[0].id, 1);
    }

    fx.transformer.shutdown().await;
}

#[tokio::test]
async fn test_geometry_id_reverse_lookup() {
    let codec = PackedIdCodec;
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(PackedIdCodec),
        FixedFactory::with_elements(make_elements(&[10, 11])),
        None,
    );
    fx.transformer.add_elements(make_elements(&[10, 11]));
    fx.transformer.flush().await.unwrap();

    // Without a resolver the packed codec uses tag 0; ask with a different
    // tag to exercise the masked comparison.
    let queried = codec.combine(5, 10);
    let mapping = fx
        .transformer
        .element_ids_for_geometry_ids(&[queried])
        .unwrap();
    assert_eq!(mapping.get(&queried), Some(&10));

    // Empty input is an argument error.
    assert!(fx.transformer.element_ids_for_geometry_ids(&[]).is_err());

    fx.transformer.shutdown().await;
}

// ============================================================================
// Visibility partition moves
// ============================================================================

#[tokio::test]
async fn test_visibility_event_moves_partitions_in_publish_order() {
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(IdentityIdCodec),
        FixedFactory::with_elements(make_elements(&[1, 2])),
        None,
    );
    fx.transformer.add_elements(make_elements(&[1, 2]));
    fx.transformer.flush().await.unwrap();

    // The event names {1,2,3} but only {1,2} are of interest here.
    fx.transformer.handle_element_event(ElementEvent::Visibility {
        visible: vec![],
        invisible: vec![1, 2, 3],
    });
    fx.transformer.handle_element_event(ElementEvent::Visibility {
        visible: vec![1, 3],
        invisible: vec![],
    });
    fx.transformer.flush().await.unwrap();

    assert_eq!(fx.transformer.visible_geometry_ids(), HashSet::from([1]));
    assert_eq!(fx.transformer.hidden_geometry_ids(), HashSet::from([2]));

    {
        let published = fx.registry.published.lock().unwrap();
        // Initial add, then the hide diff, then the show diff.
        assert_eq!(published.len(), 3);
        let (_, removes) = &published[1];
        assert_eq!(removes.len(), 2);
        let (adds, _) = &published[2];
        assert_eq!(adds.len(), 1);
        assert_eq!(adds[0].id, 1);
    }

    fx.transformer.shutdown().await;
}

#[tokio::test]
async fn test_partition_moves_not_published_when_disabled() {
    let fx = make_transformer(
        TransformerConfig::new("tracks").with_publish_updates(false),
        Arc::new(IdentityIdCodec),
        FixedFactory::with_elements(make_elements(&[1])),
        None,
    );
    fx.transformer.add_elements(make_elements(&[1]));
    fx.transformer.flush().await.unwrap();
    let after_add = fx.registry.publish_count();

    fx.transformer.handle_element_event(ElementEvent::Visibility {
        visible: vec![],
        invisible: vec![1],
    });
    fx.transformer.flush().await.unwrap();

    assert_eq!(fx.transformer.hidden_geometry_ids(), HashSet::from([1]));
    assert_eq!(fx.registry.publish_count(), after_add);

    fx.transformer.shutdown().await;
}

// ============================================================================
// Color-change sequencing
// ============================================================================

#[tokio::test]
async fn test_stale_color_change_is_dropped() {
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(IdentityIdCodec),
        FixedFactory::with_elements(make_elements(&[1])),
        None,
    );
    fx.transformer.add_elements(make_elements(&[1]));

    let first = Color::rgb(255, 0, 0);
    let stale = Color::rgb(0, 255, 0);
    let latest = Color::rgb(0, 0, 255);
    for (color, sequence) in [(first, 5), (stale, 3), (latest, 7)] {
        fx.transformer
            .handle_data_type_event(DataTypeEvent::ColorChanged(ColorChange {
                color,
                opacity_only: false,
                sequence,
            }));
    }
    fx.transformer.flush().await.unwrap();

    {
        let published = fx.registry.published.lock().unwrap();
        // Initial add plus two applied color changes; sequence 3 was stale.
        assert_eq!(published.len(), 3);
        assert_eq!(published[1].0[0].props.color, first);
        assert_eq!(published[2].0[0].props.color, latest);
    }

    fx.transformer.shutdown().await;
}

// ============================================================================
// Style registry integration
// ============================================================================

#[tokio::test]
async fn test_elements_derive_with_registry_style_color() {
    let styles = Arc::new(TestStyleRegistry::with_color(Color::rgb(200, 100, 0)));
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(PackedIdCodec),
        FixedFactory::with_elements(make_elements(&[1])),
        Some(Arc::clone(&styles)),
    );

    fx.transformer.add_elements(make_elements(&[1]));
    fx.transformer.flush().await.unwrap();

    assert_eq!(fx.registry.last_added_colors(), vec![Color::rgb(200, 100, 0)]);
    // The resolver assigns tag 1 to the first shape class it sees.
    let codec = PackedIdCodec;
    assert!(fx
        .transformer
        .visible_geometry_ids()
        .contains(&codec.combine(1, 1)));

    fx.transformer.shutdown().await;
}

#[tokio::test]
async fn test_style_params_change_triggers_rebuild() {
    let styles = Arc::new(TestStyleRegistry::with_color(Color::rgb(200, 100, 0)));
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(PackedIdCodec),
        FixedFactory::with_elements(make_elements(&[1])),
        Some(Arc::clone(&styles)),
    );
    fx.transformer.add_elements(make_elements(&[1]));
    fx.transformer.flush().await.unwrap();

    // Change the held style in place and notify; the listener submits a
    // rebuild which re-derives with the new color.
    let style = styles.current_style();
    let mut params = style.params();
    params.color = Color::rgb(0, 200, 50);
    style.set_params(params);
    styles.notify(StyleEvent::ParamsChanged {
        style_id: style.id(),
    });

    let registry = Arc::clone(&fx.registry);
    wait_for(move || registry.last_added_colors() == vec![Color::rgb(0, 200, 50)]).await;

    fx.transformer.shutdown().await;
}

#[tokio::test]
async fn test_installed_style_for_other_type_is_ignored() {
    let styles = Arc::new(TestStyleRegistry::with_color(Color::rgb(200, 100, 0)));
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(PackedIdCodec),
        FixedFactory::with_elements(make_elements(&[1])),
        Some(Arc::clone(&styles)),
    );
    fx.transformer.add_elements(make_elements(&[1]));
    fx.transformer.flush().await.unwrap();
    let after_add = fx.registry.publish_count();

    styles.notify(StyleEvent::Installed {
        type_key: "other-type".to_string(),
    });
    // Give the listener a chance to (wrongly) react.
    tokio::time::sleep(Duration::from_millis(50)).await;
    fx.transformer.flush().await.unwrap();

    assert_eq!(fx.registry.publish_count(), after_add);

    fx.transformer.shutdown().await;
}

#[tokio::test]
async fn test_newly_installed_style_applies_on_rebuild() {
    let styles = Arc::new(TestStyleRegistry::with_color(Color::rgb(200, 100, 0)));
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(PackedIdCodec),
        FixedFactory::with_elements(make_elements(&[1])),
        Some(Arc::clone(&styles)),
    );
    fx.transformer.add_elements(make_elements(&[1]));
    fx.transformer.flush().await.unwrap();

    styles.install(
        Style::new(StyleParams {
            color: Color::rgb(10, 20, 30),
            ..StyleParams::default()
        }),
        "tracks",
    );

    let registry = Arc::clone(&fx.registry);
    wait_for(move || registry.last_added_colors() == vec![Color::rgb(10, 20, 30)]).await;

    fx.transformer.shutdown().await;
}

// ============================================================================
// Region commands
// ============================================================================

#[tokio::test]
async fn test_select_command_reports_intersecting_elements() {
    let elements = vec![
        make_bounded_element(1, 0.0, 0.0),
        make_bounded_element(2, 10.0, 10.0),
    ];
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(IdentityIdCodec),
        FixedFactory::with_elements(elements.clone()),
        None,
    );
    fx.transformer.add_elements(elements);

    fx.transformer
        .handle_selection_command(vec![query_polygon(-1.0, -1.0, 3.0)], RegionCommand::Select);
    fx.transformer.flush().await.unwrap();

    let selections = fx.store.selections.lock().unwrap();
    assert_eq!(selections.len(), 1);
    assert_eq!(selections[0], (vec![1], vec![1]));
    drop(selections);

    fx.transformer.shutdown().await;
}

#[tokio::test]
async fn test_purge_through_selection_surface_is_rejected() {
    let elements = vec![make_bounded_element(1, 0.0, 0.0)];
    let fx = make_transformer(
        TransformerConfig::new("tracks").with_purge_allowed(true),
        Arc::new(IdentityIdCodec),
        FixedFactory::with_elements(elements.clone()),
        None,
    );
    fx.transformer.add_elements(elements);

    fx.transformer
        .handle_selection_command(vec![query_polygon(-1.0, -1.0, 3.0)], RegionCommand::Purge);
    fx.transformer.flush().await.unwrap();

    assert!(fx.store.removed.lock().unwrap().is_empty());
    assert_eq!(fx.transformer.visible_geometry_ids(), HashSet::from([1]));

    fx.transformer.shutdown().await;
}

#[tokio::test]
async fn test_purge_command_gated_by_configuration() {
    let elements = vec![make_bounded_element(1, 0.0, 0.0)];

    // Purge disallowed: the command is a no-op.
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(IdentityIdCodec),
        FixedFactory::with_elements(elements.clone()),
        None,
    );
    fx.transformer.add_elements(elements.clone());
    fx.transformer
        .handle_purge_command(vec![query_polygon(-1.0, -1.0, 3.0)]);
    fx.transformer.flush().await.unwrap();
    assert!(fx.store.removed.lock().unwrap().is_empty());
    assert_eq!(fx.transformer.visible_geometry_ids(), HashSet::from([1]));
    fx.transformer.shutdown().await;

    // Purge allowed: intersecting elements are removed from the store.
    let fx = make_transformer(
        TransformerConfig::new("tracks").with_purge_allowed(true),
        Arc::new(IdentityIdCodec),
        FixedFactory::with_elements(elements.clone()),
        None,
    );
    fx.transformer.add_elements(elements);
    fx.transformer
        .handle_purge_command(vec![query_polygon(-1.0, -1.0, 3.0)]);
    fx.transformer.flush().await.unwrap();
    assert_eq!(*fx.store.removed.lock().unwrap(), vec![vec![1]]);
    fx.transformer.shutdown().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_drains_pending_tasks_then_clears() {
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(IdentityIdCodec),
        FixedFactory::with_elements(make_elements(&[1, 2])),
        None,
    );
    fx.transformer.add_elements(make_elements(&[1, 2]));
    fx.transformer.shutdown().await;

    // The add ran before the final clear: two adds published, then two
    // removes from the clear.
    let published = fx.registry.published.lock().unwrap();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].0.len(), 2);
    assert_eq!(published[1].1.len(), 2);
    drop(published);

    assert!(fx.transformer.visible_geometry_ids().is_empty());
    assert!(fx.transformer.hidden_geometry_ids().is_empty());
}

#[tokio::test]
async fn test_submissions_after_shutdown_are_dropped() {
    let fx = make_transformer(
        TransformerConfig::new("tracks"),
        Arc::new(IdentityIdCodec),
        FixedFactory::with_elements(make_elements(&[1])),
        None,
    );
    fx.transformer.shutdown().await;

    fx.transformer.add_elements(make_elements(&[1]));
    assert!(fx.transformer.flush().await.is_err());
    assert_eq!(fx.registry.publish_count(), 0);
    assert!(fx.transformer.visible_geometry_ids().is_empty());
}
