//! Style resolution for one transformer.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::geometry::ShapeClass;
use crate::id::{ElementId, TypeTag};
use crate::style::types::{Style, StyleEvent, StyleRegistry};

/// Per-transformer style lookup with per-element overrides.
///
/// See the [module docs](crate::style) for the locking layout. Type tags are
/// assigned lazily on first encounter, starting at 1, and are stable for the
/// lifetime of the resolver; tag 0 is reserved for transformers that do not
/// multiplex geometry types.
pub struct StyleResolver {
    type_key: String,
    registry: Arc<dyn StyleRegistry>,
    /// Element-level overrides; checked before the type-level style.
    overrides: RwLock<HashMap<ElementId, Arc<Style>>>,
    /// Resolved type-level style per shape class.
    by_shape: DashMap<ShapeClass, Arc<Style>>,
    /// Shape class → assigned tag.
    tag_for_shape: DashMap<ShapeClass, TypeTag>,
    /// Assigned tag → shape class.
    shape_for_tag: DashMap<TypeTag, ShapeClass>,
    next_tag: AtomicU64,
    /// Identities of styles we have registered a change listener for.
    listened: Mutex<HashSet<u64>>,
}

impl StyleResolver {
    /// Create a resolver bound to one data type key.
    pub fn new(type_key: impl Into<String>, registry: Arc<dyn StyleRegistry>) -> Self {
        Self {
            type_key: type_key.into(),
            registry,
            overrides: RwLock::new(HashMap::new()),
            by_shape: DashMap::new(),
            tag_for_shape: DashMap::new(),
            shape_for_tag: DashMap::new(),
            next_tag: AtomicU64::new(1),
            listened: Mutex::new(HashSet::new()),
        }
    }

    /// The data type key this resolver serves.
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// Resolve the style for a shape class, honoring element overrides.
    ///
    /// When `element_id` is `Some` and an override exists for it, the
    /// override wins. Otherwise the type-level style is looked up, lazily
    /// assigning the shape's tag and querying the external registry on first
    /// encounter.
    pub fn resolve(&self, shape: ShapeClass, element_id: Option<ElementId>) -> Arc<Style> {
        if let Some(id) = element_id {
            let overrides = self.overrides.read().unwrap_or_else(|e| e.into_inner());
            if let Some(style) = overrides.get(&id) {
                trace!(element_id = id, "resolved element style override");
                return Arc::clone(style);
            }
        }

        self.tag_for(shape);

        if let Some(style) = self.by_shape.get(&shape) {
            return Arc::clone(style.value());
        }

        let style = self.registry.get_style(shape, &self.type_key, true);
        self.register_listener(&style);
        debug!(
            shape = ?shape,
            style_id = style.id(),
            type_key = %self.type_key,
            "cached type-level style"
        );
        self.by_shape.insert(shape, Arc::clone(&style));
        style
    }

    /// The stable tag for a shape class, assigned on first encounter.
    pub fn tag_for(&self, shape: ShapeClass) -> TypeTag {
        if let Some(tag) = self.tag_for_shape.get(&shape) {
            return *tag.value();
        }
        let tag = *self
            .tag_for_shape
            .entry(shape)
            .or_insert_with(|| self.next_tag.fetch_add(1, Ordering::Relaxed));
        self.shape_for_tag.insert(tag, shape);
        tag
    }

    /// The shape class behind an assigned tag, if any.
    pub fn shape_for(&self, tag: TypeTag) -> Option<ShapeClass> {
        self.shape_for_tag.get(&tag).map(|s| *s.value())
    }

    /// Install a style override for a set of elements.
    pub fn set_override(&self, ids: &[ElementId], style: Arc<Style>) {
        self.register_listener(&style);
        let mut overrides = self.write_overrides();
        for id in ids {
            overrides.insert(*id, Arc::clone(&style));
        }
        debug!(count = ids.len(), style_id = style.id(), "set style overrides");
    }

    /// Remove style overrides for a set of elements.
    pub fn remove_override(&self, ids: &[ElementId]) {
        let dropped: Vec<u64> = {
            let mut overrides = self.write_overrides();
            ids.iter()
                .filter_map(|id| overrides.remove(id))
                .map(|s| s.id())
                .collect()
        };
        self.prune_listeners(&dropped);
        debug!(count = ids.len(), "removed style overrides");
    }

    /// Whether any held style renders all elements together.
    pub fn any_applies_to_all_elements(&self) -> bool {
        self.any_style(|s| s.params().applies_to_all_elements)
    }

    /// Whether any held style requires a full rebuild on change.
    pub fn any_forces_full_rebuild(&self) -> bool {
        self.any_style(|s| s.params().forces_full_rebuild)
    }

    /// Whether any held style is sensitive to selection state.
    pub fn any_selection_sensitive(&self) -> bool {
        self.any_style(|s| s.params().selection_sensitive)
    }

    /// Whether any held style reads element metadata during derivation.
    pub fn any_requires_metadata(&self) -> bool {
        self.any_style(|s| s.params().requires_metadata)
    }

    /// React to a style-registry notification.
    ///
    /// Returns `true` when the owner must rebuild its geometries: a held
    /// style changed parameters, a held style was replaced, or a new
    /// type-level style was installed for this resolver's type key.
    pub fn handle_style_event(&self, event: &StyleEvent) -> bool {
        match event {
            StyleEvent::Installed { type_key } => {
                if type_key != &self.type_key {
                    return false;
                }
                // Drop the cached type-level styles so the next resolve
                // refetches from the registry. Tags stay assigned; listener
                // registrations follow the dropped styles out.
                let dropped: Vec<u64> =
                    self.by_shape.iter().map(|e| e.value().id()).collect();
                self.by_shape.clear();
                self.prune_listeners(&dropped);
                debug!(type_key = %self.type_key, "type-level styles invalidated");
                true
            }
            StyleEvent::ParamsChanged { style_id } => {
                let held = self
                    .listened
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .contains(style_id);
                if held {
                    debug!(style_id, "held style parameters changed");
                }
                held
            }
            StyleEvent::Replaced { old_id, new } => self.replace_style(*old_id, new),
        }
    }

    /// Clear every cached style, override, and listener registration.
    pub fn shutdown(&self) {
        self.write_overrides().clear();
        self.by_shape.clear();
        self.listened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        debug!(type_key = %self.type_key, "style resolver shut down");
    }

    /// Swap every reference to `old_id` for the replacement style.
    fn replace_style(&self, old_id: u64, new: &Arc<Style>) -> bool {
        let mut swapped = false;

        for mut entry in self.by_shape.iter_mut() {
            if entry.value().id() == old_id {
                *entry.value_mut() = Arc::clone(new);
                swapped = true;
            }
        }

        {
            let mut overrides = self.write_overrides();
            for style in overrides.values_mut() {
                if style.id() == old_id {
                    *style = Arc::clone(new);
                    swapped = true;
                }
            }
        }

        if swapped {
            let mut listened = self.listened.lock().unwrap_or_else(|e| e.into_inner());
            listened.remove(&old_id);
            listened.insert(new.id());
            debug!(old_id, new_id = new.id(), "replaced held style");
        }
        swapped
    }

    /// Stop listening to styles that are no longer held.
    ///
    /// A candidate id stays registered if the type-level map or the override
    /// map still references a style with that id.
    fn prune_listeners(&self, candidates: &[u64]) {
        if candidates.is_empty() {
            return;
        }
        let still_held: HashSet<u64> = {
            let overrides = self.overrides.read().unwrap_or_else(|e| e.into_inner());
            self.by_shape
                .iter()
                .map(|e| e.value().id())
                .chain(overrides.values().map(|s| s.id()))
                .collect()
        };
        let mut listened = self.listened.lock().unwrap_or_else(|e| e.into_inner());
        for id in candidates {
            if !still_held.contains(id) {
                listened.remove(id);
            }
        }
    }

    /// Record that we observe change notifications for this style.
    fn register_listener(&self, style: &Arc<Style>) {
        self.listened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(style.id());
    }

    /// Exclusive override access: non-blocking attempt first, then blocking.
    fn write_overrides(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ElementId, Arc<Style>>> {
        match self.overrides.try_write() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::WouldBlock) => {
                self.overrides.write().unwrap_or_else(|e| e.into_inner())
            }
            Err(std::sync::TryLockError::Poisoned(e)) => e.into_inner(),
        }
    }

    fn any_style<F>(&self, predicate: F) -> bool
    where
        F: Fn(&Style) -> bool,
    {
        if self.by_shape.iter().any(|entry| predicate(entry.value())) {
            return true;
        }
        let overrides = self.overrides.read().unwrap_or_else(|e| e.into_inner());
        overrides.values().any(|s| predicate(s))
    }
}
