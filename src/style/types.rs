//! Style objects and the external style-registry boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use crate::geometry::{Color, ShapeClass};

/// Global counter for style identities.
static STYLE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Resolved style parameters.
///
/// The flags feed the resolver's aggregate predicates: a style that applies
/// to all elements or forces a full rebuild disables incremental patching
/// for the whole transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleParams {
    /// Base render color.
    pub color: Color,
    /// Style renders all elements together and cannot be patched per element.
    pub applies_to_all_elements: bool,
    /// Any change touching this style requires a full geometry rebuild.
    pub forces_full_rebuild: bool,
    /// Selection state changes require re-derivation rather than a color patch.
    pub selection_sensitive: bool,
    /// Style reads element metadata during derivation.
    pub requires_metadata: bool,
}

impl Default for StyleParams {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            applies_to_all_elements: false,
            forces_full_rebuild: false,
            selection_sensitive: false,
            requires_metadata: false,
        }
    }
}

/// A shared, read-mostly visualization style.
///
/// Styles are shared between the registry and every resolver holding them;
/// parameter changes are observed via [`StyleEvent::ParamsChanged`], not by
/// copying. Each style has a stable identity used to track listeners and
/// replacements.
#[derive(Debug)]
pub struct Style {
    id: u64,
    params: RwLock<StyleParams>,
}

impl Style {
    /// Create a new style with a fresh identity.
    pub fn new(params: StyleParams) -> Arc<Self> {
        Arc::new(Self {
            id: STYLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            params: RwLock::new(params),
        })
    }

    /// Stable identity of this style object.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Snapshot of the current parameters.
    pub fn params(&self) -> StyleParams {
        *self.params.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the parameters in place.
    ///
    /// Observers learn about the change through the registry's
    /// [`StyleEvent::ParamsChanged`] notification.
    pub fn set_params(&self, params: StyleParams) {
        *self.params.write().unwrap_or_else(|e| e.into_inner()) = params;
    }

    /// Base render color of this style.
    pub fn color(&self) -> Color {
        self.params().color
    }
}

/// Notifications published by the style registry.
#[derive(Debug, Clone)]
pub enum StyleEvent {
    /// A new type-level style was installed for the given type key.
    Installed { type_key: String },
    /// The parameters of an existing style object changed in place.
    ParamsChanged { style_id: u64 },
    /// A style object was replaced wholesale by a new one.
    Replaced { old_id: u64, new: Arc<Style> },
}

/// External source of resolved styles.
pub trait StyleRegistry: Send + Sync + 'static {
    /// Look up (or create) the style for a shape class under a type key.
    fn get_style(&self, shape: ShapeClass, type_key: &str, use_default: bool) -> Arc<Style>;

    /// Subscribe to style lifecycle notifications.
    fn subscribe(&self) -> broadcast::Receiver<StyleEvent>;
}
