//! External element-store collaborator.
//!
//! The element store owns the data elements themselves; the engine reaches
//! it only to push selection, opacity and color state, and to request
//! element removal for purge commands. The store is externally synchronized;
//! the engine never assumes exclusive access.

use std::collections::HashSet;

use crate::geometry::Color;
use crate::id::ElementId;

/// Mutation sink for element-level state owned outside this engine.
pub trait ElementStore: Send + Sync + 'static {
    /// Record the selected set within a touched set of elements.
    ///
    /// `touched` is a superset of `selected`; elements in `touched` but not
    /// in `selected` are recorded deselected.
    fn set_selection_state(
        &self,
        selected: &HashSet<ElementId>,
        touched: &HashSet<ElementId>,
        type_key: &str,
        source: &str,
    );

    /// Record a new opacity for the given elements.
    fn set_opacity(&self, alpha: u8, ids: &[ElementId], type_key: &str, source: &str);

    /// Record a new color for the given elements.
    fn set_color(&self, color: Color, ids: &[ElementId], type_key: &str, source: &str);

    /// Request deletion of the given elements from the store.
    fn remove_elements(&self, type_key: &str, ids: &HashSet<ElementId>);
}
