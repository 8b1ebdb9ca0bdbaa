//! Render-ready geometry model and the builder/publisher boundary.
//!
//! A [`Geometry`] is the artifact this engine maintains per data element:
//! a flat id, a shape class, a render-property bundle and optional spatial
//! bounds and temporal constraint. Geometries are created by an external
//! [`GeometryFactory`], owned exclusively by the cache once created, and
//! pushed to an external [`GeometryRegistry`] as add/remove diffs.

mod types;

pub use types::{Color, DataElement, Geometry, RenderProps, ShapeClass};

use crate::error::DeriveError;
use crate::id::ElementId;

/// Converts raw data-element payloads into renderable geometries.
///
/// Invoked by derive/rebuild tasks on the update worker. A failure for one
/// element never aborts the batch; the worker skips the element and logs.
pub trait GeometryFactory: Send + Sync + 'static {
    /// Fetch the current payloads for the given element ids.
    ///
    /// Used by rebuild tasks, which only know ids. Elements that no longer
    /// exist are simply absent from the result.
    fn elements_for_ids(&self, ids: &[ElementId]) -> Vec<DataElement>;

    /// Convert one data element into a renderable geometry.
    ///
    /// The returned geometry's id is provisional; the update worker assigns
    /// the final packed id from the transformer's codec.
    fn build_geometry(&self, element: &DataElement) -> Result<Geometry, DeriveError>;
}

/// Sink for every visible-set change.
///
/// Called with non-overlapping add/remove collections; either side may be
/// empty. Always invoked outside the geometry cache lock.
pub trait GeometryRegistry: Send + Sync + 'static {
    /// Publish a diff of geometries entering and leaving the visible set.
    fn publish(&self, adds: Vec<Geometry>, removes: Vec<Geometry>);
}
