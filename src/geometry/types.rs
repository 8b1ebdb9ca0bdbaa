//! Core geometry value types.

use crate::id::{ElementId, GeometryId};
use crate::time::TimeConstraint;

/// RGBA color, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Opaque white, the default render color.
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);

    /// Create a color from RGBA components.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color from RGB components.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    /// The same color with a different alpha channel.
    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// Shape interface a geometry renders as.
///
/// The style system keys on this: each shape class is lazily assigned a
/// stable type tag and a resolved style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeClass {
    Point,
    Polyline,
    Polygon,
    Ellipse,
    Track,
}

/// Render-property bundle carried by every geometry.
///
/// Property-only updates (visibility, opacity, selection) patch these fields
/// in place without re-deriving the geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderProps {
    /// Render color, including the opacity channel.
    pub color: Color,
    /// Whether the geometry is drawn at all.
    pub visible: bool,
    /// Whether the geometry renders in the selected state.
    pub selected: bool,
}

impl Default for RenderProps {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            visible: true,
            selected: false,
        }
    }
}

/// A render-ready artifact derived from one data element.
#[derive(Debug, Clone)]
pub struct Geometry {
    /// Flat geometry id; see [`crate::id`] for the packing scheme.
    pub id: GeometryId,
    /// Shape interface this geometry renders as.
    pub shape: ShapeClass,
    /// Mutable render properties.
    pub props: RenderProps,
    /// Spatial bounds used by region commands. A geometry without bounds
    /// automatically fails every intersection test.
    pub bounds: Option<geo::Geometry<f64>>,
    /// Optional temporal constraint consulted by region commands.
    pub time: Option<TimeConstraint>,
}

impl Geometry {
    /// Create a geometry with default render properties and no bounds.
    pub fn new(id: GeometryId, shape: ShapeClass) -> Self {
        Self {
            id,
            shape,
            props: RenderProps::default(),
            bounds: None,
            time: None,
        }
    }

    /// Attach spatial bounds.
    pub fn with_bounds(mut self, bounds: geo::Geometry<f64>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Attach a temporal constraint.
    pub fn with_time(mut self, time: TimeConstraint) -> Self {
        self.time = Some(time);
        self
    }
}

/// Transient data-element payload.
///
/// The engine only holds element ids; payloads exist transiently while a
/// derive/rebuild task converts them into geometries.
#[derive(Debug, Clone)]
pub struct DataElement {
    /// External element id.
    pub id: ElementId,
    /// Shape interface the element's geometry should render as.
    pub shape: ShapeClass,
    /// The element's current render color, when one has been assigned.
    ///
    /// Factories report the color the element store currently holds, so a
    /// rebuild of a subset of elements reproduces earlier color events
    /// instead of reverting the subset to the style color.
    pub color: Option<Color>,
    /// Spatial bounds to carry onto the derived geometry.
    pub bounds: Option<geo::Geometry<f64>>,
    /// Temporal constraint to carry onto the derived geometry.
    pub time: Option<TimeConstraint>,
}

impl DataElement {
    /// Create an element with no color, bounds or time constraint.
    pub fn new(id: ElementId, shape: ShapeClass) -> Self {
        Self {
            id,
            shape,
            color: None,
            bounds: None,
            time: None,
        }
    }

    /// Attach the element's current render color.
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_with_alpha() {
        let c = Color::rgb(10, 20, 30);
        assert_eq!(c.a, 255);
        let faded = c.with_alpha(128);
        assert_eq!(faded, Color::rgba(10, 20, 30, 128));
    }

    #[test]
    fn test_default_render_props() {
        let props = RenderProps::default();
        assert!(props.visible);
        assert!(!props.selected);
        assert_eq!(props.color, Color::WHITE);
    }

    #[test]
    fn test_geometry_builders() {
        use geo::{polygon, Geometry as GeoGeometry};

        let bounds: GeoGeometry<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ]
        .into();

        let geom = Geometry::new(7, ShapeClass::Polygon).with_bounds(bounds);
        assert_eq!(geom.id, 7);
        assert!(geom.bounds.is_some());
        assert!(geom.time.is_none());
    }
}
