//! Geometry identifier packing.
//!
//! Every geometry managed by a transformer carries a flat 64-bit id. For
//! style-based transformers that id multiplexes a geometry type tag with the
//! owning data element's id; the codec here packs and unpacks the two halves
//! so any component can recover the element behind a geometry.
//!
//! The bit split is fixed: the low [`ELEMENT_ID_BITS`] bits hold the element
//! id, the remaining high bits hold the type tag. Exceeding either budget is
//! a programming error, checked with `debug_assert!` rather than handled at
//! runtime.

/// Identifier of an external data element.
pub type ElementId = u64;

/// Flat identifier of a derived geometry.
pub type GeometryId = u64;

/// Small integer tag identifying a geometry shape interface.
pub type TypeTag = u64;

/// Number of low bits reserved for the element id.
pub const ELEMENT_ID_BITS: u32 = 40;

/// Shift applied to the type tag when packing.
pub const TYPE_TAG_SHIFT: u32 = ELEMENT_ID_BITS;

/// Mask selecting the element-id half of a geometry id.
pub const ELEMENT_ID_MASK: u64 = (1 << ELEMENT_ID_BITS) - 1;

/// Packs and unpacks geometry ids.
///
/// Implementations must round-trip: for every `(tag, element_id)` pair within
/// the configured bit widths, `element_id_of(combine(tag, e)) == e` and
/// `type_tag_of(combine(tag, e)) == tag`.
pub trait GeometryIdCodec: Send + Sync + 'static {
    /// Packs a type tag and element id into a flat geometry id.
    fn combine(&self, type_tag: TypeTag, element_id: ElementId) -> GeometryId;

    /// Recovers the element id from a geometry id.
    fn element_id_of(&self, geometry_id: GeometryId) -> ElementId;

    /// Recovers the type tag from a geometry id.
    fn type_tag_of(&self, geometry_id: GeometryId) -> TypeTag;

    /// Mask that reduces a geometry id to its element-id half.
    ///
    /// The cache uses this to match stored geometries against element id
    /// sets without consulting the codec per geometry.
    fn element_mask(&self) -> u64;
}

/// Bit-packed codec for transformers that multiplex geometry types.
///
/// Packs as `(tag << 40) ^ element_id`, giving a 40-bit element-id space
/// and a 24-bit tag space.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedIdCodec;

impl GeometryIdCodec for PackedIdCodec {
    fn combine(&self, type_tag: TypeTag, element_id: ElementId) -> GeometryId {
        debug_assert!(
            element_id <= ELEMENT_ID_MASK,
            "element id {} exceeds {} bits",
            element_id,
            ELEMENT_ID_BITS
        );
        debug_assert!(
            type_tag < (1 << (64 - ELEMENT_ID_BITS)),
            "type tag {} exceeds {} bits",
            type_tag,
            64 - ELEMENT_ID_BITS
        );
        (type_tag << TYPE_TAG_SHIFT) ^ element_id
    }

    fn element_id_of(&self, geometry_id: GeometryId) -> ElementId {
        geometry_id & ELEMENT_ID_MASK
    }

    fn type_tag_of(&self, geometry_id: GeometryId) -> TypeTag {
        geometry_id >> TYPE_TAG_SHIFT
    }

    fn element_mask(&self) -> u64 {
        ELEMENT_ID_MASK
    }
}

/// Identity codec for transformers with a 1:1 geometry-to-element mapping.
///
/// The geometry id is the element id; the type tag is always zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityIdCodec;

impl GeometryIdCodec for IdentityIdCodec {
    fn combine(&self, _type_tag: TypeTag, element_id: ElementId) -> GeometryId {
        element_id
    }

    fn element_id_of(&self, geometry_id: GeometryId) -> ElementId {
        geometry_id
    }

    fn type_tag_of(&self, _geometry_id: GeometryId) -> TypeTag {
        0
    }

    fn element_mask(&self) -> u64 {
        u64::MAX
    }
}
