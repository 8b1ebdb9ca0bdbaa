//! GeoLayer - incremental geometry derivation for map data layers
//!
//! This library keeps a render-ready geometry set in sync with an evolving
//! set of domain data elements. For each active data layer a
//! [`transformer::LayerTransformer`] owns a cache of derived geometries and a
//! single-worker update queue; domain events (visibility toggles, color and
//! opacity changes, selection, spatial region commands) arrive asynchronously
//! and are classified into the cheapest sufficient update before mutating the
//! cache and publishing diffs to the rendering registry.
//!
//! # High-Level API
//!
//! ```ignore
//! use geolayer::transformer::{LayerTransformer, TransformerConfig};
//! use geolayer::id::PackedIdCodec;
//!
//! let transformer = LayerTransformer::new(
//!     TransformerConfig::new("tracks"),
//!     Arc::new(PackedIdCodec),
//!     factory,
//!     registry,
//!     store,
//!     time_manager,
//!     Some(style_registry),
//! );
//!
//! transformer.add_elements(elements);
//! transformer.handle_data_type_event(DataTypeEvent::VisibilityChanged(false));
//! transformer.shutdown().await;
//! ```

pub mod cache;
pub mod error;
pub mod event;
pub mod geometry;
pub mod id;
pub mod logging;
pub mod queue;
pub mod region;
pub mod store;
pub mod style;
pub mod time;
pub mod transformer;

/// Version of the GeoLayer library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
