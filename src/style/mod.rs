//! Per-shape-class style resolution with per-element overrides.
//!
//! The [`StyleResolver`] maintains, for one transformer:
//! - an identity map from shape class to its resolved [`Style`], filled
//!   lazily from the external [`StyleRegistry`],
//! - a bidirectional shape-class ↔ type-tag table, assigned monotonically
//!   and never renumbered,
//! - an override map from element id to style, consulted before the
//!   type-level style,
//! - aggregate predicates over the held styles that drive the event
//!   classifier's rebuild decisions.
//!
//! Override lookups happen on every geometry derivation and are far more
//! frequent than override mutations, so the override map sits behind its own
//! reader/writer lock, separate from the geometry cache lock.

mod resolver;
mod types;

pub use resolver::StyleResolver;
pub use types::{Style, StyleEvent, StyleParams, StyleRegistry};
