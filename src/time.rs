//! Time spans and temporal filtering support.
//!
//! Geometries may carry a [`TimeConstraint`]; region commands consult the
//! active spans from an external [`TimeManager`] to decide whether a
//! geometry participates in spatial classification.

use chrono::{DateTime, Utc};

/// A closed-open span of absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    /// Inclusive start of the span.
    pub start: DateTime<Utc>,
    /// Exclusive end of the span.
    pub end: DateTime<Utc>,
}

impl TimeSpan {
    /// Create a new span. `end` must not precede `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(end >= start, "span end precedes start");
        Self { start, end }
    }

    /// Whether two spans share any instant.
    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Temporal constraint attached to a geometry.
///
/// The primary span is always checked against the time manager's primary
/// active spans. A constraint may additionally carry a secondary key, in
/// which case the corresponding secondary active spans are checked too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeConstraint {
    /// The span the geometry is valid for.
    pub span: TimeSpan,
    /// Optional key selecting a secondary set of active spans.
    pub secondary_key: Option<String>,
}

impl TimeConstraint {
    /// Constraint checked against primary active spans only.
    pub fn primary(span: TimeSpan) -> Self {
        Self {
            span,
            secondary_key: None,
        }
    }

    /// Constraint additionally checked against a secondary span set.
    pub fn with_secondary(span: TimeSpan, key: impl Into<String>) -> Self {
        Self {
            span,
            secondary_key: Some(key.into()),
        }
    }
}

/// Source of the currently active time spans.
///
/// An empty span list means the corresponding dimension is unconstrained:
/// every geometry passes it.
pub trait TimeManager: Send + Sync + 'static {
    /// Currently active primary spans.
    fn primary_active_spans(&self) -> Vec<TimeSpan>;

    /// Currently active spans for the given secondary key.
    fn secondary_active_spans(&self, key: &str) -> Vec<TimeSpan>;
}

/// Time manager that never constrains anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconstrainedTimeManager;

impl TimeManager for UnconstrainedTimeManager {
    fn primary_active_spans(&self) -> Vec<TimeSpan> {
        Vec::new()
    }

    fn secondary_active_spans(&self, _key: &str) -> Vec<TimeSpan> {
        Vec::new()
    }
}
