//! Error types for the transformation engine.
//!
//! Mutation entry points are fire-and-forget: failures inside the update
//! worker are absorbed and logged rather than returned to the event source.
//! The errors here cover the synchronous lookup surface and geometry
//! derivation.

use thiserror::Error;

/// Errors surfaced by the transformer's synchronous API.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A caller-supplied argument was rejected before any work was enqueued.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The update queue has been closed by shutdown.
    #[error("update queue is closed")]
    QueueClosed,
}

/// Errors produced while deriving a geometry from a data element.
///
/// A derivation failure never aborts a batch: the affected element is
/// skipped and logged, and processing continues with the remaining elements.
#[derive(Debug, Error)]
pub enum DeriveError {
    /// The element produced no renderable geometry.
    #[error("no geometry produced for element {element_id}")]
    NoGeometry { element_id: u64 },

    /// The element's source payload could not be read.
    #[error("source data unavailable for element {element_id}: {reason}")]
    SourceUnavailable { element_id: u64, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_display() {
        let err = TransformError::InvalidArgument("empty id list".to_string());
        assert_eq!(format!("{}", err), "invalid argument: empty id list");
    }

    #[test]
    fn test_derive_error_display() {
        let err = DeriveError::NoGeometry { element_id: 42 };
        assert_eq!(format!("{}", err), "no geometry produced for element 42");
    }
}
