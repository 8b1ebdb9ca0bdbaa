//! Transformer configuration.

use crate::geometry::Color;

/// Configuration for one [`LayerTransformer`](crate::transformer::LayerTransformer).
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    /// Key of the data type this transformer serves.
    pub type_key: String,
    /// Identity reported as the source of store mutations, and used to
    /// suppress color-change feedback loops.
    pub source: String,
    /// Whether partition moves publish add/remove diffs to the registry.
    pub publish_updates: bool,
    /// Whether the data type's loads-to configuration permits purge.
    ///
    /// The precise semantics of the flag live with the external data type
    /// metadata; the engine treats it as an opaque predicate result.
    pub purge_allowed: bool,
    /// Color applied to selected elements when deriving selection colors.
    pub selection_color: Color,
}

impl TransformerConfig {
    /// Create a configuration for the given data type key.
    pub fn new(type_key: impl Into<String>) -> Self {
        let type_key = type_key.into();
        Self {
            source: format!("transformer-{type_key}"),
            type_key,
            publish_updates: true,
            purge_allowed: false,
            selection_color: Color::rgb(0, 255, 255),
        }
    }

    /// Set the mutation source identity.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Enable or disable diff publication for partition moves.
    pub fn with_publish_updates(mut self, publish: bool) -> Self {
        self.publish_updates = publish;
        self
    }

    /// Permit purge commands for this data type.
    pub fn with_purge_allowed(mut self, allowed: bool) -> Self {
        self.purge_allowed = allowed;
        self
    }

    /// Set the selection render color.
    pub fn with_selection_color(mut self, color: Color) -> Self {
        self.selection_color = color;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TransformerConfig::new("tracks");
        assert_eq!(config.type_key, "tracks");
        assert_eq!(config.source, "transformer-tracks");
        assert!(config.publish_updates);
        assert!(!config.purge_allowed);
    }

    #[test]
    fn test_config_builders() {
        let config = TransformerConfig::new("tracks")
            .with_source("import-layer")
            .with_publish_updates(false)
            .with_purge_allowed(true)
            .with_selection_color(Color::rgb(255, 0, 255));

        assert_eq!(config.source, "import-layer");
        assert!(!config.publish_updates);
        assert!(config.purge_allowed);
        assert_eq!(config.selection_color, Color::rgb(255, 0, 255));
    }
}
