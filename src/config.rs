use crate::example::ExampleKind;

/// Default ring size in number of examples.
pub const DEFAULT_RING_CAPACITY: usize = 100;

/// Configuration for [`ExampleParser`](crate::ExampleParser).
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParserConfig {
    /// Ring size in number of examples (default: 100).
    pub ring_capacity: usize,
    /// Whether the stream carries labels.
    pub kind: ExampleKind,
    /// Release a slot's vector storage when the consumer finalizes it.
    ///
    /// Keep this `false` to reuse the same storage for successive examples
    /// passing through a slot.
    pub free_after_release: bool,
    /// Release remaining slot storage eagerly when the ring is dropped.
    pub free_on_destruct: bool,
    /// Enable metrics collection (slight overhead).
    pub enable_metrics: bool,
}

impl ParserConfig {
    /// Creates a new configuration with custom settings.
    ///
    /// # Panics
    ///
    /// Panics if `ring_capacity` is 0. The ring needs at least one slot for
    /// the producer and consumer to make progress.
    pub const fn new(ring_capacity: usize, kind: ExampleKind) -> Self {
        assert!(ring_capacity >= 1, "ring_capacity must be at least 1");

        Self {
            ring_capacity,
            kind,
            free_after_release: true,
            free_on_destruct: true,
            enable_metrics: false,
        }
    }

    /// Configuration for a labelled stream with the default ring size.
    pub const fn labelled() -> Self {
        Self::new(DEFAULT_RING_CAPACITY, ExampleKind::Labelled)
    }

    /// Configuration for an unlabelled stream with the default ring size.
    pub const fn unlabelled() -> Self {
        Self::new(DEFAULT_RING_CAPACITY, ExampleKind::Unlabelled)
    }

    /// Sets the ring capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity >= 1, "ring_capacity must be at least 1");
        self.ring_capacity = capacity;
        self
    }

    /// Sets whether slot storage is released on finalize.
    pub fn with_free_after_release(mut self, free: bool) -> Self {
        self.free_after_release = free;
        self
    }

    /// Sets whether remaining slot storage is released when the ring drops.
    pub fn with_free_on_destruct(mut self, free: bool) -> Self {
        self.free_on_destruct = free;
        self
    }

    /// Enables or disables metrics collection.
    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::labelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ParserConfig::default();
        assert_eq!(config.ring_capacity, DEFAULT_RING_CAPACITY);
        assert_eq!(config.kind, ExampleKind::Labelled);
        assert!(config.free_after_release);
        assert!(config.free_on_destruct);
        assert!(!config.enable_metrics);
    }

    #[test]
    fn test_builder_chain() {
        let config = ParserConfig::unlabelled()
            .with_ring_capacity(4)
            .with_free_after_release(false)
            .with_metrics(true);
        assert_eq!(config.ring_capacity, 4);
        assert_eq!(config.kind, ExampleKind::Unlabelled);
        assert!(!config.free_after_release);
        assert!(config.enable_metrics);
    }

    #[test]
    #[should_panic(expected = "ring_capacity")]
    fn test_zero_capacity_rejected() {
        let _ = ParserConfig::new(0, ExampleKind::Labelled);
    }
}
