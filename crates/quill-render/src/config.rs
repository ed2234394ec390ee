//! Batch configuration.

use crate::error::BatchError;

/// Quads per geometry buffer on desktop-class backends.
pub const DEFAULT_BUFFER_ELEMENTS: usize = 8192;
/// Quads per geometry buffer on 16-bit-index backends.
pub const EMBEDDED_BUFFER_ELEMENTS: usize = 2048;
pub const DEFAULT_BUFFER_COUNT: usize = 1;
pub const DEFAULT_MAX_DRAW_CALLS: usize = 256;
/// Auxiliary texture units bound during a flush (units 1..=N).
pub const DEFAULT_MAX_TEXTURE_UNITS: usize = 4;
pub const DEFAULT_DEPTH_INCREMENT: f32 = 1.0 / 20000.0;
pub const DEFAULT_INITIAL_DEPTH: f32 = -1.0;

/// Sizing of one batch.
///
/// # Example
///
/// ```
/// use quill_render::BatchConfig;
///
/// let config = BatchConfig::default()
///     .with_buffer_count(3)
///     .with_buffer_elements(1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Geometry buffer generations rotated round-robin across flushes.
    pub buffer_count: usize,
    /// Capacity of each generation, in quads (4 vertices each).
    pub buffer_elements: usize,
    pub max_draw_calls: usize,
    pub max_texture_units: usize,
    pub depth_increment: f32,
    /// Depth the 2D vertex overloads start from after every flush.
    pub initial_depth: f32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_elements: DEFAULT_BUFFER_ELEMENTS,
            max_draw_calls: DEFAULT_MAX_DRAW_CALLS,
            max_texture_units: DEFAULT_MAX_TEXTURE_UNITS,
            depth_increment: DEFAULT_DEPTH_INCREMENT,
            initial_depth: DEFAULT_INITIAL_DEPTH,
        }
    }
}

impl BatchConfig {
    /// Defaults sized for GLES2-class backends.
    pub fn embedded() -> Self {
        Self {
            buffer_elements: EMBEDDED_BUFFER_ELEMENTS,
            ..Self::default()
        }
    }

    pub fn with_buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self
    }

    pub fn with_buffer_elements(mut self, quads: usize) -> Self {
        self.buffer_elements = quads;
        self
    }

    pub fn with_max_draw_calls(mut self, max: usize) -> Self {
        self.max_draw_calls = max;
        self
    }

    pub fn with_max_texture_units(mut self, units: usize) -> Self {
        self.max_texture_units = units;
        self
    }

    pub fn with_depth(mut self, initial: f32, increment: f32) -> Self {
        self.initial_depth = initial;
        self.depth_increment = increment;
        self
    }

    /// Vertices one generation can hold.
    #[inline]
    pub fn vertex_capacity(&self) -> usize {
        self.buffer_elements * 4
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        if self.max_draw_calls == 0 {
            return Err(BatchError::ZeroDrawCallLimit);
        }
        if self.buffer_count == 0 {
            return Err(BatchError::InvalidConfig("buffer_count must be at least 1"));
        }
        if self.buffer_elements == 0 {
            return Err(BatchError::InvalidConfig(
                "buffer_elements must be at least 1",
            ));
        }
        if !self.depth_increment.is_finite() || !self.initial_depth.is_finite() {
            return Err(BatchError::InvalidConfig("depth values must be finite"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.vertex_capacity(), 8192 * 4);
        assert_eq!(config.max_draw_calls, 256);
        assert!(config.validate().is_ok());
        assert_eq!(BatchConfig::embedded().buffer_elements, 2048);
    }

    #[test]
    fn test_zero_draw_calls_is_invariant_violation() {
        let err = BatchConfig::default()
            .with_max_draw_calls(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_zero_buffers_is_configuration_error() {
        let err = BatchConfig::default()
            .with_buffer_count(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = BatchConfig::default()
            .with_buffer_elements(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
