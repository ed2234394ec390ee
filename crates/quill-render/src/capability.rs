//! Backend requirement checks.
//!
//! Capabilities are queried once per context and every batch checks its
//! [`BatchRequirements`] against that snapshot before allocating anything.

use quill_test_utils::{BackendCapabilities, BackendFeatures};

use crate::{config::BatchConfig, error::BatchError};

/// Largest vertex count addressable with 16-bit indices.
pub const MAX_U16_INDEXED_VERTICES: usize = u16::MAX as usize + 1;

/// Backend features and limits a batch needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequirements {
    /// Features that must be present (construction fails if missing).
    pub required_features: BackendFeatures,
    /// Features used when present (warns if missing).
    pub requested_features: BackendFeatures,
    /// Texture units including unit 0.
    pub min_texture_units: u32,
}

impl BatchRequirements {
    /// Create requirements with no features or elevated limits.
    pub fn none() -> Self {
        Self {
            required_features: BackendFeatures::empty(),
            requested_features: BackendFeatures::empty(),
            min_texture_units: 1,
        }
    }

    /// Requirements of a batch built from `config`.
    pub fn for_config(config: &BatchConfig) -> Self {
        let mut requirements = Self::none()
            .request_features(BackendFeatures::VERTEX_ARRAY_OBJECT)
            .with_min_texture_units(config.max_texture_units as u32 + 1);
        if config.vertex_capacity() > MAX_U16_INDEXED_VERTICES {
            requirements = requirements.require_features(BackendFeatures::INDEX_U32);
        }
        requirements
    }

    pub fn require_features(mut self, features: BackendFeatures) -> Self {
        self.required_features |= features;
        self
    }

    pub fn request_features(mut self, features: BackendFeatures) -> Self {
        self.requested_features |= features;
        self
    }

    pub fn with_min_texture_units(mut self, units: u32) -> Self {
        self.min_texture_units = self.min_texture_units.max(units);
        self
    }

    pub fn check(&self, capabilities: &BackendCapabilities) -> Result<(), BatchError> {
        let missing = self.required_features - capabilities.features;
        if !missing.is_empty() {
            return Err(BatchError::UnsupportedConfiguration(format!(
                "missing required backend features {:?}",
                missing
            ))
            .logged());
        }

        let missing_requested = self.requested_features - capabilities.features;
        if !missing_requested.is_empty() {
            tracing::warn!(
                "Backend lacks requested features {:?}; using fallbacks",
                missing_requested
            );
        }

        if capabilities.max_texture_units < self.min_texture_units {
            return Err(BatchError::UnsupportedConfiguration(format!(
                "needs {} texture units, backend has {}",
                self.min_texture_units, capabilities.max_texture_units
            ))
            .logged());
        }
        Ok(())
    }
}

impl Default for BatchRequirements {
    fn default() -> Self {
        Self::none()
    }
}
