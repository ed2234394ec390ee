//! Blend modes and the custom blend factor state.

use quill_test_utils::{BackendCapabilities, BackendFeatures};
use wgpu::{BlendComponent, BlendFactor, BlendOperation, BlendState};

/// Predefined blend modes.
///
/// Switching modes flushes the active batch first, so a mode always applies
/// to whole draw calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Formula: `src.rgb * src.a + dst.rgb * (1 - src.a)`
    #[default]
    Alpha,

    /// Formula: `src.rgb * src.a + dst.rgb`
    Additive,

    /// Formula: `src.rgb * dst.rgb + dst.rgb * (1 - src.a)`
    Multiplied,

    /// Formula: `src.rgb + dst.rgb`
    AddColors,

    /// Formula: `src.rgb - dst.rgb`
    SubtractColors,

    /// Formula: `src.rgb + dst.rgb * (1 - src.a)`
    AlphaPremultiply,

    /// Factors from [`BlendSettings::set_factors`], same for color and alpha.
    Custom,

    /// Factors from [`BlendSettings::set_factors_separate`].
    CustomSeparate,
}

const fn component(
    src_factor: BlendFactor,
    dst_factor: BlendFactor,
    operation: BlendOperation,
) -> BlendComponent {
    BlendComponent {
        src_factor,
        dst_factor,
        operation,
    }
}

const fn uniform(c: BlendComponent) -> BlendState {
    BlendState { color: c, alpha: c }
}

impl BlendMode {
    #[inline]
    pub fn is_custom(self) -> bool {
        matches!(self, BlendMode::Custom | BlendMode::CustomSeparate)
    }

    /// Blend state for the predefined modes. Custom modes need the factors
    /// held by [`BlendSettings`].
    pub fn preset(self) -> Option<BlendState> {
        use BlendFactor::*;
        use BlendOperation::*;

        let state = match self {
            BlendMode::Alpha => uniform(component(SrcAlpha, OneMinusSrcAlpha, Add)),
            BlendMode::Additive => uniform(component(SrcAlpha, One, Add)),
            BlendMode::Multiplied => uniform(component(Dst, OneMinusSrcAlpha, Add)),
            BlendMode::AddColors => uniform(component(One, One, Add)),
            BlendMode::SubtractColors => uniform(component(One, One, Subtract)),
            BlendMode::AlphaPremultiply => uniform(component(One, OneMinusSrcAlpha, Add)),
            BlendMode::Custom | BlendMode::CustomSeparate => return None,
        };
        Some(state)
    }
}

/// Current blend mode plus the user-configurable custom factors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendSettings {
    mode: BlendMode,
    custom: BlendComponent,
    custom_color: BlendComponent,
    custom_alpha: BlendComponent,
    custom_modified: bool,
}

impl Default for BlendSettings {
    fn default() -> Self {
        use BlendFactor::*;
        Self {
            mode: BlendMode::Alpha,
            custom: component(SrcAlpha, OneMinusSrcAlpha, BlendOperation::Add),
            custom_color: component(SrcAlpha, OneMinusSrcAlpha, BlendOperation::Add),
            custom_alpha: component(One, OneMinusSrcAlpha, BlendOperation::Add),
            custom_modified: false,
        }
    }
}

impl BlendSettings {
    pub fn mode(&self) -> BlendMode {
        self.mode
    }

    /// Whether custom factors changed since a custom mode was last applied.
    pub fn custom_modified(&self) -> bool {
        self.custom_modified
    }

    pub fn set_factors(&mut self, factors: BlendComponent) {
        if self.custom != factors {
            self.custom = factors;
            self.custom_modified = true;
        }
    }

    pub fn set_factors_separate(&mut self, color: BlendComponent, alpha: BlendComponent) {
        if self.custom_color != color || self.custom_alpha != alpha {
            self.custom_color = color;
            self.custom_alpha = alpha;
            self.custom_modified = true;
        }
    }

    /// True when switching to `mode` changes the pipeline state.
    pub fn needs_switch(&self, mode: BlendMode) -> bool {
        self.mode != mode || (mode.is_custom() && self.custom_modified)
    }

    /// Make `mode` current and resolve it to a backend blend state.
    pub fn apply(&mut self, mode: BlendMode, capabilities: &BackendCapabilities) -> BlendState {
        self.mode = mode;
        if mode.is_custom() {
            self.custom_modified = false;
        }
        self.resolve(capabilities)
    }

    pub fn resolve(&self, capabilities: &BackendCapabilities) -> BlendState {
        match self.mode {
            BlendMode::Custom => uniform(self.custom),
            BlendMode::CustomSeparate => {
                if capabilities.supports(BackendFeatures::SEPARATE_BLEND) {
                    BlendState {
                        color: self.custom_color,
                        alpha: self.custom_alpha,
                    }
                } else {
                    tracing::warn!(
                        "Backend lacks separate blend equations; using color factors for alpha"
                    );
                    uniform(self.custom_color)
                }
            }
            preset => preset.preset().unwrap_or(BlendState::ALPHA_BLENDING),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let additive = BlendMode::Additive.preset().unwrap();
        assert_eq!(additive.color.dst_factor, BlendFactor::One);
        assert_eq!(additive.alpha, additive.color);

        let subtract = BlendMode::SubtractColors.preset().unwrap();
        assert_eq!(subtract.color.operation, BlendOperation::Subtract);

        assert!(BlendMode::Custom.preset().is_none());
    }

    #[test]
    fn test_custom_factors_mark_modified() {
        let mut blend = BlendSettings::default();
        assert!(!blend.needs_switch(BlendMode::Alpha));

        blend.apply(BlendMode::Custom, &BackendCapabilities::modern());
        assert!(!blend.needs_switch(BlendMode::Custom));

        blend.set_factors(component(
            BlendFactor::One,
            BlendFactor::Zero,
            BlendOperation::Add,
        ));
        assert!(blend.needs_switch(BlendMode::Custom));

        let state = blend.apply(BlendMode::Custom, &BackendCapabilities::modern());
        assert_eq!(state.color.dst_factor, BlendFactor::Zero);
        assert!(!blend.custom_modified());
    }

    #[test]
    fn test_setting_same_factors_is_not_a_change() {
        let mut blend = BlendSettings::default();
        blend.set_factors(blend.custom);
        assert!(!blend.custom_modified());
    }

    #[test]
    fn test_separate_falls_back_without_feature() {
        let mut blend = BlendSettings::default();
        blend.set_factors_separate(
            component(BlendFactor::One, BlendFactor::One, BlendOperation::Add),
            component(BlendFactor::Zero, BlendFactor::One, BlendOperation::Add),
        );

        let modern = blend.apply(BlendMode::CustomSeparate, &BackendCapabilities::modern());
        assert_eq!(modern.alpha.src_factor, BlendFactor::Zero);

        let embedded = blend.resolve(&BackendCapabilities::embedded());
        assert_eq!(embedded.alpha, embedded.color);
    }
}
