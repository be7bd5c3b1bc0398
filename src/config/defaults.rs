//! Default values and presets for odata-track.
//!
//! Provides named presets for common service flavours and default values.

use super::types::{AnnotationStyle, ClientConfig, PayloadConfig, PropertySendOption, SaveConfig};

/// Service root used when none is configured.
pub const DEFAULT_SERVICE_ROOT: &str = "http://localhost/odata";

// ============================================================================
// Configuration Presets
// ============================================================================

/// Named configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPreset {
    /// OData 4.01 short annotations, full properties
    Default,
    /// Only set properties, smallest payloads
    Compact,
    /// OData 4.0 services: prefixed annotations, IEEE754-compatible numbers
    Legacy,
}

impl ConfigPreset {
    /// Get the preset name as a string.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Compact => "compact",
            Self::Legacy => "legacy",
        }
    }

    /// Parse a preset from a string name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "default" | "v401" => Some(Self::Default),
            "compact" | "minimal" => Some(Self::Compact),
            "legacy" | "v4" | "v40" => Some(Self::Legacy),
            _ => None,
        }
    }

    /// Get a description of this preset.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Default => "Short annotations and full property payloads",
            Self::Compact => "Send only properties that were set since the last save",
            Self::Legacy => "Prefixed @odata annotations and string-encoded Int64/Decimal",
        }
    }

    /// Get all available presets.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Default, Self::Compact, Self::Legacy]
    }
}

impl std::fmt::Display for ConfigPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Preset Implementations
// ============================================================================

impl ClientConfig {
    /// Create a `ClientConfig` from a named preset.
    #[must_use]
    pub fn from_preset(preset: ConfigPreset) -> Self {
        match preset {
            ConfigPreset::Default => Self::default(),
            ConfigPreset::Compact => Self {
                payload: PayloadConfig {
                    send_option: PropertySendOption::OnlySetProperties,
                    ..PayloadConfig::default()
                },
                ..Self::default()
            },
            ConfigPreset::Legacy => Self {
                payload: PayloadConfig {
                    annotation_style: AnnotationStyle::Prefixed,
                    ieee754_compatible: true,
                    ..PayloadConfig::default()
                },
                save: SaveConfig {
                    continue_on_error: false,
                },
                ..Self::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_names_round_trip() {
        for preset in ConfigPreset::all() {
            assert_eq!(ConfigPreset::from_name(preset.name()), Some(*preset));
        }
        assert_eq!(ConfigPreset::from_name("V4"), Some(ConfigPreset::Legacy));
        assert_eq!(ConfigPreset::from_name("nope"), None);
    }

    #[test]
    fn test_legacy_preset() {
        let config = ClientConfig::from_preset(ConfigPreset::Legacy);
        assert_eq!(config.payload.annotation_style, AnnotationStyle::Prefixed);
        assert!(config.payload.ieee754_compatible);
        assert!(!config.save.continue_on_error);
    }
}
