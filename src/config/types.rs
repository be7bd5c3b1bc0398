//! Configuration types for odata-track sessions.
//!
//! Provides structured configuration for payload rendering and the save pipeline.

use super::defaults::DEFAULT_SERVICE_ROOT;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================================================
// Client Configuration
// ============================================================================

/// Top-level configuration of a [`DataServiceContext`](crate::DataServiceContext).
///
/// It can be constructed in code, loaded from a `.odata-track.yaml` file, or
/// both (with CLI flags overriding file settings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClientConfig {
    /// Service root URI, e.g. `https://host/odata`
    pub service_root: String,
    /// How request payloads are written
    pub payload: PayloadConfig,
    /// Save pipeline behavior
    pub save: SaveConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_root: DEFAULT_SERVICE_ROOT.to_string(),
            payload: PayloadConfig::default(),
            save: SaveConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given service root.
    #[must_use]
    pub fn new(service_root: impl Into<String>) -> Self {
        Self {
            service_root: service_root.into(),
            ..Self::default()
        }
    }

    /// Create a `ClientConfig` builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Service root without a trailing slash.
    #[must_use]
    pub fn service_root(&self) -> &str {
        self.service_root.trim_end_matches('/')
    }
}

// ============================================================================
// Builder for ClientConfig
// ============================================================================

/// Builder for constructing `ClientConfig` with fluent API.
#[derive(Debug, Default)]
#[must_use]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn service_root(mut self, root: impl Into<String>) -> Self {
        self.config.service_root = root.into();
        self
    }

    pub fn send_option(mut self, option: PropertySendOption) -> Self {
        self.config.payload.send_option = option;
        self
    }

    pub fn key_delimiter(mut self, delimiter: KeyDelimiter) -> Self {
        self.config.payload.key_delimiter = delimiter;
        self
    }

    pub fn annotation_style(mut self, style: AnnotationStyle) -> Self {
        self.config.payload.annotation_style = style;
        self
    }

    pub fn ieee754_compatible(mut self, enabled: bool) -> Self {
        self.config.payload.ieee754_compatible = enabled;
        self
    }

    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.payload.pretty = enabled;
        self
    }

    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.config.save.continue_on_error = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

// ============================================================================
// Payload Configuration
// ============================================================================

/// Which properties of an entity are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PropertySendOption {
    /// Every property of the instance
    #[default]
    FullProperties,
    /// Only properties written since the last snapshot (keys always included)
    OnlySetProperties,
}

/// How keys are rendered in entity URIs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum KeyDelimiter {
    /// `People(100)`
    #[default]
    Parentheses,
    /// `People/100` (single-part keys only)
    Slash,
}

/// Instance annotation naming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotationStyle {
    /// `@id`, `@context` (OData 4.01)
    #[default]
    Short,
    /// `@odata.id`, `@odata.context` (OData 4.0)
    Prefixed,
}

impl AnnotationStyle {
    /// Full annotation name for a control term such as `id` or `context`.
    #[must_use]
    pub fn annotation(self, term: &str) -> String {
        match self {
            Self::Short => format!("@{term}"),
            Self::Prefixed => format!("@odata.{term}"),
        }
    }

    /// Both accepted spellings of a control term.
    #[must_use]
    pub fn spellings(term: &str) -> [String; 2] {
        [format!("@{term}"), format!("@odata.{term}")]
    }
}

/// Request payload options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PayloadConfig {
    /// Property selection policy
    pub send_option: PropertySendOption,
    /// Key rendering in entity URIs
    pub key_delimiter: KeyDelimiter,
    /// Annotation naming
    pub annotation_style: AnnotationStyle,
    /// Write Int64 and Decimal values as JSON strings
    pub ieee754_compatible: bool,
    /// Indent the JSON body
    pub pretty: bool,
}

// ============================================================================
// Save Configuration
// ============================================================================

/// Save pipeline options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SaveConfig {
    /// Ask the service to keep processing after a failed operation
    pub continue_on_error: bool,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            continue_on_error: true,
        }
    }
}
