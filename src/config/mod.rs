//! Configuration module for odata-track.
//!
//! This module provides a unified configuration system with:
//! - Type-safe configuration structures
//! - Validation for all configuration values
//! - Named presets for common service flavours
//! - YAML config file loading and discovery
//!
//! # Quick Start
//!
//! ```rust
//! use odata_track::config::{ClientConfig, ConfigPreset, PropertySendOption};
//!
//! let config = ClientConfig::builder()
//!     .service_root("https://example.com/odata")
//!     .send_option(PropertySendOption::OnlySetProperties)
//!     .build();
//! assert_eq!(config.service_root(), "https://example.com/odata");
//!
//! let legacy = ClientConfig::from_preset(ConfigPreset::Legacy);
//! assert!(legacy.payload.ieee754_compatible);
//! ```
//!
//! # Configuration File
//!
//! Place a `.odata-track.yaml` file in your project root or `~/.config/odata-track/`:
//!
//! ```yaml
//! service_root: https://example.com/odata
//! payload:
//!   send_option: only-set-properties
//! ```

mod defaults;
pub mod file;
mod types;
mod validation;

pub use defaults::{ConfigPreset, DEFAULT_SERVICE_ROOT};
pub use types::{
    AnnotationStyle, ClientConfig, ClientConfigBuilder, KeyDelimiter, PayloadConfig,
    PropertySendOption, SaveConfig,
};
pub use validation::{ConfigError, Validatable};

pub use file::{
    discover_config_file, generate_example_config, generate_full_example_config, load_config_file,
    load_or_default, ConfigFileError,
};

/// Generate a JSON Schema for the `ClientConfig` configuration format.
///
/// This schema documents all configuration options that can be set in
/// `.odata-track.yaml` config files. It can be used by editors for
/// validation and autocompletion.
pub fn generate_json_schema() -> serde_json::Result<String> {
    let schema = schemars::schema_for!(ClientConfig);
    serde_json::to_string_pretty(&schema)
}
