//! Configuration validation for odata-track.
//!
//! Provides validation traits and implementations for all configuration types.

use super::types::{ClientConfig, PayloadConfig};

// ============================================================================
// Configuration Error
// ============================================================================

/// Error type for configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// The field that failed validation
    pub field: String,
    /// Description of the validation error
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Validation Trait
// ============================================================================

/// Trait for validatable configuration types.
pub trait Validatable {
    /// Validate the configuration, returning any errors found.
    fn validate(&self) -> Vec<ConfigError>;

    /// Check if the configuration is valid.
    fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

// ============================================================================
// Validation Implementations
// ============================================================================

impl Validatable for ClientConfig {
    fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let root = self.service_root.trim();

        if root.is_empty() {
            errors.push(ConfigError::new("service_root", "must not be empty"));
        } else {
            let scheme_ok = root
                .split_once("://")
                .is_some_and(|(scheme, rest)| matches!(scheme, "http" | "https") && !rest.is_empty());
            if !scheme_ok {
                errors.push(ConfigError::new(
                    "service_root",
                    format!("'{root}' must be an absolute http(s) URI"),
                ));
            }
            if root.contains(['?', '#']) {
                errors.push(ConfigError::new(
                    "service_root",
                    "must not contain a query string or fragment",
                ));
            }
            if root.chars().any(char::is_whitespace) {
                errors.push(ConfigError::new("service_root", "must not contain whitespace"));
            }
        }

        errors.extend(self.payload.validate());
        errors
    }
}

impl Validatable for PayloadConfig {
    fn validate(&self) -> Vec<ConfigError> {
        // Every combination of payload options is meaningful today
        Vec::new()
    }
}
