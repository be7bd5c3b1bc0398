//! Configuration file loading and discovery.
//!
//! Supports loading configuration from YAML files with automatic discovery.

use super::types::ClientConfig;
use std::path::{Path, PathBuf};

// ============================================================================
// Configuration File Discovery
// ============================================================================

/// Standard config file names to search for.
const CONFIG_FILE_NAMES: &[&str] = &[
    ".odata-track.yaml",
    ".odata-track.yml",
    "odata-track.yaml",
    "odata-track.yml",
];

/// Discover a config file by searching standard locations.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. Current directory
/// 3. User config directory (~/.config/odata-track/)
/// 4. Home directory
#[must_use]
pub fn discover_config_file(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    if let Some(path) = std::env::current_dir()
        .ok()
        .and_then(|cwd| find_config_in_dir(&cwd))
    {
        return Some(path);
    }

    if let Some(path) = dirs::config_dir().and_then(|dir| find_config_in_dir(&dir.join("odata-track"))) {
        return Some(path);
    }

    dirs::home_dir().and_then(|home| find_config_in_dir(&home))
}

/// Find a config file in a specific directory.
fn find_config_in_dir(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

// ============================================================================
// Configuration File Loading
// ============================================================================

/// Error type for config file operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
}

/// Load a `ClientConfig` from a YAML file.
pub fn load_config_file(path: &Path) -> Result<ClientConfig, ConfigFileError> {
    if !path.exists() {
        return Err(ConfigFileError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let config: ClientConfig = serde_yaml_ng::from_str(&content)?;
    Ok(config)
}

/// Load config from discovered file, or return default.
#[must_use]
pub fn load_or_default(explicit_path: Option<&Path>) -> (ClientConfig, Option<PathBuf>) {
    discover_config_file(explicit_path).map_or_else(
        || (ClientConfig::default(), None),
        |path| match load_config_file(&path) {
            Ok(config) => (config, Some(path)),
            Err(e) => {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                (ClientConfig::default(), None)
            }
        },
    )
}

// ============================================================================
// Example Config Generation
// ============================================================================

/// Generate an example config file content.
#[must_use]
pub fn generate_example_config() -> String {
    let example = ClientConfig::default();
    format!(
        r"# odata-track configuration
# Place this file at .odata-track.yaml in your project root or ~/.config/odata-track/

{}
",
        serde_yaml_ng::to_string(&example).unwrap_or_default()
    )
}

/// Generate a commented example config with all options.
#[must_use]
pub fn generate_full_example_config() -> String {
    r"# odata-track configuration file
# ==============================
#
# Place it at:
#   - .odata-track.yaml in your project root
#   - ~/.config/odata-track/odata-track.yaml for global config
#
# CLI arguments always override file settings.

# Service root; entity URIs and @context values are built from it
service_root: http://localhost/odata

payload:
  # full-properties | only-set-properties
  send_option: full-properties
  # parentheses: People(1)   slash: People/1
  key_delimiter: parentheses
  # short: @id (OData 4.01)   prefixed: @odata.id (OData 4.0)
  annotation_style: short
  # Write Int64 and Decimal values as JSON strings
  ieee754_compatible: false
  # Indent request bodies
  pretty: false

save:
  # Send Prefer: odata.continue-on-error
  continue_on_error: true
"
    .to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnnotationStyle, PropertySendOption};
    use tempfile::TempDir;

    #[test]
    fn test_find_config_in_dir() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join(".odata-track.yaml");
        std::fs::write(&config_path, "service_root: http://example.com/svc\n").unwrap();

        assert_eq!(find_config_in_dir(tmp.path()), Some(config_path));
    }

    #[test]
    fn test_find_config_in_dir_not_found() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(find_config_in_dir(tmp.path()), None);
    }

    #[test]
    fn test_load_config_file() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.yaml");
        let yaml = r"
service_root: https://example.com/odata
payload:
  send_option: only-set-properties
  annotation_style: prefixed
";
        std::fs::write(&config_path, yaml).unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.service_root, "https://example.com/odata");
        assert_eq!(config.payload.send_option, PropertySendOption::OnlySetProperties);
        assert_eq!(config.payload.annotation_style, AnnotationStyle::Prefixed);
        assert!(config.save.continue_on_error, "unset sections keep defaults");
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config_file(Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(ConfigFileError::NotFound(_))));
    }

    #[test]
    fn test_full_example_parses() {
        let config: ClientConfig =
            serde_yaml_ng::from_str(&generate_full_example_config()).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_discover_explicit_path() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("custom-config.yaml");
        std::fs::write(&config_path, "save:\n  continue_on_error: false\n").unwrap();

        assert_eq!(discover_config_file(Some(&config_path)), Some(config_path));
    }
}
