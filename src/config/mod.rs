//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path given as the `CONFIG_FILE` CLI argument (must exist)
//! 2. Default location (optional; built-in defaults apply when absent):
//!    - **Linux/macOS:** `~/.base-editor-design-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.base-editor-design-mcp\config.json`
//!
//! See `config/example-config.json` for a complete example.

mod settings;

pub use settings::{Config, DetectionMode, LoggingConfig, OutputConfig, StagingConfig};

use std::path::{Path, PathBuf};

use crate::design::workspace::Workspace;
use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.base-editor-design-mcp/`
/// - **Windows:** `%USERPROFILE%\.base-editor-design-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".base-editor-design-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, uses the platform-specific default location, falling
/// back to [`Config::default`] when no file exists there.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Required fields are missing or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(Config::default()),
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    // Validate the configuration
    config.validate()?;

    Ok(config)
}

/// Builds the workspace the tools run in.
///
/// The root is taken from `override_root`, then the configuration, then the
/// current directory, and is canonicalised so that it stays valid as the
/// tools' working directory.
///
/// # Errors
///
/// Returns [`ConfigError::WorkingRoot`] if the root does not exist or cannot
/// be resolved.
pub fn resolve_workspace(
    config: &Config,
    override_root: Option<&Path>,
) -> Result<Workspace, ConfigError> {
    let root = match override_root.or(config.working_root.as_deref()) {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir().map_err(|e| ConfigError::WorkingRoot {
            path: PathBuf::from("."),
            source: e,
        })?,
    };

    let root = root
        .canonicalize()
        .map_err(|e| ConfigError::WorkingRoot {
            path: root.clone(),
            source: e,
        })?;

    if !root.is_dir() {
        return Err(ConfigError::WorkingRoot {
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            path: root,
        });
    }

    Ok(Workspace::with_staging_dir(root, &config.staging.dir_name))
}
