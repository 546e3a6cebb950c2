//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::design::staging::StagingPolicy;
use crate::design::tools::{OutputDetection, ToolSettings, DEFAULT_OUTPUT_MARKER};
use crate::design::workspace::DEFAULT_STAGING_DIR;
use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Directory the tools run in and write their outputs to.
    /// Default: the server's current directory.
    #[serde(default)]
    pub working_root: Option<PathBuf>,

    /// Interpreter used to launch the tool scripts.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Script performing a single-configuration design.
    #[serde(default = "default_single_design_script")]
    pub single_design_script: String,

    /// Script performing a batch design.
    #[serde(default = "default_multi_design_script")]
    pub multi_design_script: String,

    /// Staged input settings.
    #[serde(default)]
    pub staging: StagingConfig,

    /// Output detection settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            _schema: None,
            _comment: None,
            working_root: None,
            interpreter: default_interpreter(),
            single_design_script: default_single_design_script(),
            multi_design_script: default_multi_design_script(),
            staging: StagingConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("interpreter", &self.interpreter),
            ("single_design_script", &self.single_design_script),
            ("multi_design_script", &self.multi_design_script),
            ("output.marker", &self.output.marker),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: format!("'{field}' must not be empty"),
                });
            }
        }

        // The staging directory must sit directly under the working root
        let mut components = Path::new(&self.staging.dir_name).components();
        let single_plain = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_plain {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid staging directory name '{}'. Must be a single directory name",
                    self.staging.dir_name
                ),
            });
        }

        Ok(())
    }

    /// Builds the tool launch settings described by this configuration.
    #[must_use]
    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            interpreter: self.interpreter.clone(),
            single_design_script: self.single_design_script.clone(),
            multi_design_script: self.multi_design_script.clone(),
            detection: match self.output.detection {
                DetectionMode::Reported => OutputDetection::Reported {
                    marker: self.output.marker.clone(),
                },
                DetectionMode::DirectoryDiff => OutputDetection::DirectoryDiff,
            },
            staging: if self.staging.retain_inputs {
                StagingPolicy::Retain
            } else {
                StagingPolicy::Cleanup
            },
        }
    }
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_single_design_script() -> String {
    "base_editing_guide_designs.py".to_string()
}

fn default_multi_design_script() -> String {
    "multiple_designs.py".to_string()
}

/// Staged input configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagingConfig {
    /// Name of the staging directory under the working root.
    /// Default: ".mcp_inputs"
    #[serde(default = "default_staging_dir")]
    pub dir_name: String,

    /// Keep staged input files after each invocation.
    /// Default: true
    #[serde(default = "default_true")]
    pub retain_inputs: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir_name: default_staging_dir(),
            retain_inputs: default_true(),
        }
    }
}

fn default_staging_dir() -> String {
    DEFAULT_STAGING_DIR.to_string()
}

const fn default_true() -> bool {
    true
}

/// How output directories are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Prefer a path reported on the tool's stdout.
    #[default]
    Reported,
    /// Only compare directory listings and modification times.
    DirectoryDiff,
}

/// Output detection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Detection strategy: "reported" or "`directory_diff`".
    #[serde(default)]
    pub detection: DetectionMode,

    /// Stdout line prefix that precedes a reported output path.
    #[serde(default = "default_marker")]
    pub marker: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            detection: DetectionMode::default(),
            marker: default_marker(),
        }
    }
}

fn default_marker() -> String {
    DEFAULT_OUTPUT_MARKER.to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.interpreter, "python3");
        assert!(config.working_root.is_none());
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "working_root": "/srv/be-design",
            "interpreter": "/opt/conda/bin/python",
            "single_design_script": "design.py",
            "multi_design_script": "batch.py",
            "staging": {
                "dir_name": ".inputs",
                "retain_inputs": false
            },
            "output": {
                "detection": "directory_diff",
                "marker": "RESULTS:"
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.working_root, Some(PathBuf::from("/srv/be-design")));
        assert_eq!(config.staging.dir_name, ".inputs");
        assert_eq!(config.output.detection, DetectionMode::DirectoryDiff);
        assert_eq!(config.logging.level, "debug");

        let settings = config.tool_settings();
        assert_eq!(settings.interpreter, "/opt/conda/bin/python");
        assert_eq!(settings.single_design_script, "design.py");
        assert_eq!(settings.multi_design_script, "batch.py");
        assert_eq!(settings.detection, OutputDetection::DirectoryDiff);
        assert_eq!(settings.staging, StagingPolicy::Cleanup);
    }

    #[test]
    fn default_settings_match_tool_defaults() {
        assert_eq!(Config::default().tool_settings(), ToolSettings::default());
    }

    #[test]
    fn reported_detection_carries_marker() {
        let json = r#"{"output": {"marker": "DIR "}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.tool_settings().detection,
            OutputDetection::Reported {
                marker: "DIR ".to_string()
            }
        );
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_empty_interpreter() {
        let json = r#"{"interpreter": "  "}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_nested_staging_dir() {
        for name in ["a/b", "..", "", "/abs"] {
            let mut config = Config::default();
            config.staging.dir_name = name.to_string();
            assert!(config.validate().is_err(), "accepted '{name}'");
        }
    }

    #[test]
    fn reject_unknown_detection_mode() {
        let json = r#"{"output": {"detection": "guess"}}"#;
        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
