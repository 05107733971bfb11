//! Configuration module.
//!
//! Handles loading, validating, and merging `magick.toml`. Stock defaults are
//! overridden by whatever the user file specifies; everything is optional.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [programs]
//! convert = "convert"       # Program used for resize and convert
//! mogrify = "mogrify"       # Program used for in-place edits
//! identify = "identify"     # Program used for size and limit probes
//!
//! [invocation]
//! # timeout_secs = 30       # Kill engine processes after this long (omit = wait forever)
//!
//! [resize]
//! default_quality = 100     # Quality for percentage resizes (1-100)
//!
//! [limits]
//! # memory = "256mb"        # Initial -limit overrides: area, map, disk, memory, file
//!
//! [processing]
//! # max_processes = 4       # Max parallel workers for batch (omit = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::magick::{Resource, parse_size};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `magick.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MagickConfig {
    /// Engine program names.
    pub programs: ProgramsConfig,
    /// Per-invocation settings.
    pub invocation: InvocationConfig,
    /// Resize defaults.
    pub resize: ResizeConfig,
    /// Initial resource-limit overrides.
    pub limits: LimitsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl MagickConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resize.default_quality == 0 || self.resize.default_quality > 100 {
            return Err(ConfigError::Validation(
                "resize.default_quality must be 1-100".into(),
            ));
        }
        for (key, program) in [
            ("convert", &self.programs.convert),
            ("mogrify", &self.programs.mogrify),
            ("identify", &self.programs.identify),
        ] {
            if program.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "programs.{key} must not be empty"
                )));
            }
        }
        for (resource, value) in self.limits.overrides() {
            if !value.eq_ignore_ascii_case("unlimited") && parse_size(&value).is_none() {
                return Err(ConfigError::Validation(format!(
                    "limits.{resource} has invalid size `{value}`"
                )));
            }
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Engine program names, resolved through `PATH` unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgramsConfig {
    pub convert: String,
    pub mogrify: String,
    pub identify: String,
}

impl Default for ProgramsConfig {
    fn default() -> Self {
        Self {
            convert: "convert".to_string(),
            mogrify: "mogrify".to_string(),
            identify: "identify".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InvocationConfig {
    /// Seconds before a running engine process is killed. Absent means no deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl InvocationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    /// Quality used by percentage resizes when none is requested.
    pub default_quality: u32,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            default_quality: 100,
        }
    }
}

/// Initial `-limit` overrides, as symbolic sizes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl LimitsConfig {
    /// The configured overrides, in resource order.
    pub fn overrides(&self) -> Vec<(Resource, String)> {
        [
            (Resource::Area, &self.area),
            (Resource::Map, &self.map),
            (Resource::Disk, &self.disk),
            (Resource::Memory, &self.memory),
            (Resource::File, &self.file),
        ]
        .into_iter()
        .filter_map(|(r, v)| v.clone().map(|v| (r, v)))
        .collect()
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel batch workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(MagickConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<MagickConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: MagickConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults when it is absent.
pub fn load_config(path: &Path) -> Result<MagickConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `magick.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# magick-wrap Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Engine programs
# ---------------------------------------------------------------------------
[programs]
# Looked up on PATH unless given as absolute paths.
convert = "convert"
mogrify = "mogrify"
identify = "identify"

# ---------------------------------------------------------------------------
# Invocation
# ---------------------------------------------------------------------------
[invocation]
# Kill any engine process running longer than this many seconds.
# Omit to wait indefinitely.
# timeout_secs = 30

# ---------------------------------------------------------------------------
# Resizing
# ---------------------------------------------------------------------------
[resize]
# Quality used for percentage resizes when none is requested (1-100).
default_quality = 100

# ---------------------------------------------------------------------------
# Resource limits
# ---------------------------------------------------------------------------
[limits]
# Passed to every engine call as `-limit <resource> <value>`.
# Sizes use binary units: 1mb = 1048576 bytes. "unlimited" is accepted.
# area = "128mb"
# map = "512mb"
# disk = "1gb"
# memory = "256mb"
# file = "768"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for the batch command.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = MagickConfig::default();
        assert_eq!(config.programs.convert, "convert");
        assert_eq!(config.programs.identify, "identify");
        assert_eq!(config.resize.default_quality, 100);
        assert_eq!(config.invocation.timeout(), None);
        assert!(config.limits.overrides().is_empty());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[programs]
convert = "/opt/im/bin/convert"
"#;
        let config: MagickConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.programs.convert, "/opt/im/bin/convert");
        // Default values preserved
        assert_eq!(config.programs.mogrify, "mogrify");
        assert_eq!(config.resize.default_quality, 100);
    }

    #[test]
    fn parse_limits_in_resource_order() {
        let toml = r#"
[limits]
memory = "64mb"
area = "32mb"
"#;
        let config: MagickConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.limits.overrides(),
            vec![
                (Resource::Area, "32mb".to_string()),
                (Resource::Memory, "64mb".to_string())
            ]
        );
    }

    #[test]
    fn timeout_becomes_duration() {
        let config: MagickConfig = toml::from_str("[invocation]\ntimeout_secs = 5").unwrap();
        assert_eq!(config.invocation.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn unknown_keys_rejected() {
        let result: Result<MagickConfig, _> = toml::from_str("[resize]\nqualty = 90");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_limit_rejected() {
        let result: Result<MagickConfig, _> = toml::from_str("[limits]\nthread = \"4\"");
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_bad_quality() {
        let mut config = MagickConfig::default();
        config.resize.default_quality = 101;
        assert!(config.validate().is_err());
        config.resize.default_quality = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_program() {
        let mut config = MagickConfig::default();
        config.programs.identify = "  ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("programs.identify"));
    }

    #[test]
    fn validate_rejects_bad_limit() {
        let mut config = MagickConfig::default();
        config.limits.disk = Some("huge".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("limits.disk"));
    }

    #[test]
    fn validate_accepts_unlimited() {
        let mut config = MagickConfig::default();
        config.limits.disk = Some("unlimited".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = MagickConfig::default();
        config.processing.max_processes = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn effective_threads_clamps_to_cores() {
        let cores = effective_threads(&ProcessingConfig::default());
        assert!(cores >= 1);
        let config = ProcessingConfig {
            max_processes: Some(100_000),
        };
        assert_eq!(effective_threads(&config), cores);
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn merge_toml_overlays_nested_tables() {
        let base = stock_defaults_value();
        let overlay: toml::Value = toml::from_str("[programs]\nidentify = \"gm-identify\"").unwrap();
        let merged = merge_toml(base, overlay);
        let config: MagickConfig = merged.try_into().unwrap();
        assert_eq!(config.programs.identify, "gm-identify");
        assert_eq!(config.programs.convert, "convert");
    }

    #[test]
    fn load_config_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("magick.toml")).unwrap();
        assert_eq!(config, MagickConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("magick.toml");
        fs::write(&path, "[resize]\ndefault_quality = 80\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.resize.default_quality, 80);
    }

    #[test]
    fn load_config_invalid_toml_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("magick.toml");
        fs::write(&path, "[resize\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("magick.toml");
        fs::write(&path, "[resize]\ndefault_quality = 500\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config: MagickConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, MagickConfig::default());
    }
}
