// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the CRUDD dashboard.
//!
//! This crate provides [`DashboardConfig`] together with helpers for loading
//! from TOML files, applying `CRUDD_*` environment overrides, merging
//! overlays, and producing advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use crudd_catalog::{Catalog, CatalogError, CommandSpec};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// An environment override held a value of the wrong shape.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// The configured commands do not form a valid catalog.
    #[error("invalid command catalog: {0}")]
    Catalog(#[from] CatalogError),
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// The request timeout is unusually large.
    LargeTimeout {
        /// Timeout value in seconds.
        secs: u64,
    },
    /// Commands run from a fake filesystem root.
    FsRootOverride {
        /// The configured root.
        root: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeTimeout { secs } => {
                write!(f, "request timeout is unusually large ({secs}s)")
            }
            ConfigWarning::FsRootOverride { root } => {
                write!(f, "executables are resolved under '{root}'")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:4901";

/// Default grace period granted to a command after cancellation or drain.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Top-level runtime configuration for the dashboard.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct DashboardConfig {
    /// Listen address, e.g. `"127.0.0.1:4901"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Fake filesystem root prepended to every executable path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_root: Option<String>,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Log every line streamed to a client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,

    /// Seconds a command may take to exit once its output is drained or the
    /// request is cancelled (1-60).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_secs: Option<u64>,

    /// Hard deadline for a single command request, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Replacement command catalog. Empty means the built-in catalog.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub commands: BTreeMap<String, CommandEntry>,
}

/// One configured command.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct CommandEntry {
    /// Absolute executable path.
    pub path: String,
    /// Whitespace-separated arguments.
    #[serde(default)]
    pub args: String,
}

impl DashboardConfig {
    /// Effective listen address string.
    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND)
    }

    /// Effective log level.
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Effective verbose flag.
    pub fn verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }

    /// Effective grace period.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs.unwrap_or(DEFAULT_GRACE_PERIOD_SECS))
    }

    /// Effective request deadline, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Fake filesystem root, if any.
    pub fn fs_root(&self) -> Option<PathBuf> {
        self.fs_root
            .as_deref()
            .filter(|r| !r.is_empty())
            .map(PathBuf::from)
    }

    /// Build the (unprobed) command catalog this config describes.
    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        if self.commands.is_empty() {
            return Ok(Catalog::builtin());
        }
        let entries = self
            .commands
            .iter()
            .map(|(name, entry)| CommandSpec::new(name, &entry.path, &entry.args));
        Ok(Catalog::new(entries)?)
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum allowed grace period in seconds.
const MAX_GRACE_PERIOD_SECS: u64 = 60;

/// Threshold above which a request timeout generates a warning.
const LARGE_TIMEOUT_THRESHOLD: u64 = 3_600;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`DashboardConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`DashboardConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<DashboardConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => DashboardConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Parse a TOML string into a [`DashboardConfig`].
pub fn parse_toml(content: &str) -> Result<DashboardConfig, ConfigError> {
    toml::from_str::<DashboardConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// JSON schema describing the configuration file.
pub fn config_schema() -> serde_json::Value {
    schemars::schema_for!(DashboardConfig).to_value()
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `CRUDD_BIND`
/// - `CRUDD_FS_ROOT`
/// - `CRUDD_LOG_LEVEL`
/// - `CRUDD_GRACE_PERIOD_SECS`
/// - `CRUDD_REQUEST_TIMEOUT_SECS`
pub fn apply_env_overrides(config: &mut DashboardConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |var| std::env::var(var).ok())
}

/// Apply overrides using an arbitrary variable lookup.
pub fn apply_overrides_from(
    config: &mut DashboardConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(val) = lookup("CRUDD_BIND") {
        config.bind = Some(val);
    }
    if let Some(val) = lookup("CRUDD_FS_ROOT") {
        config.fs_root = Some(val);
    }
    if let Some(val) = lookup("CRUDD_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Some(val) = lookup("CRUDD_GRACE_PERIOD_SECS") {
        config.grace_period_secs = Some(parse_secs("CRUDD_GRACE_PERIOD_SECS", val)?);
    }
    if let Some(val) = lookup("CRUDD_REQUEST_TIMEOUT_SECS") {
        config.request_timeout_secs = Some(parse_secs("CRUDD_REQUEST_TIMEOUT_SECS", val)?);
    }
    Ok(())
}

fn parse_secs(var: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (bad bind address, out-of-range durations, bad command
/// entries) are returned as a [`ConfigError::ValidationError`]; soft issues
/// come back as warnings.
pub fn validate_config(config: &DashboardConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    if config.bind().parse::<SocketAddr>().is_err() {
        errors.push(format!("invalid bind address '{}'", config.bind()));
    }

    if let Some(g) = config.grace_period_secs
        && (g == 0 || g > MAX_GRACE_PERIOD_SECS)
    {
        errors.push(format!(
            "grace period {g}s out of range (1..{MAX_GRACE_PERIOD_SECS})"
        ));
    }

    match config.request_timeout_secs {
        Some(0) => errors.push("request timeout must be at least 1s".into()),
        Some(t) if t > LARGE_TIMEOUT_THRESHOLD => {
            warnings.push(ConfigWarning::LargeTimeout { secs: t });
        }
        Some(_) => {}
        None => warnings.push(ConfigWarning::MissingOptionalField {
            field: "request_timeout_secs".into(),
            hint: "long-running commands stop only when the client disconnects".into(),
        }),
    }

    if let Err(e) = config.catalog() {
        errors.push(e.to_string());
    }

    if let Some(root) = &config.fs_root
        && !root.is_empty()
    {
        warnings.push(ConfigWarning::FsRootOverride { root: root.clone() });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over `base`.
///
/// A non-empty overlay command table replaces the base table wholesale, so
/// that a catalog is never a mix of two sources.
pub fn merge_configs(base: DashboardConfig, overlay: DashboardConfig) -> DashboardConfig {
    DashboardConfig {
        bind: overlay.bind.or(base.bind),
        fs_root: overlay.fs_root.or(base.fs_root),
        log_level: overlay.log_level.or(base.log_level),
        verbose: overlay.verbose.or(base.verbose),
        grace_period_secs: overlay.grace_period_secs.or(base.grace_period_secs),
        request_timeout_secs: overlay.request_timeout_secs.or(base.request_timeout_secs),
        commands: if overlay.commands.is_empty() {
            base.commands
        } else {
            overlay.commands
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
