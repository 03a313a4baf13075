//! Configuration loading traits and types.
//!
//! Panic marker names and the default output format are runtime-specific
//! settings, so they live in a TOML file rather than in code.
//!
//! # Usage
//!
//! ```rust,no_run
//! use faultline::config::{ConfigError, ConfigLoader, FaultlineConfig};
//! use faultline::detect::PanicDetector;
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = FaultlineConfig::load(Path::new("faultline.toml"))?;
//!     config.validate()?;
//!     let detector = PanicDetector::new(config.markers);
//!     Ok(())
//! }
//! ```

use crate::detect::PanicMarkers;
use crate::format::Format;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Settings shared by every consumer of this crate.
///
/// # TOML Example
///
/// ```toml
/// log_level = "debug"
/// format = "long"
///
/// [markers]
/// deferred_invokers = ["std::panicking::panic_with_hook"]
/// fault_entries = ["std::panicking::panic_with_hook"]
/// internal_prefixes = ["std::", "core::", "alloc::"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FaultlineConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Format used when the caller does not ask for one.
    #[serde(default)]
    pub format: Format,

    /// Panic markers of the runtime in use.
    #[serde(default)]
    pub markers: PanicMarkers,
}

impl FaultlineConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the marker set is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.markers.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
