//! Exporter configuration loaded from `~/.config/smi-exporter/config.ron`.

use crate::ExporterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Directory name used under the platform config directory.
pub const CONFIG_DIR_NAME: &str = "smi-exporter";

/// File name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ron";

/// What to publish when a metric has no usable reading.
///
/// A failed command and unparseable output both produce "no reading".
/// `Zero` publishes `0.0` in its place, which is indistinguishable from a
/// genuine zero; `Omit` leaves the sample out of the scrape.
///
/// # Examples
///
/// ```rust
/// use smi_exporter_core::MissingValue;
///
/// let policy: MissingValue = "omit".parse().unwrap();
/// assert_eq!(policy, MissingValue::Omit);
/// assert_eq!(MissingValue::default(), MissingValue::Zero);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingValue {
    /// Publish `0.0`.
    #[default]
    Zero,
    /// Skip the sample.
    Omit,
}

impl MissingValue {
    /// Resolve an optional reading into the value to publish, if any.
    #[must_use]
    pub fn resolve(self, reading: Option<f64>) -> Option<f64> {
        match (reading, self) {
            (Some(value), _) => Some(value),
            (None, Self::Zero) => Some(0.0),
            (None, Self::Omit) => None,
        }
    }
}

impl fmt::Display for MissingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Zero => "zero",
            Self::Omit => "omit",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for MissingValue {
    type Err = MissingValueParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zero" | "0" => Ok(Self::Zero),
            "omit" | "skip" | "none" => Ok(Self::Omit),
            _ => Err(MissingValueParseError {
                input: s.to_owned(),
                valid_options: &["zero", "omit"],
            }),
        }
    }
}

/// Error type for parsing [`MissingValue`] from string.
#[derive(Debug, thiserror::Error)]
#[error("Invalid missing-value policy '{input}'. Valid options: {}", valid_options.join(", "))]
pub struct MissingValueParseError {
    input: String,
    valid_options: &'static [&'static str],
}

/// Exporter configuration.
///
/// Every field has a default, so an empty `()` RON document is valid.
/// Command line arguments override whatever is loaded here.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExporterConfig {
    /// Address the `/metrics` endpoint binds to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Path or name of the `nvidia-smi` binary
    #[serde(default = "default_nvidia_smi")]
    pub nvidia_smi: String,
    /// Also publish fan speed and power draw
    #[serde(default)]
    pub extended_metrics: bool,
    /// Policy for metrics without a usable reading
    #[serde(default)]
    pub missing_value: MissingValue,
    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_listen() -> String {
    "0.0.0.0:9445".to_owned()
}

fn default_nvidia_smi() -> String {
    "nvidia-smi".to_owned()
}

fn default_log_filter() -> String {
    "info".to_owned()
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            nvidia_smi: default_nvidia_smi(),
            extended_metrics: false,
            missing_value: MissingValue::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from the standard config file location.
    ///
    /// Searches for config in:
    /// 1. ~/.config/smi-exporter/config.ron
    /// 2. ~/.smi-exporter/config.ron (fallback)
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self, ExporterError> {
        if let Some(config_path) = Self::find_config_file() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ExporterError> {
        let content = std::fs::read_to_string(path)?;

        let config: ExporterConfig = ron::from_str(&content).map_err(|e| {
            ExporterError::parse_with_source(
                format!("Failed to parse config file {}", path.display()),
                e,
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Find the config file in standard locations.
    pub fn find_config_file() -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_path = config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
            if xdg_path.exists() {
                return Some(xdg_path);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir
                .join(format!(".{CONFIG_DIR_NAME}"))
                .join(CONFIG_FILE_NAME);
            if home_path.exists() {
                return Some(home_path);
            }
        }

        None
    }

    /// Get the default config file path for writing.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ExporterError> {
        self.listen_addr()?;

        if self.nvidia_smi.trim().is_empty() {
            return Err(ExporterError::config("nvidia_smi must not be empty"));
        }

        Ok(())
    }

    /// Parse the listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ExporterError> {
        self.listen.parse().map_err(|_| {
            ExporterError::config_with_value("Invalid listen address", self.listen.clone())
        })
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ExporterError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ExporterError::parse_with_source("Failed to serialize config", e))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Save a commented example configuration to a file.
    pub fn save_example_config_to_file(path: &Path) -> Result<(), ExporterError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = r#"// smi-exporter configuration
// Copy this to ~/.config/smi-exporter/config.ron and adjust as needed.
// Command line arguments override these settings.
(
    // Address the /metrics endpoint binds to
    listen: "0.0.0.0:9445",

    // nvidia-smi binary, either a name on PATH or an absolute path
    nvidia_smi: "nvidia-smi",

    // Also publish gpu_fan_speed and gpu_power_draw
    extended_metrics: false,

    // What to publish when a reading fails
    // Options: zero, omit
    missing_value: zero,

    // Log filter when RUST_LOG is not set (e.g. "info", "smi_exporter=debug")
    log_filter: "info",
)
"#;

        std::fs::write(path, template)?;
        Ok(())
    }
}
