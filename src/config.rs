//! Configuration: compression option overrides and runtime settings.
//!
//! ## Options
//!
//! Callers describe what they want with a sparse [`OptionsOverride`]: every
//! field is optional and unset fields fall back to the defaults below.
//! [`OptionsOverride::validate`] turns it into the [`CompressionOptions`] the
//! strategies consume. Validation never fails; bad values are replaced and a
//! warning is logged.
//!
//! | Field | Default | Invalid value becomes |
//! |---|---|---|
//! | `quality` | `0.7` | `0.7` (outside `[0, 1]`) |
//! | `format` | `webp` | `jpeg` (unknown name) |
//! | `max_width` / `max_height` | unset | unset (not positive) |
//! | `preferred_method` | unset (automatic) | unset (unknown name) |
//!
//! ## Config file
//!
//! `pixpress.toml` is loaded like any layered config: the stock defaults are
//! serialized to a TOML value, the user file is merged on top, and the
//! result is deserialized and validated.
//!
//! ```toml
//! [options]
//! quality = 0.8
//! format = "jpeg"
//! max_width = 1920
//!
//! [worker]
//! timeout_secs = 30
//!
//! [engine]
//! timeout_secs = 60
//! max_size_mb = 10.0
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::strategy::RuntimeSettings;
use crate::types::{CompressionOptions, Method, OutputFormat};
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
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

pub const DEFAULT_QUALITY: f64 = 0.7;

/// Named quality levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityPreset {
    Low,
    Medium,
    High,
    Lossless,
}

impl QualityPreset {
    pub fn value(self) -> f64 {
        match self {
            Self::Low => 0.4,
            Self::Medium => 0.7,
            Self::High => 0.9,
            Self::Lossless => 1.0,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "lossless" => Some(Self::Lossless),
            _ => None,
        }
    }
}

/// Sparse, user-facing compression options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionsOverride {
    /// Encoder quality in `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    /// `webp`, `jpeg`, `jpg` or `png`, any case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<i64>,
    /// `canvas`, `worker`, `wasm` or `lightweight`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_method: Option<String>,
}

fn positive_dimension(field: &str, value: Option<i64>) -> Option<u32> {
    let value = value?;
    match u32::try_from(value) {
        Ok(v) if v > 0 => Some(v),
        _ => {
            log::warn!("ignoring {} = {}: must be a positive pixel count", field, value);
            None
        }
    }
}

impl OptionsOverride {
    /// Layer `over` on top of `self`: fields set in `over` win.
    pub fn merge(&self, over: &OptionsOverride) -> OptionsOverride {
        OptionsOverride {
            quality: over.quality.or(self.quality),
            format: over.format.clone().or_else(|| self.format.clone()),
            max_width: over.max_width.or(self.max_width),
            max_height: over.max_height.or(self.max_height),
            preferred_method: over
                .preferred_method
                .clone()
                .or_else(|| self.preferred_method.clone()),
        }
    }

    /// Fill defaults and normalise bad values.
    pub fn validate(&self) -> CompressionOptions {
        let quality = match self.quality {
            None => DEFAULT_QUALITY,
            Some(q) if (0.0..=1.0).contains(&q) => q,
            Some(q) => {
                log::warn!("quality {} is outside [0, 1], using {}", q, DEFAULT_QUALITY);
                DEFAULT_QUALITY
            }
        };

        let format = match self.format.as_deref() {
            None => OutputFormat::WebP,
            Some(name) => OutputFormat::parse(name).unwrap_or_else(|| {
                log::warn!("unknown format {:?}, using jpeg", name);
                OutputFormat::Jpeg
            }),
        };

        let preferred_method = self.preferred_method.as_deref().and_then(|name| {
            let method = Method::parse(name);
            if method.is_none() {
                log::warn!("unknown compression method {:?}, selecting automatically", name);
            }
            method
        });

        CompressionOptions {
            quality: quality as f32,
            format,
            max_width: positive_dimension("max_width", self.max_width),
            max_height: positive_dimension("max_height", self.max_height),
            preferred_method,
        }
    }
}

/// Background worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Seconds to wait for the worker to start and for each job.
    pub timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Delegated codec engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Seconds to wait for each engine call.
    pub timeout_secs: u64,
    /// Output budget in megabytes.
    pub max_size_mb: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_size_mb: 10.0,
        }
    }
}

/// Everything `pixpress.toml` can set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressorConfig {
    /// Default options for every call; per-call options win.
    pub options: OptionsOverride,
    pub worker: WorkerConfig,
    pub engine: EngineConfig,
}

impl CompressorConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "worker.timeout_secs must be non-zero".into(),
            ));
        }
        if self.engine.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "engine.timeout_secs must be non-zero".into(),
            ));
        }
        if self.engine.max_size_mb.is_nan() || self.engine.max_size_mb <= 0.0 {
            return Err(ConfigError::Validation(
                "engine.max_size_mb must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            worker_timeout: Duration::from_secs(self.worker.timeout_secs),
            engine_timeout: Duration::from_secs(self.engine.timeout_secs),
            max_size_mb: self.engine.max_size_mb,
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(CompressorConfig::default())?)
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
) -> Result<CompressorConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: CompressorConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults when it is absent.
pub fn load_config(path: &Path) -> Result<CompressorConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `pixpress.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixpress configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Default compression options (command-line flags win)
# ---------------------------------------------------------------------------
[options]
# Encoder quality from 0.0 to 1.0. Presets: low 0.4, medium 0.7, high 0.9,
# lossless 1.0. Out-of-range values fall back to 0.7.
quality = 0.7

# Output format: webp, jpeg, jpg or png. Unknown names fall back to jpeg.
format = "webp"

# Bounding box in pixels. Images are only ever scaled down.
# max_width = 1920
# max_height = 1080

# Force a strategy: canvas, worker, wasm or lightweight.
# Omit for automatic selection. Unavailable methods fall back to automatic.
# preferred_method = "worker"

# ---------------------------------------------------------------------------
# Background worker
# ---------------------------------------------------------------------------
[worker]
# Seconds to wait for the worker to start, and for each job.
timeout_secs = 30

# ---------------------------------------------------------------------------
# Delegated codec engine
# ---------------------------------------------------------------------------
[engine]
# Seconds to wait for each engine call.
timeout_secs = 60

# Output budget in megabytes. The engine lowers quality, then dimensions,
# until the result fits.
max_size_mb = 10.0
"##
}
