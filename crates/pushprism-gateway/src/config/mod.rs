//! Gateway config loading.
//!
//! The file is `pushprism.yaml` in the working directory unless
//! `PUSHPRISM_CONFIG` names another one. Parsing is strict: unknown keys and
//! out-of-range values are `BAD_CONFIG` errors, never silently defaulted.

pub mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use pushprism_core::error::{PushPrismError, Result};

pub use schema::{AggregationSection, GatewayConfig, GatewaySection};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "PUSHPRISM_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "pushprism.yaml";

/// Config file to load, given the value of [`CONFIG_ENV`] if set.
/// A blank override falls back to the default file.
pub fn config_path(env_override: Option<&str>) -> PathBuf {
    match env_override.map(str::trim) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

/// Load the file selected by [`CONFIG_ENV`].
pub fn load() -> Result<GatewayConfig> {
    let env = std::env::var(CONFIG_ENV).ok();
    load_from_file(config_path(env.as_deref()))
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<GatewayConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path).map_err(|e| {
        PushPrismError::Config(format!("read config {} failed: {e}", path.display()))
    })?;
    let cfg = load_from_str(&s).map_err(|e| match e {
        PushPrismError::Config(msg) => {
            PushPrismError::Config(format!("{}: {msg}", path.display()))
        }
        other => other,
    })?;

    tracing::info!(
        path = %path.display(),
        ignored_labels = cfg.aggregation.ignored_labels.len(),
        gauge_behavior = ?cfg.aggregation.gauge_behavior,
        batch_interval_ms = cfg.aggregation.batch_interval_ms,
        "config loaded"
    );
    Ok(cfg)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| PushPrismError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
