use std::net::SocketAddr;
use std::time::Duration;

use pushprism_core::error::{PushPrismError, Result};
use pushprism_core::{AggregateOptions, GaugeBehavior, IgnoredLabels};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub aggregation: AggregationSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PushPrismError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.gateway.validate()?;
        self.aggregation.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    /// Push and scrape endpoints.
    #[serde(default = "default_api_listen")]
    pub api_listen: String,

    /// Self-metrics endpoint.
    #[serde(default = "default_lifecycle_listen")]
    pub lifecycle_listen: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            api_listen: default_api_listen(),
            lifecycle_listen: default_lifecycle_listen(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        let api = self.api_addr()?;
        let lifecycle = self.lifecycle_addr()?;
        if api == lifecycle {
            return Err(PushPrismError::Config(
                "gateway.api_listen and gateway.lifecycle_listen must differ".into(),
            ));
        }
        Ok(())
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        parse_addr("gateway.api_listen", &self.api_listen)
    }

    pub fn lifecycle_addr(&self) -> Result<SocketAddr> {
        parse_addr("gateway.lifecycle_listen", &self.lifecycle_listen)
    }
}

fn parse_addr(field: &str, v: &str) -> Result<SocketAddr> {
    v.parse().map_err(|e| {
        PushPrismError::Config(format!("{field} must be a valid SocketAddr ({v}): {e}"))
    })
}

fn default_api_listen() -> String {
    "0.0.0.0:80".into()
}
fn default_lifecycle_listen() -> String {
    "0.0.0.0:8888".into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregationSection {
    /// Label names stripped from every pushed series (case-insensitive).
    #[serde(default)]
    pub ignored_labels: Vec<String>,

    #[serde(default)]
    pub gauge_behavior: GaugeBehavior,

    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
}

impl Default for AggregationSection {
    fn default() -> Self {
        Self {
            ignored_labels: Vec::new(),
            gauge_behavior: GaugeBehavior::default(),
            batch_interval_ms: default_batch_interval_ms(),
        }
    }
}

impl AggregationSection {
    pub fn validate(&self) -> Result<()> {
        if !(10..=3_600_000).contains(&self.batch_interval_ms) {
            return Err(PushPrismError::Config(
                "aggregation.batch_interval_ms must be between 10 and 3600000".into(),
            ));
        }
        if self.ignored_labels.iter().any(|l| l.trim().is_empty()) {
            return Err(PushPrismError::Config(
                "aggregation.ignored_labels must not contain empty names".into(),
            ));
        }
        Ok(())
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    /// Core merge options for both store sides.
    pub fn options(&self) -> AggregateOptions {
        AggregateOptions {
            ignored_labels: IgnoredLabels::new(&self.ignored_labels),
            gauge_behavior: self.gauge_behavior,
        }
    }
}

fn default_batch_interval_ms() -> u64 {
    60_000
}
