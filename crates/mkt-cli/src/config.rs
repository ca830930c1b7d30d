//! CLI configuration file

use std::path::Path;

use anyhow::{Context, Result};
use mkt_core::EngineConfig;
use serde::{Deserialize, Serialize};

/// Contents of the `--config` TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct CliConfig {
    /// Filter directive used when `MKT_LOG` is unset
    pub(crate) log_level: Option<String>,
    /// Emit JSON log lines
    pub(crate) log_json: bool,
    pub(crate) engine: EngineConfig,
}

impl CliConfig {
    /// Read `path`, or defaults when no path is given
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub(crate) fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub(crate) fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}
