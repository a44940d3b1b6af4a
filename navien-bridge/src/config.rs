//! Bridge configuration
//!
//! Settings come from an optional TOML file; every key is optional and falls
//! back to the defaults below. Command-line flags override the file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use navien_rs::EngineConfig;
use serde::Deserialize;

/// Bridge configuration settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    // Serial settings; an empty port runs without a bus
    pub port: String,
    pub baud_rate: u32,

    // Engine settings
    pub idle_gap_ms: u64,
    pub flush_after_frame: bool,
    pub simulation: bool,

    /// UDP broadcast port for decoded state, 0 disables
    pub udp_port: u16,

    /// Initial trace filter: "", "all", "gas", "water", "command" or "announce"
    pub trace: String,

    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            // Fixed by the heater
            baud_rate: 19200,
            idle_gap_ms: 10,
            flush_after_frame: false,
            // Stays in simulation until the heater is heard
            simulation: true,
            udp_port: 2025,
            trace: String::new(),
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load from `path`, or use defaults if no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: BridgeConfig = toml::from_str(text)?;
        if config.baud_rate == 0 {
            config.baud_rate = Self::default().baud_rate;
        }
        Ok(config)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_idle_gap(Duration::from_millis(self.idle_gap_ms))
            .with_flush_after_frame(self.flush_after_frame)
            .with_simulation(self.simulation)
    }
}
