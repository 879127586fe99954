//! Configuration loading from TOML files
//!
//! Config file is selected via the --config command line argument,
//! defaulting to config/dev.toml. A missing or malformed file falls back to
//! built-in defaults so a controller can still come up on a bare machine.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Facility identifier used in logs (e.g. "lot-a")
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "parkgate".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub device: String,
    pub baud: u32,
    pub poll_interval_ms: u64,
    /// Vehicle present when distance is at or below this (cm)
    #[serde(default = "default_trigger_cm")]
    pub trigger_cm: f64,
    /// Substitute reading when the link is absent or the sample is bad
    #[serde(default = "default_fallback_cm")]
    pub fallback_cm: f64,
    /// Samples above this are discarded as sensor noise (cm)
    #[serde(default = "default_max_range_cm")]
    pub max_range_cm: f64,
}

fn default_trigger_cm() -> f64 {
    50.0
}

fn default_fallback_cm() -> f64 {
    150.0
}

fn default_max_range_cm() -> f64 {
    400.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActuatorConfig {
    pub device: String,
    pub baud: u32,
    /// Seconds the gate is held open for the vehicle to pass
    #[serde(default = "default_hold_secs")]
    pub hold_secs: u64,
}

fn default_hold_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalConfig {
    pub device: String,
    pub baud: u32,
    /// Bounded wait for the READY handshake at connection time
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    /// Bounded wait for a terminal response during payment negotiation
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
}

fn default_ready_timeout_secs() -> u64 {
    10
}

fn default_response_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionsConfig {
    /// Enable the TCP listener for the vision/OCR collaborator
    #[serde(default = "default_detections_enabled")]
    pub enabled: bool,
    #[serde(default = "default_detections_port")]
    pub listener_port: u16,
    /// Boxes smaller than this are discarded as noise before extraction
    #[serde(default = "default_min_box_height")]
    pub min_box_height: u32,
    #[serde(default = "default_min_box_width")]
    pub min_box_width: u32,
}

impl Default for DetectionsConfig {
    fn default() -> Self {
        Self {
            enabled: default_detections_enabled(),
            listener_port: default_detections_port(),
            min_box_height: default_min_box_height(),
            min_box_width: default_min_box_width(),
        }
    }
}

fn default_detections_enabled() -> bool {
    true
}

fn default_detections_port() -> u16 {
    4710
}

fn default_min_box_height() -> u32 {
    20
}

fn default_min_box_width() -> u32 {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Session log file (JSONL, one session per line)
    #[serde(default = "default_store_file")]
    pub file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { file: default_store_file() }
    }
}

fn default_store_file() -> String {
    "sessions.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_rate_per_hour")]
    pub rate_per_hour: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self { rate_per_hour: default_rate_per_hour() }
    }
}

fn default_rate_per_hour() -> f64 {
    200.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct CooldownConfig {
    /// Minimum seconds between repeated entry decisions for the same plate
    #[serde(default = "default_entry_cooldown_secs")]
    pub entry_secs: u64,
    /// Minimum seconds between repeated exit decisions for the same plate
    #[serde(default = "default_exit_cooldown_secs")]
    pub exit_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self { entry_secs: default_entry_cooldown_secs(), exit_secs: default_exit_cooldown_secs() }
    }
}

fn default_entry_cooldown_secs() -> u64 {
    300
}

fn default_exit_cooldown_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub sensor: SensorConfig,
    pub actuator: ActuatorConfig,
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub detections: DetectionsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub cooldown: CooldownConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    sensor_device: String,
    sensor_baud: u32,
    sensor_poll_interval_ms: u64,
    sensor_trigger_cm: f64,
    sensor_fallback_cm: f64,
    sensor_max_range_cm: f64,
    actuator_device: String,
    actuator_baud: u32,
    gate_hold_secs: u64,
    terminal_device: String,
    terminal_baud: u32,
    terminal_ready_timeout_secs: u64,
    terminal_response_timeout_secs: u64,
    detections_enabled: bool,
    detections_port: u16,
    min_box_height: u32,
    min_box_width: u32,
    store_file: String,
    rate_per_hour: f64,
    entry_cooldown_secs: u64,
    exit_cooldown_secs: u64,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            sensor_device: "/dev/ttyUSB0".to_string(),
            sensor_baud: 9600,
            sensor_poll_interval_ms: 200,
            sensor_trigger_cm: default_trigger_cm(),
            sensor_fallback_cm: default_fallback_cm(),
            sensor_max_range_cm: default_max_range_cm(),
            actuator_device: "/dev/ttyUSB1".to_string(),
            actuator_baud: 9600,
            gate_hold_secs: default_hold_secs(),
            terminal_device: "/dev/ttyUSB2".to_string(),
            terminal_baud: 9600,
            terminal_ready_timeout_secs: default_ready_timeout_secs(),
            terminal_response_timeout_secs: default_response_timeout_secs(),
            detections_enabled: default_detections_enabled(),
            detections_port: default_detections_port(),
            min_box_height: default_min_box_height(),
            min_box_width: default_min_box_width(),
            store_file: default_store_file(),
            rate_per_hour: default_rate_per_hour(),
            entry_cooldown_secs: default_entry_cooldown_secs(),
            exit_cooldown_secs: default_exit_cooldown_secs(),
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            site_id: toml_config.site.id,
            sensor_device: toml_config.sensor.device,
            sensor_baud: toml_config.sensor.baud,
            sensor_poll_interval_ms: toml_config.sensor.poll_interval_ms,
            sensor_trigger_cm: toml_config.sensor.trigger_cm,
            sensor_fallback_cm: toml_config.sensor.fallback_cm,
            sensor_max_range_cm: toml_config.sensor.max_range_cm,
            actuator_device: toml_config.actuator.device,
            actuator_baud: toml_config.actuator.baud,
            gate_hold_secs: toml_config.actuator.hold_secs,
            terminal_device: toml_config.terminal.device,
            terminal_baud: toml_config.terminal.baud,
            terminal_ready_timeout_secs: toml_config.terminal.ready_timeout_secs,
            terminal_response_timeout_secs: toml_config.terminal.response_timeout_secs,
            detections_enabled: toml_config.detections.enabled,
            detections_port: toml_config.detections.listener_port,
            min_box_height: toml_config.detections.min_box_height,
            min_box_width: toml_config.detections.min_box_width,
            store_file: toml_config.store.file,
            rate_per_hour: toml_config.pricing.rate_per_hour,
            entry_cooldown_secs: toml_config.cooldown.entry_secs,
            exit_cooldown_secs: toml_config.cooldown.exit_secs,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn sensor_device(&self) -> &str {
        &self.sensor_device
    }

    pub fn sensor_baud(&self) -> u32 {
        self.sensor_baud
    }

    pub fn sensor_poll_interval_ms(&self) -> u64 {
        self.sensor_poll_interval_ms
    }

    pub fn sensor_trigger_cm(&self) -> f64 {
        self.sensor_trigger_cm
    }

    pub fn sensor_fallback_cm(&self) -> f64 {
        self.sensor_fallback_cm
    }

    pub fn sensor_max_range_cm(&self) -> f64 {
        self.sensor_max_range_cm
    }

    pub fn actuator_device(&self) -> &str {
        &self.actuator_device
    }

    pub fn actuator_baud(&self) -> u32 {
        self.actuator_baud
    }

    pub fn gate_hold_secs(&self) -> u64 {
        self.gate_hold_secs
    }

    pub fn terminal_device(&self) -> &str {
        &self.terminal_device
    }

    pub fn terminal_baud(&self) -> u32 {
        self.terminal_baud
    }

    pub fn terminal_ready_timeout_secs(&self) -> u64 {
        self.terminal_ready_timeout_secs
    }

    pub fn terminal_response_timeout_secs(&self) -> u64 {
        self.terminal_response_timeout_secs
    }

    pub fn detections_enabled(&self) -> bool {
        self.detections_enabled
    }

    pub fn detections_port(&self) -> u16 {
        self.detections_port
    }

    pub fn min_box_height(&self) -> u32 {
        self.min_box_height
    }

    pub fn min_box_width(&self) -> u32 {
        self.min_box_width
    }

    pub fn store_file(&self) -> &str {
        &self.store_file
    }

    pub fn rate_per_hour(&self) -> f64 {
        self.rate_per_hour
    }

    pub fn entry_cooldown_secs(&self) -> u64 {
        self.entry_cooldown_secs
    }

    pub fn exit_cooldown_secs(&self) -> u64 {
        self.exit_cooldown_secs
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point the store at a temp file
    #[cfg(test)]
    pub fn with_store_file(mut self, file: &str) -> Self {
        self.store_file = file.to_string();
        self
    }

    /// Builder method for tests to set the hourly rate
    #[cfg(test)]
    pub fn with_rate_per_hour(mut self, rate: f64) -> Self {
        self.rate_per_hour = rate;
        self
    }

    /// Builder method for tests to shrink cooldown windows
    #[cfg(test)]
    pub fn with_cooldowns(mut self, entry_secs: u64, exit_secs: u64) -> Self {
        self.entry_cooldown_secs = entry_secs;
        self.exit_cooldown_secs = exit_secs;
        self
    }

    /// Builder method for tests to avoid waiting out the gate hold
    #[cfg(test)]
    pub fn with_gate_hold_secs(mut self, secs: u64) -> Self {
        self.gate_hold_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sensor_trigger_cm(), 50.0);
        assert_eq!(config.sensor_fallback_cm(), 150.0);
        assert_eq!(config.sensor_max_range_cm(), 400.0);
        assert_eq!(config.gate_hold_secs(), 15);
        assert_eq!(config.rate_per_hour(), 200.0);
        assert_eq!(config.entry_cooldown_secs(), 300);
        assert_eq!(config.exit_cooldown_secs(), 60);
        assert_eq!(config.store_file(), "sessions.jsonl");
    }

    #[test]
    fn test_box_filter_defaults() {
        let config = Config::default();
        assert_eq!(config.min_box_height(), 20);
        assert_eq!(config.min_box_width(), 50);
        assert!(config.detections_enabled());
    }

    #[test]
    fn test_load_from_path_fallback() {
        let config = Config::load_from_path("nonexistent/path.toml");
        assert_eq!(config.config_file(), "default");
        assert_eq!(config.sensor_trigger_cm(), 50.0);
    }
}
