//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! A few deployment secrets are taken from the environment instead of the
//! file: `SUPABASE_URL`, `SUPABASE_ANON_KEY` and `DEVICE_ID` override the
//! corresponding fields when set.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::acquisition::AcquisitionParams;
use crate::adc::ads1115::{data_rate, target_address, Gain};
use crate::error::{AquasenseError, Result};
use crate::sensors::SensorKind;

/// Environment variable overriding `telemetry.base_url`
pub const ENV_BASE_URL: &str = "SUPABASE_URL";

/// Environment variable overriding `telemetry.anon_key`
pub const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";

/// Environment variable overriding `device.device_id`
pub const ENV_DEVICE_ID: &str = "DEVICE_ID";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub temperature: TemperatureConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Device identity
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

/// I2C and 1-Wire bus configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,

    #[serde(default = "default_adc_address")]
    pub adc_address: u8,

    #[serde(default = "default_adc_gain")]
    pub adc_gain: String,

    #[serde(default = "default_adc_data_rate")]
    pub adc_data_rate: u16,

    #[serde(default = "default_w1_devices_dir")]
    pub w1_devices_dir: String,
}

/// Analog sensor sections
#[derive(Debug, Deserialize, Clone)]
pub struct SensorsConfig {
    #[serde(default = "default_ph_sensor")]
    pub ph: AnalogSensorConfig,

    #[serde(default = "default_turbidity_sensor")]
    pub turbidity: AnalogSensorConfig,

    #[serde(default = "default_tds_sensor")]
    pub tds: AnalogSensorConfig,
}

/// One analog sensor on the ADS1115
#[derive(Debug, Deserialize, Clone)]
pub struct AnalogSensorConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// ADS1115 input; defaults to the sensor's standard wiring when omitted
    #[serde(default)]
    pub channel: Option<u8>,

    #[serde(default = "default_num_samples")]
    pub num_samples: usize,

    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,

    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// TDS only
    #[serde(default)]
    pub temperature_compensation: bool,
}

/// DS18B20 probe configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TemperatureConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_ready_poll_ms")]
    pub ready_poll_ms: u64,

    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

/// Periodic sampling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_interval_s")]
    pub interval_s: u64,
}

/// Calibration file location
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    #[serde(default = "default_calibration_path")]
    pub path: String,
}

/// Remote upload configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub anon_key: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_backoff_s")]
    pub base_backoff_s: u64,

    #[serde(default = "default_request_timeout_s")]
    pub request_timeout_s: u64,
}

/// Local CSV log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_csv_path")]
    pub csv_path: String,
}

/// HTTP read API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_api_bind")]
    pub bind: String,
}

// Default value functions
fn default_device_id() -> String { "aquasense-dev".to_string() }

fn default_i2c_bus() -> u8 { 1 }
fn default_adc_address() -> u8 { 0x48 }
fn default_adc_gain() -> String { "2/3".to_string() }
fn default_adc_data_rate() -> u16 { 128 }
fn default_w1_devices_dir() -> String { "/sys/bus/w1/devices".to_string() }

fn default_enabled() -> bool { true }
fn default_num_samples() -> usize { 200 }
fn default_sampling_interval_ms() -> u64 { 10 }
fn default_tolerance() -> f64 { 0.01 }
fn default_max_attempts() -> u32 { 3 }

fn default_ready_poll_ms() -> u64 { 200 }
fn default_max_polls() -> u32 { 10 }

fn default_interval_s() -> u64 { 900 }

fn default_calibration_path() -> String { "data/calibration.json".to_string() }

fn default_max_retries() -> u32 { 5 }
fn default_base_backoff_s() -> u64 { 2 }
fn default_request_timeout_s() -> u64 { 10 }

fn default_csv_path() -> String { "data/samples.csv".to_string() }

fn default_api_bind() -> String { "0.0.0.0:8000".to_string() }

fn default_analog_sensor() -> AnalogSensorConfig {
    AnalogSensorConfig {
        enabled: default_enabled(),
        channel: None,
        num_samples: default_num_samples(),
        sampling_interval_ms: default_sampling_interval_ms(),
        tolerance: default_tolerance(),
        max_attempts: default_max_attempts(),
        temperature_compensation: false,
    }
}

fn default_ph_sensor() -> AnalogSensorConfig { default_analog_sensor() }
fn default_turbidity_sensor() -> AnalogSensorConfig { default_analog_sensor() }
fn default_tds_sensor() -> AnalogSensorConfig { default_analog_sensor() }

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { device_id: default_device_id() }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            i2c_bus: default_i2c_bus(),
            adc_address: default_adc_address(),
            adc_gain: default_adc_gain(),
            adc_data_rate: default_adc_data_rate(),
            w1_devices_dir: default_w1_devices_dir(),
        }
    }
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            ph: default_ph_sensor(),
            turbidity: default_turbidity_sensor(),
            tds: default_tds_sensor(),
        }
    }
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ready_poll_ms: default_ready_poll_ms(),
            max_polls: default_max_polls(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { interval_s: default_interval_s() }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self { path: default_calibration_path() }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            anon_key: String::new(),
            max_retries: default_max_retries(),
            base_backoff_s: default_base_backoff_s(),
            request_timeout_s: default_request_timeout_s(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { csv_path: default_csv_path() }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind: default_api_bind(),
        }
    }
}

impl AnalogSensorConfig {
    /// Acquisition parameters for this sensor
    #[must_use]
    pub fn params(&self) -> AcquisitionParams {
        AcquisitionParams {
            num_samples: self.num_samples,
            sampling_interval: Duration::from_millis(self.sampling_interval_ms),
            tolerance: self.tolerance,
            max_attempts: self.max_attempts,
        }
    }
}

impl SensorsConfig {
    /// Standard wiring: pH on A0, turbidity on A1, TDS on A2
    #[must_use]
    pub fn default_channel(kind: SensorKind) -> u8 {
        match kind {
            SensorKind::Ph => 0,
            SensorKind::Turbidity => 1,
            SensorKind::Tds => 2,
            SensorKind::Temperature => 3,
        }
    }

    /// The analog sensor sections with their resolved channels
    pub fn analog(&self) -> [(SensorKind, &AnalogSensorConfig, u8); 3] {
        [
            (SensorKind::Ph, &self.ph, self.resolve_channel(SensorKind::Ph, &self.ph)),
            (
                SensorKind::Turbidity,
                &self.turbidity,
                self.resolve_channel(SensorKind::Turbidity, &self.turbidity),
            ),
            (SensorKind::Tds, &self.tds, self.resolve_channel(SensorKind::Tds, &self.tds)),
        ]
    }

    fn resolve_channel(&self, kind: SensorKind, sensor: &AnalogSensorConfig) -> u8 {
        sensor.channel.unwrap_or_else(|| Self::default_channel(kind))
    }
}

impl BusConfig {
    /// Parsed ADS1115 gain
    ///
    /// # Errors
    ///
    /// Returns `Config` if `adc_gain` is not an ADS1115 step.
    pub fn gain(&self) -> Result<Gain> {
        self.adc_gain
            .parse::<Gain>()
            .map_err(|e| AquasenseError::Config(toml::de::Error::custom(e)))
    }
}

impl TemperatureConfig {
    #[must_use]
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }
}

impl SamplingConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_s)
    }
}

impl CalibrationConfig {
    #[must_use]
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Environment overrides are applied before validation.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use aquasense::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents, |key| std::env::var(key).ok())
    }

    /// Parse and validate configuration text, resolving overrides through
    /// `env`
    ///
    /// # Errors
    ///
    /// Returns `Config` on a TOML or validation error.
    pub fn parse<F>(contents: &str, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = toml::from_str(contents)?;
        config.apply_env_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Replace fields with non-empty environment values
    pub fn apply_env_overrides<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = lookup(ENV_BASE_URL) {
            self.telemetry.base_url = url;
        }
        if let Some(key) = lookup(ENV_ANON_KEY) {
            self.telemetry.anon_key = key;
        }
        if let Some(id) = lookup(ENV_DEVICE_ID) {
            self.device.device_id = id;
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.device.device_id.trim().is_empty() {
            return Err(invalid("device_id cannot be empty"));
        }

        self.bus.gain()?;

        if target_address(self.bus.adc_address).is_none() {
            return Err(invalid("adc_address must be one of: 0x48, 0x49, 0x4A, 0x4B"));
        }

        if data_rate(self.bus.adc_data_rate).is_none() {
            return Err(invalid(
                "adc_data_rate must be one of: 8, 16, 32, 64, 128, 250, 475, 860",
            ));
        }

        let mut used_channels: Vec<u8> = Vec::new();
        for (kind, sensor, channel) in self.sensors.analog() {
            if sensor.num_samples < 2 {
                return Err(invalid(format!("{} num_samples must be at least 2", kind)));
            }

            if !sensor.tolerance.is_finite() || sensor.tolerance <= 0.0 {
                return Err(invalid(format!(
                    "{} tolerance must be a positive finite number",
                    kind
                )));
            }

            if sensor.max_attempts == 0 || sensor.max_attempts > 20 {
                return Err(invalid(format!("{} max_attempts must be between 1 and 20", kind)));
            }

            if sensor.temperature_compensation && kind != SensorKind::Tds {
                return Err(invalid(format!(
                    "temperature_compensation is only supported for tds, not {}",
                    kind
                )));
            }

            if channel > 3 {
                return Err(invalid(format!(
                    "{} channel {} is out of bounds (must be 0-3)",
                    kind, channel
                )));
            }

            if sensor.enabled {
                if used_channels.contains(&channel) {
                    return Err(invalid(format!(
                        "ADC channel {} is assigned to more than one sensor",
                        channel
                    )));
                }
                used_channels.push(channel);
            }
        }

        if self.temperature.max_polls == 0 {
            return Err(invalid("temperature max_polls must be greater than 0"));
        }

        if self.sampling.interval_s == 0 {
            return Err(invalid("sampling interval_s must be greater than 0"));
        }

        if self.calibration.path.is_empty() {
            return Err(invalid("calibration path cannot be empty"));
        }

        if self.logging.csv_path.is_empty() {
            return Err(invalid("logging csv_path cannot be empty"));
        }

        if self.telemetry.enabled && self.telemetry.base_url.trim().is_empty() {
            return Err(invalid(
                "telemetry base_url cannot be empty when enabled (set SUPABASE_URL)",
            ));
        }

        if self.telemetry.max_retries == 0 {
            return Err(invalid("telemetry max_retries must be greater than 0"));
        }

        if self.telemetry.request_timeout_s == 0 || self.telemetry.request_timeout_s > 300 {
            return Err(invalid("telemetry request_timeout_s must be between 1 and 300"));
        }

        if self.api.enabled && self.api.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(invalid(format!(
                "api bind '{}' is not a valid socket address",
                self.api.bind
            )));
        }

        Ok(())
    }
}

fn invalid(message: impl std::fmt::Display) -> AquasenseError {
    AquasenseError::Config(toml::de::Error::custom(message))
}
