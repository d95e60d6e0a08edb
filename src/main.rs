//! # Aquasense
//!
//! Water-quality monitoring daemon.
//!
//! Samples pH, turbidity and TDS through an ADS1115 plus a DS18B20
//! temperature probe every sampling period, then logs, uploads and serves
//! the results.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::{error, info};

use aquasense::adc::SharedAdc;
use aquasense::api;
use aquasense::calibration::CalibrationSet;
use aquasense::config::Config;
use aquasense::sampler::Sampler;
use aquasense::sensors::SensorReadingService;
use aquasense::telemetry::{CsvLogger, Uploader};

#[cfg(feature = "hardware")]
use aquasense::adc::Ads1115;
#[cfg(not(feature = "hardware"))]
use aquasense::adc::SimulatedAdc;

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for Aquasense
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Load configuration (`aquasense [config-path]`) and environment
///      overrides
///    - Load calibration; a missing or invalid file is fatal
///    - Open the ADS1115 and discover the temperature probe
///
/// 2. **Main Loop**
///    - Serve the read API in the background
///    - Run a sampling cycle every `sampling.interval_s`
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if configuration, calibration or hardware setup fails.
///
/// # Examples
///
/// ```bash
/// cargo run --release --features hardware -- config/default.toml
/// ```
///
/// Expected output:
/// ```text
/// INFO aquasense: Aquasense v0.1.0 starting...
/// INFO aquasense::calibration: Loaded 3 calibration model(s) from data/calibration.json
/// INFO aquasense::sampler: Sampling every 900s
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Aquasense v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    info!("Configuration loaded from {}", config_path);

    let required = required_calibrations(&config);
    let calibration = CalibrationSet::load(config.calibration.path(), &required)
        .context("Failed to load calibration")?;

    let adc = open_adc(&config)?;
    let service = SensorReadingService::from_config(&config, adc, &calibration)
        .context("Failed to set up sensors")?;
    let service = Arc::new(service);

    let state = api::shared_state();
    if config.api.enabled {
        let bind = config.api.bind.clone();
        let api_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(&bind, api_state).await {
                error!("Read API stopped: {}", e);
            }
        });
    }

    let mut sampler = Sampler::new(
        config.device.device_id.clone(),
        service,
        state,
        config.sampling.interval(),
    )
    .with_csv_log(CsvLogger::new(&config.logging.csv_path));

    if config.telemetry.enabled {
        let uploader = Uploader::from_config(&config.telemetry)?;
        sampler = sampler.with_uploader(uploader);
    } else {
        info!("Telemetry upload disabled");
    }

    info!("Press Ctrl+C to exit");

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    };
    sampler.run(shutdown).await;

    Ok(())
}

/// Calibration keys of the enabled analog sensors
fn required_calibrations(config: &Config) -> Vec<&'static str> {
    config
        .sensors
        .analog()
        .iter()
        .filter(|(_, sensor, _)| sensor.enabled)
        .map(|(kind, _, _)| kind.key())
        .collect()
}

#[cfg(feature = "hardware")]
fn open_adc(config: &Config) -> Result<SharedAdc<Ads1115<rppal::i2c::I2c>>> {
    let adc = Ads1115::open(
        config.bus.i2c_bus,
        config.bus.adc_address,
        config.bus.gain()?,
        config.bus.adc_data_rate,
    )?;
    info!(
        "ADS1115 at 0x{:02X} on I2C bus {}",
        config.bus.adc_address, config.bus.i2c_bus
    );
    Ok(Arc::new(Mutex::new(adc)))
}

#[cfg(not(feature = "hardware"))]
fn open_adc(config: &Config) -> Result<SharedAdc<SimulatedAdc>> {
    let adc = SimulatedAdc::mid_scale(config.bus.gain()?);
    Ok(Arc::new(Mutex::new(adc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        assert_eq!(DEFAULT_CONFIG_PATH, "config/default.toml");
    }

    #[test]
    fn test_required_calibrations_follow_enabled_sensors() {
        let mut config = Config::default();
        assert_eq!(
            required_calibrations(&config),
            vec!["ph", "turbidity", "total_dissolved_solids"]
        );

        config.sensors.turbidity.enabled = false;
        assert_eq!(
            required_calibrations(&config),
            vec!["ph", "total_dissolved_solids"]
        );
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn test_simulated_adc_reads_mid_scale() {
        use aquasense::adc::AdcDevice;

        let config = Config::default();
        let adc = open_adc(&config).unwrap();
        let volts = adc.lock().unwrap().read_voltage(0).unwrap();
        // 2/3 gain: +/-6.144 V full scale
        assert!((volts - 3.072).abs() < 1e-3);
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let contents = std::fs::read_to_string(DEFAULT_CONFIG_PATH).unwrap();
        let config = Config::parse(&contents, |_| None).unwrap();
        assert_eq!(config.sampling.interval_s, 900);
    }

    #[test]
    fn test_shipped_calibration_loads() {
        let config = Config::default();
        let set = CalibrationSet::load(config.calibration.path(), &required_calibrations(&config))
            .unwrap();
        assert_eq!(set.len(), 3);
    }
}
