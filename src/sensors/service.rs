//! # Sensor Reading Service
//!
//! Owns the device's sensors, keyed by [`SensorKind`], and answers
//! `read(kind)` requests.
//!
//! Analog sensors share one ADS1115 handle, so their reads serialize on the
//! bus lock. The temperature probe lives on a different bus and can be read
//! concurrently with them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::{AnalogSensor, Conditions, Sensor, SensorKind, SensorReading, TemperatureProbe};
use crate::adc::{AdcDevice, SharedAdc};
use crate::calibration::CalibrationSet;
use crate::config::Config;
use crate::error::{AquasenseError, Result};

/// Registry of readable sensors.
#[derive(Default)]
pub struct SensorReadingService {
    sensors: BTreeMap<SensorKind, Arc<dyn Sensor>>,
}

impl SensorReadingService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every enabled sensor described by `config`.
    ///
    /// Each enabled analog sensor needs a model in `calibration`. The
    /// temperature probe is discovered under `bus.w1_devices_dir`.
    ///
    /// # Errors
    ///
    /// - `CalibrationLoad`: an enabled analog sensor has no model
    /// - `HardwareIo`: temperature is enabled but no DS18B20 is present
    pub fn from_config<D>(
        config: &Config,
        adc: SharedAdc<D>,
        calibration: &CalibrationSet,
    ) -> Result<Self>
    where
        D: AdcDevice + 'static,
    {
        let mut service = Self::new();

        for (kind, sensor, channel) in config.sensors.analog() {
            if !sensor.enabled {
                info!("{} sensor disabled", kind);
                continue;
            }

            let model = calibration.get(kind.key()).cloned().ok_or_else(|| {
                AquasenseError::CalibrationLoad(format!("No calibration model for {}", kind))
            })?;

            let analog = AnalogSensor::new(kind, Arc::clone(&adc), channel, sensor.params(), model)
                .with_temperature_compensation(sensor.temperature_compensation);
            info!("{} sensor on ADS1115 channel {}", kind, channel);
            service.register(analog);
        }

        if config.temperature.enabled {
            let probe = TemperatureProbe::discover(
                Path::new(&config.bus.w1_devices_dir),
                config.temperature.poll_delay(),
                config.temperature.max_polls,
            )?;
            service.register(probe);
        } else {
            info!("temperature sensor disabled");
        }

        Ok(service)
    }

    /// Add or replace the sensor for its kind
    pub fn register<S: Sensor + 'static>(&mut self, sensor: S) {
        self.sensors.insert(sensor.kind(), Arc::new(sensor));
    }

    /// Add or replace a sensor that is also held elsewhere
    pub fn register_shared(&mut self, sensor: Arc<dyn Sensor>) {
        self.sensors.insert(sensor.kind(), sensor);
    }

    /// Registered kinds, in `SensorKind` order
    pub fn kinds(&self) -> impl Iterator<Item = SensorKind> + '_ {
        self.sensors.keys().copied()
    }

    #[must_use]
    pub fn contains(&self, kind: SensorKind) -> bool {
        self.sensors.contains_key(&kind)
    }

    /// Shared handle to one sensor, for reading off the async runtime
    #[must_use]
    pub fn sensor(&self, kind: SensorKind) -> Option<Arc<dyn Sensor>> {
        self.sensors.get(&kind).cloned()
    }

    /// Read one sensor without compensation inputs.
    ///
    /// Blocks for the whole acquisition.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSensor` if `kind` is not registered. Hardware trouble
    /// is reported as a reading without a value, never as an error.
    pub fn read(&self, kind: SensorKind) -> Result<SensorReading> {
        self.read_with(kind, &Conditions::default())
    }

    /// Read one sensor using conditions measured earlier in the cycle
    ///
    /// # Errors
    ///
    /// Returns `UnknownSensor` if `kind` is not registered.
    pub fn read_with(&self, kind: SensorKind, conditions: &Conditions) -> Result<SensorReading> {
        self.sensors
            .get(&kind)
            .map(|sensor| sensor.read(conditions))
            .ok_or_else(|| AquasenseError::UnknownSensor(kind.to_string()))
    }

    /// Read a sensor by name, as accepted by `SensorKind::from_str`
    ///
    /// # Errors
    ///
    /// Returns `UnknownSensor` for an unrecognized or unregistered name.
    pub fn read_named(&self, name: &str) -> Result<SensorReading> {
        let kind: SensorKind = name.parse()?;
        self.read(kind)
    }

    /// Read every registered sensor sequentially.
    ///
    /// Temperature is read first so TDS compensation can use it.
    pub fn read_all(&self) -> Vec<SensorReading> {
        let mut readings = Vec::with_capacity(self.sensors.len());
        let mut conditions = Conditions::default();

        if let Some(probe) = self.sensors.get(&SensorKind::Temperature) {
            let reading = probe.read(&conditions);
            conditions.water_temperature = reading.value;
            readings.push(reading);
        }

        for (kind, sensor) in &self.sensors {
            if *kind != SensorKind::Temperature {
                readings.push(sensor.read(&conditions));
            }
        }

        readings
    }
}
