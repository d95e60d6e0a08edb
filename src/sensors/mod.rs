//! # Sensors Module
//!
//! Logical water-quality sensors behind one `read() -> SensorReading` shape.
//!
//! This module handles:
//! - Analog sensors (pH, turbidity, TDS): stabilized ADC acquisition followed
//!   by polynomial calibration
//! - The DS18B20 temperature probe on the 1-Wire bus
//! - [`SensorReadingService`], which owns every registered sensor
//!
//! A reading's `value` is `None` when acquisition failed. It is never
//! replaced by a default number.

pub mod analog;
pub mod service;
pub mod temperature;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::acquisition::AcquisitionDiagnostics;
use crate::error::AquasenseError;

pub use analog::AnalogSensor;
pub use service::SensorReadingService;
pub use temperature::TemperatureProbe;

/// Which physical bus a sensor is acquired over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusKind {
    /// ADS1115 on I2C
    Adc,
    /// DS18B20 on 1-Wire
    OneWire,
}

/// The sensors a device can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Ph,
    Turbidity,
    #[serde(rename = "total_dissolved_solids")]
    Tds,
    Temperature,
}

impl SensorKind {
    /// Every sensor kind, in report order.
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Turbidity,
        SensorKind::Temperature,
        SensorKind::Tds,
        SensorKind::Ph,
    ];

    /// Key used in the calibration file and the telemetry payload.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            SensorKind::Ph => "ph",
            SensorKind::Turbidity => "turbidity",
            SensorKind::Tds => "total_dissolved_solids",
            SensorKind::Temperature => "temperature",
        }
    }

    /// Unit of the calibrated value.
    #[must_use]
    pub fn unit(self) -> &'static str {
        match self {
            SensorKind::Ph => "pH",
            SensorKind::Turbidity => "NTU",
            SensorKind::Tds => "ppm",
            SensorKind::Temperature => "°C",
        }
    }

    #[must_use]
    pub fn bus(self) -> BusKind {
        match self {
            SensorKind::Temperature => BusKind::OneWire,
            _ => BusKind::Adc,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SensorKind {
    type Err = AquasenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ph" => Ok(SensorKind::Ph),
            "turbidity" => Ok(SensorKind::Turbidity),
            "tds" | "total_dissolved_solids" => Ok(SensorKind::Tds),
            "temperature" => Ok(SensorKind::Temperature),
            _ => Err(AquasenseError::UnknownSensor(s.to_string())),
        }
    }
}

/// One acquisition cycle's result for one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading {
    pub sensor: SensorKind,
    /// Physical value, absent when acquisition failed
    pub value: Option<f64>,
    pub diagnostics: AcquisitionDiagnostics,
}

/// Conditions measured earlier in the same cycle, used for compensation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Conditions {
    /// Water temperature in °C
    pub water_temperature: Option<f64>,
}

/// A readable sensor.
///
/// `read` blocks for the whole acquisition and never fails: an unusable
/// acquisition is a reading with no value.
pub trait Sensor: Send + Sync {
    fn kind(&self) -> SensorKind;

    fn read(&self, conditions: &Conditions) -> SensorReading;
}
