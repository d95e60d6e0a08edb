//! # Telemetry Module
//!
//! Ships each sampling cycle's measurements off the sensor path.
//!
//! This module handles:
//! - The [`TelemetrySample`] record shared by every sink
//! - Append-only CSV logging on local storage
//! - Uploading samples to the remote ingestion endpoint with retries
//!
//! Absent measurements stay absent in every sink: an empty CSV field or a
//! JSON `null`, never a substituted number.

pub mod csv_log;
pub mod upload;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sensors::{SensorKind, SensorReading};

pub use csv_log::CsvLogger;
pub use upload::{HttpTransport, RetryPolicy, SampleTransport, Uploader};

/// One sampling cycle, as logged and uploaded.
///
/// Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub device_id: String,
    /// Wall-clock time the cycle started (RFC 3339, UTC)
    pub measured_at: DateTime<Utc>,
    /// Seconds since the sampler started
    pub uptime: f64,
    pub turbidity: Option<f64>,
    pub temperature: Option<f64>,
    pub total_dissolved_solids: Option<f64>,
    pub ph: Option<f64>,
}

impl TelemetrySample {
    /// Assemble a sample from a cycle's readings. Kinds without a reading
    /// are absent.
    pub fn from_readings(
        device_id: impl Into<String>,
        measured_at: DateTime<Utc>,
        uptime: f64,
        readings: &[SensorReading],
    ) -> Self {
        let value = |kind: SensorKind| {
            readings
                .iter()
                .find(|reading| reading.sensor == kind)
                .and_then(|reading| reading.value)
        };

        Self {
            device_id: device_id.into(),
            measured_at,
            uptime,
            turbidity: value(SensorKind::Turbidity),
            temperature: value(SensorKind::Temperature),
            total_dissolved_solids: value(SensorKind::Tds),
            ph: value(SensorKind::Ph),
        }
    }

    /// Value for one sensor kind
    #[must_use]
    pub fn value(&self, kind: SensorKind) -> Option<f64> {
        match kind {
            SensorKind::Ph => self.ph,
            SensorKind::Turbidity => self.turbidity,
            SensorKind::Tds => self.total_dissolved_solids,
            SensorKind::Temperature => self.temperature,
        }
    }
}
