//! # DS18B20 Temperature Probe
//!
//! Reads water temperature from the Linux 1-Wire sysfs interface.
//!
//! ## Device File
//!
//! Each DS18B20 appears as `/sys/bus/w1/devices/28-xxxxxxxxxxxx/w1_slave`:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line ends in `YES` once the CRC check passed. The second line
//! carries the temperature in millidegrees after `t=`. Until the device is
//! ready the file is polled again after a short delay, up to a fixed number
//! of polls.
//!
//! The bus kernel modules (`w1-gpio`, `w1-therm`) must already be loaded.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Conditions, Sensor, SensorKind, SensorReading};
use crate::acquisition::AcquisitionDiagnostics;
use crate::error::{AquasenseError, Result};

/// Default sysfs directory of 1-Wire devices
pub const DEFAULT_DEVICES_DIR: &str = "/sys/bus/w1/devices";

/// DS18B20 family code prefix
const DS18B20_FAMILY_PREFIX: &str = "28";

/// Delay between readiness polls
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_millis(200);

/// Polls before the read is given up
pub const DEFAULT_MAX_POLLS: u32 = 10;

/// Parsed state of one `w1_slave` read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum W1Frame {
    /// CRC line missing or not `YES` yet
    NotReady,
    /// Temperature in °C
    Celsius(f64),
    /// CRC passed but no usable `t=` value
    Malformed,
}

/// Parse the contents of a `w1_slave` file.
#[must_use]
pub fn parse_w1_slave(contents: &str) -> W1Frame {
    let mut lines = contents.lines();

    let crc_ok = lines
        .next()
        .map(|line| line.trim_end().ends_with("YES"))
        .unwrap_or(false);
    if !crc_ok {
        return W1Frame::NotReady;
    }

    let Some(data) = lines.next() else {
        return W1Frame::Malformed;
    };

    match data.find("t=") {
        Some(pos) => match data[pos + 2..].trim().parse::<f64>() {
            Ok(millidegrees) => W1Frame::Celsius(millidegrees / 1000.0),
            Err(_) => W1Frame::Malformed,
        },
        None => W1Frame::Malformed,
    }
}

/// Find the first DS18B20 device file under `devices_dir`.
///
/// Entries are sorted so the choice is stable when several probes are
/// attached.
///
/// # Errors
///
/// Returns `HardwareIo` if the directory cannot be read or holds no
/// DS18B20.
pub fn discover_device_file(devices_dir: &Path) -> Result<PathBuf> {
    let mut entries: Vec<_> = fs::read_dir(devices_dir)
        .map_err(|e| {
            AquasenseError::HardwareIo(format!("Failed to read {}: {}", devices_dir.display(), e))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AquasenseError::HardwareIo(format!("Failed to read directory entry: {}", e)))?;

    entries.sort_by_key(|entry| entry.path());

    entries
        .iter()
        .find(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(DS18B20_FAMILY_PREFIX))
                .unwrap_or(false)
        })
        .map(|entry| entry.path().join("w1_slave"))
        .ok_or_else(|| {
            AquasenseError::HardwareIo(format!(
                "No DS18B20 temperature sensor found in {}",
                devices_dir.display()
            ))
        })
}

/// DS18B20 probe bound to one `w1_slave` file.
#[derive(Debug, Clone)]
pub struct TemperatureProbe {
    device_file: PathBuf,
    poll_delay: Duration,
    max_polls: u32,
}

impl TemperatureProbe {
    /// Probe reading `device_file` directly
    pub fn new(device_file: impl Into<PathBuf>, poll_delay: Duration, max_polls: u32) -> Self {
        Self {
            device_file: device_file.into(),
            poll_delay,
            max_polls: max_polls.max(1),
        }
    }

    /// Bind to the first DS18B20 found under `devices_dir`
    ///
    /// # Errors
    ///
    /// Returns `HardwareIo` when no device is present.
    pub fn discover(devices_dir: &Path, poll_delay: Duration, max_polls: u32) -> Result<Self> {
        let device_file = discover_device_file(devices_dir)?;
        info!("Found DS18B20 at {}", device_file.display());
        Ok(Self::new(device_file, poll_delay, max_polls))
    }

    pub fn device_file(&self) -> &Path {
        &self.device_file
    }

    /// Poll the device until it reports a temperature.
    ///
    /// Returns the temperature (if any) and the number of polls used.
    pub fn read_celsius(&self) -> (Option<f64>, u32) {
        for poll in 1..=self.max_polls {
            let frame = match fs::read_to_string(&self.device_file) {
                Ok(contents) => parse_w1_slave(&contents),
                Err(e) => {
                    debug!("Failed to read {}: {}", self.device_file.display(), e);
                    W1Frame::NotReady
                }
            };

            match frame {
                W1Frame::Celsius(celsius) => return (Some(celsius), poll),
                W1Frame::Malformed => {
                    warn!("Malformed w1_slave data in {}", self.device_file.display());
                    return (None, poll);
                }
                W1Frame::NotReady if poll < self.max_polls => thread::sleep(self.poll_delay),
                W1Frame::NotReady => {}
            }
        }

        warn!(
            "DS18B20 at {} not ready after {} polls",
            self.device_file.display(),
            self.max_polls
        );
        (None, self.max_polls)
    }
}

impl Sensor for TemperatureProbe {
    fn kind(&self) -> SensorKind {
        SensorKind::Temperature
    }

    fn read(&self, _conditions: &Conditions) -> SensorReading {
        let (value, polls) = self.read_celsius();
        SensorReading {
            sensor: SensorKind::Temperature,
            value,
            diagnostics: AcquisitionDiagnostics {
                mean_voltage: None,
                relative_stdev: None,
                success_rate: if value.is_some() { 1.0 } else { 0.0 },
                attempts_used: polls,
                accepted: value.is_some(),
            },
        }
    }
}
