//! # Calibration Module
//!
//! Maps a stabilized sensor voltage to a physical quantity with a polynomial
//! fitted offline by the calibration tool.
//!
//! ## Polynomial
//!
//! Coefficients are stored highest degree first, like `numpy.polyfit`:
//!
//! `value = c[0] * v^d + c[1] * v^(d-1) + ... + c[d]`
//!
//! and evaluated with Horner's rule. A model always satisfies
//! `coefficients.len() == degree + 1`.
//!
//! ## File Format
//!
//! ```json
//! {
//!     "ph": { "coeffs": [-5.14, 20.4], "degree": 1, "log": "data/calibration-logs/ph.csv" },
//!     "turbidity": { "coeffs": [200.0, 0.0], "degree": 1, "log": "" }
//! }
//! ```
//!
//! ## Usage
//!
//! ```
//! use aquasense::calibration::CalibrationModel;
//!
//! let model = CalibrationModel::new("ph", vec![2.0, -1.0], 1)?;
//! assert_eq!(model.apply(1.5), 2.0);
//! # Ok::<(), aquasense::error::AquasenseError>(())
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{AquasenseError, Result};

/// Calibration polynomial for one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationModel {
    sensor: String,
    coefficients: Vec<f64>,
    degree: usize,
    log: Option<String>,
}

impl CalibrationModel {
    /// Creates a model, checking the coefficient count against the degree.
    ///
    /// # Errors
    ///
    /// Returns `CalibrationLoad` if `coefficients.len() != degree + 1` or a
    /// coefficient is not finite.
    pub fn new(sensor: impl Into<String>, coefficients: Vec<f64>, degree: usize) -> Result<Self> {
        let sensor = sensor.into();

        if coefficients.len() != degree + 1 {
            return Err(AquasenseError::CalibrationLoad(format!(
                "{}: degree {} needs {} coefficients, found {}",
                sensor,
                degree,
                degree + 1,
                coefficients.len()
            )));
        }

        if let Some(bad) = coefficients.iter().find(|c| !c.is_finite()) {
            return Err(AquasenseError::CalibrationLoad(format!(
                "{}: coefficient {} is not finite",
                sensor, bad
            )));
        }

        Ok(Self {
            sensor,
            coefficients,
            degree,
            log: None,
        })
    }

    /// The identity polynomial `v`, for uncalibrated bring-up
    #[must_use]
    pub fn identity(sensor: impl Into<String>) -> Self {
        Self {
            sensor: sensor.into(),
            coefficients: vec![1.0, 0.0],
            degree: 1,
            log: None,
        }
    }

    /// Attach the path of the sample log the model was fitted from
    #[must_use]
    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        let log = log.into();
        self.log = if log.is_empty() { None } else { Some(log) };
        self
    }

    #[must_use]
    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    /// Coefficients, highest degree first.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    #[must_use]
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Calibration sample log recorded by the calibration tool.
    #[must_use]
    pub fn log(&self) -> Option<&str> {
        self.log.as_deref()
    }

    /// Evaluates the polynomial at `voltage`.
    ///
    /// Pure: the same model and voltage always produce the same bits.
    #[must_use]
    pub fn apply(&self, voltage: f64) -> f64 {
        self.coefficients
            .iter()
            .fold(0.0, |acc, &c| acc * voltage + c)
    }
}

/// Persisted shape of one calibration entry.
#[derive(Debug, Deserialize)]
struct CalibrationEntry {
    coeffs: Vec<f64>,
    degree: usize,
    #[serde(default)]
    log: String,
}

/// Calibration models for every sensor in the calibration file.
#[derive(Debug, Clone, Default)]
pub struct CalibrationSet {
    models: BTreeMap<String, CalibrationModel>,
}

impl CalibrationSet {
    /// Load calibration from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - Calibration file written by the calibration tool
    /// * `required` - Sensor keys that must be present
    ///
    /// # Errors
    ///
    /// Returns `CalibrationLoad` if the file cannot be read or parsed, a
    /// required sensor is missing, or an entry is inconsistent.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use aquasense::calibration::CalibrationSet;
    ///
    /// let set = CalibrationSet::load("data/calibration.json", &["ph", "turbidity"])?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P, required: &[&str]) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            AquasenseError::CalibrationLoad(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let set = Self::from_json(&contents, required)?;
        info!("Loaded {} calibration model(s) from {}", set.len(), path.display());
        Ok(set)
    }

    /// Parse calibration JSON. See [`CalibrationSet::load`].
    pub fn from_json(contents: &str, required: &[&str]) -> Result<Self> {
        let entries: BTreeMap<String, CalibrationEntry> = serde_json::from_str(contents)
            .map_err(|e| AquasenseError::CalibrationLoad(format!("Malformed calibration file: {}", e)))?;

        let mut models = BTreeMap::new();
        for (sensor, entry) in entries {
            let model = CalibrationModel::new(sensor.as_str(), entry.coeffs, entry.degree)?
                .with_log(entry.log);
            debug!("Calibration for {}: {:?} (degree {})", sensor, model.coefficients(), model.degree());
            models.insert(sensor, model);
        }

        let set = Self { models };
        for sensor in required {
            if set.get(sensor).is_none() {
                return Err(AquasenseError::CalibrationLoad(format!(
                    "No calibration for sensor '{}'",
                    sensor
                )));
            }
        }

        Ok(set)
    }

    /// Model for `sensor`, if calibrated.
    #[must_use]
    pub fn get(&self, sensor: &str) -> Option<&CalibrationModel> {
        self.models.get(sensor)
    }

    /// Add or replace a model.
    pub fn insert(&mut self, model: CalibrationModel) {
        self.models.insert(model.sensor().to_string(), model);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
