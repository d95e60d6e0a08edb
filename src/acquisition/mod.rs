//! # Acquisition Module
//!
//! Stabilized analog acquisition.
//!
//! This module handles:
//! - Drawing fixed-size sample batches from a [`VoltageSampler`](crate::adc::VoltageSampler)
//! - Counting swallowed I/O failures into a success rate
//! - Statistical acceptance of a batch (relative standard deviation)
//! - Bounded whole-batch retries

pub mod controller;
pub mod stability;

use std::time::Duration;

use serde::{Serialize, Serializer};

pub use controller::AcquisitionController;
pub use stability::{BatchStatistics, StabilityEstimator};

/// Default batch size
pub const DEFAULT_NUM_SAMPLES: usize = 200;

/// Default spacing between samples
pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_millis(10);

/// Default number of whole-batch attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Parameters of one acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionParams {
    /// Samples drawn per attempt
    pub num_samples: usize,
    /// Delay between consecutive samples
    pub sampling_interval: Duration,
    /// Maximum accepted relative stdev
    pub tolerance: f64,
    /// Attempts before giving up (at least one is always made)
    pub max_attempts: u32,
}

impl Default for AcquisitionParams {
    fn default() -> Self {
        Self {
            num_samples: DEFAULT_NUM_SAMPLES,
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            tolerance: stability::DEFAULT_TOLERANCE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// What one acquisition observed.
///
/// Produced for accepted and rejected acquisitions alike. `mean_voltage` and
/// `relative_stdev` are absent when stability was never computed (too few
/// samples collected) or when there is no measurement at all. An undefined
/// RSD (mean near zero) is present and infinite; JSON carries it as `"inf"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AcquisitionDiagnostics {
    pub mean_voltage: Option<f64>,
    #[serde(serialize_with = "serialize_unbounded")]
    pub relative_stdev: Option<f64>,
    /// Fraction of requested samples read without I/O error, in [0, 1]
    pub success_rate: f64,
    pub attempts_used: u32,
    pub accepted: bool,
}

/// Outcome of an acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AcquisitionResult {
    /// A stable batch was found; `voltage` is its mean
    Accepted {
        voltage: f64,
        diagnostics: AcquisitionDiagnostics,
    },
    /// Every attempt failed; diagnostics are from the last attempt
    Rejected { diagnostics: AcquisitionDiagnostics },
}

impl AcquisitionResult {
    /// Diagnostics of either variant
    #[must_use]
    pub fn diagnostics(&self) -> &AcquisitionDiagnostics {
        match self {
            AcquisitionResult::Accepted { diagnostics, .. } => diagnostics,
            AcquisitionResult::Rejected { diagnostics } => diagnostics,
        }
    }

    /// Accepted voltage, if any
    #[must_use]
    pub fn voltage(&self) -> Option<f64> {
        match self {
            AcquisitionResult::Accepted { voltage, .. } => Some(*voltage),
            AcquisitionResult::Rejected { .. } => None,
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcquisitionResult::Accepted { .. })
    }
}

/// JSON has no infinities; write non-finite values as strings instead of
/// letting them collapse into `null`.
fn serialize_unbounded<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        None => serializer.serialize_none(),
        Some(v) if v.is_finite() => serializer.serialize_some(v),
        Some(v) if v.is_nan() => serializer.serialize_some("nan"),
        Some(v) if *v > 0.0 => serializer.serialize_some("inf"),
        Some(_) => serializer.serialize_some("-inf"),
    }
}
