//! # Stability Estimator
//!
//! Decides whether a batch of voltage samples is trustworthy.
//!
//! ## Relative Standard Deviation
//!
//! `rsd = stdev / |mean|`, with `stdev` using the unbiased (n − 1)
//! estimator. The ratio is undefined near zero, so when `|mean| <= 1e-6` the
//! RSD is `+inf` and the batch can never be stable. A batch with fewer than
//! two samples has no measurable spread and is treated the same way.
//!
//! A batch is stable iff `rsd <= tolerance`.
//!
//! ## Usage
//!
//! ```
//! use aquasense::acquisition::stability::StabilityEstimator;
//!
//! let estimator = StabilityEstimator::new(0.01);
//! let stats = estimator.estimate(&[1.00, 1.01, 0.99, 1.00, 1.00]);
//! assert!(estimator.is_stable(&stats));
//! ```

/// Means at or below this magnitude make the RSD undefined.
pub const MEAN_EPSILON: f64 = 1e-6;

/// Default stability tolerance (1% RSD).
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Summary statistics of one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchStatistics {
    /// Arithmetic mean, in volts
    pub mean: f64,
    /// Sample standard deviation (n − 1), in volts
    pub stdev: f64,
    /// `stdev / |mean|`, or `+inf` when undefined
    pub relative_stdev: f64,
}

/// Classifies batches as stable or unstable against a relative tolerance.
#[derive(Debug, Clone, Copy)]
pub struct StabilityEstimator {
    tolerance: f64,
}

impl Default for StabilityEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl StabilityEstimator {
    /// Creates an estimator with the given RSD tolerance.
    #[must_use]
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Returns the configured tolerance.
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Computes mean, stdev and RSD of `batch`.
    ///
    /// An empty batch yields a NaN mean and infinite RSD.
    #[must_use]
    pub fn estimate(&self, batch: &[f64]) -> BatchStatistics {
        let n = batch.len();
        if n == 0 {
            return BatchStatistics {
                mean: f64::NAN,
                stdev: f64::NAN,
                relative_stdev: f64::INFINITY,
            };
        }

        // Accumulate around the first sample so a constant batch has an
        // exact mean and zero spread
        let shift = batch[0];
        let mean_offset = batch.iter().map(|v| v - shift).sum::<f64>() / n as f64;
        let mean = shift + mean_offset;

        if n < 2 {
            return BatchStatistics {
                mean,
                stdev: f64::NAN,
                relative_stdev: f64::INFINITY,
            };
        }

        let sum_sq: f64 = batch
            .iter()
            .map(|v| ((v - shift) - mean_offset).powi(2))
            .sum();
        let stdev = (sum_sq / (n - 1) as f64).sqrt();

        let relative_stdev = if mean.abs() > MEAN_EPSILON {
            stdev / mean.abs()
        } else {
            f64::INFINITY
        };

        BatchStatistics {
            mean,
            stdev,
            relative_stdev,
        }
    }

    /// Stable iff `relative_stdev <= tolerance`.
    #[must_use]
    pub fn is_stable(&self, stats: &BatchStatistics) -> bool {
        stats.relative_stdev <= self.tolerance
    }
}
