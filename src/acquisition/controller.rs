//! # Acquisition Controller
//!
//! Repeats whole sample batches until one is stable or the attempt budget
//! runs out.
//!
//! ## Attempt
//!
//! 1. Draw `num_samples` voltages, `sampling_interval` apart. A failed read
//!    is counted as missing; the batch continues.
//! 2. `success_rate = collected / num_samples`. Below
//!    [`MIN_SUCCESS_RATE`] the attempt is rejected without looking at
//!    stability.
//! 3. Otherwise the batch is accepted iff the [`StabilityEstimator`] calls
//!    it stable. Acceptance stops the loop.
//!
//! Every attempt starts from an empty batch. A rejected acquisition reports
//! the diagnostics of the last attempt, not the best one.

use std::thread;

use tracing::{debug, warn};

use super::stability::StabilityEstimator;
use super::{AcquisitionDiagnostics, AcquisitionParams, AcquisitionResult};
use crate::adc::VoltageSampler;

/// Minimum fraction of successful reads for a batch to be considered.
pub const MIN_SUCCESS_RATE: f64 = 0.8;

/// Orchestrates sampling attempts against one [`VoltageSampler`].
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionController {
    min_success_rate: f64,
}

impl Default for AcquisitionController {
    fn default() -> Self {
        Self {
            min_success_rate: MIN_SUCCESS_RATE,
        }
    }
}

/// Result of a single attempt.
struct Attempt {
    mean: Option<f64>,
    relative_stdev: Option<f64>,
    success_rate: f64,
    stable: bool,
}

impl AcquisitionController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a stabilized voltage.
    ///
    /// Never fails: hardware errors reduce the success rate and an exhausted
    /// attempt budget is a [`AcquisitionResult::Rejected`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use aquasense::acquisition::{AcquisitionController, AcquisitionParams};
    /// use aquasense::adc::{AdcDevice, Gain, SimulatedAdc};
    ///
    /// let mut adc = SimulatedAdc::new(Gain::One, [1.0, 0.0, 0.0, 0.0]);
    /// let result = AcquisitionController::new()
    ///     .acquire(&mut adc.channel(0), &AcquisitionParams::default());
    /// println!("{:?}", result.voltage());
    /// ```
    pub fn acquire<S>(&self, sampler: &mut S, params: &AcquisitionParams) -> AcquisitionResult
    where
        S: VoltageSampler + ?Sized,
    {
        let estimator = StabilityEstimator::new(params.tolerance);
        let max_attempts = params.max_attempts.max(1);
        let mut batch = Vec::with_capacity(params.num_samples);

        let mut attempt_number = 1;
        loop {
            batch.clear();
            let attempt = self.attempt(sampler, params, &estimator, &mut batch);

            let diagnostics = AcquisitionDiagnostics {
                mean_voltage: attempt.mean,
                relative_stdev: attempt.relative_stdev,
                success_rate: attempt.success_rate,
                attempts_used: attempt_number,
                accepted: attempt.stable,
            };

            if let (true, Some(voltage)) = (attempt.stable, attempt.mean) {
                debug!(
                    "Attempt {}/{} accepted: mean {:.6} V, rsd {:.5}",
                    attempt_number,
                    max_attempts,
                    voltage,
                    attempt.relative_stdev.unwrap_or(f64::NAN)
                );
                return AcquisitionResult::Accepted { voltage, diagnostics };
            }

            debug!(
                "Attempt {}/{} rejected: success rate {:.2}, rsd {:?}",
                attempt_number, max_attempts, attempt.success_rate, attempt.relative_stdev
            );

            if attempt_number >= max_attempts {
                warn!(
                    "Acquisition rejected after {} attempts (success rate {:.2}, rsd {:?})",
                    attempt_number, attempt.success_rate, attempt.relative_stdev
                );
                return AcquisitionResult::Rejected { diagnostics };
            }
            attempt_number += 1;
        }
    }

    fn attempt<S>(
        &self,
        sampler: &mut S,
        params: &AcquisitionParams,
        estimator: &StabilityEstimator,
        batch: &mut Vec<f64>,
    ) -> Attempt
    where
        S: VoltageSampler + ?Sized,
    {
        for index in 0..params.num_samples {
            if index > 0 && !params.sampling_interval.is_zero() {
                thread::sleep(params.sampling_interval);
            }
            match sampler.sample() {
                Ok(volts) => batch.push(volts),
                Err(e) => debug!("Sample {} missed: {}", index, e),
            }
        }

        let success_rate = if params.num_samples == 0 {
            0.0
        } else {
            batch.len() as f64 / params.num_samples as f64
        };

        if success_rate < self.min_success_rate {
            return Attempt {
                mean: None,
                relative_stdev: None,
                success_rate,
                stable: false,
            };
        }

        let stats = estimator.estimate(batch);
        Attempt {
            mean: Some(stats.mean),
            relative_stdev: Some(stats.relative_stdev),
            success_rate,
            stable: estimator.is_stable(&stats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::mocks::ScriptedSampler;
    use std::time::Duration;

    fn params(num_samples: usize, tolerance: f64, max_attempts: u32) -> AcquisitionParams {
        AcquisitionParams {
            num_samples,
            sampling_interval: Duration::ZERO,
            tolerance,
            max_attempts,
        }
    }

    #[test]
    fn test_constant_signal_accepted_on_first_attempt() {
        let mut sampler = ScriptedSampler::constant(1.65);
        let result = AcquisitionController::new().acquire(&mut sampler, &params(200, 0.01, 3));

        match result {
            AcquisitionResult::Accepted { voltage, diagnostics } => {
                assert_eq!(voltage, 1.65);
                assert_eq!(diagnostics.attempts_used, 1);
                assert_eq!(diagnostics.relative_stdev, Some(0.0));
                assert_eq!(diagnostics.success_rate, 1.0);
                assert!(diagnostics.accepted);
            }
            other => panic!("Expected Accepted, got {:?}", other),
        }
        assert_eq!(sampler.calls, 200);
    }

    #[test]
    fn test_reference_window_accepted() {
        let script = [1.00, 1.01, 0.99, 1.00, 1.00].into_iter().map(Some).collect();
        let mut sampler = ScriptedSampler::new(script);
        let result = AcquisitionController::new().acquire(&mut sampler, &params(5, 0.01, 3));

        assert!(result.is_accepted());
        let diagnostics = result.diagnostics();
        assert_eq!(diagnostics.attempts_used, 1);
        assert!((result.voltage().unwrap() - 1.00).abs() < 1e-9);
        assert!((diagnostics.relative_stdev.unwrap() - 0.007_071).abs() < 1e-5);
    }

    #[test]
    fn test_early_exit_after_stable_batch() {
        // First batch noisy, second constant, later samples never drawn
        let mut script: Vec<Option<f64>> = vec![Some(1.0), Some(2.0), Some(1.0), Some(2.0)];
        script.extend(std::iter::repeat(Some(1.5)).take(4));
        let mut sampler = ScriptedSampler::new(script);

        let result = AcquisitionController::new().acquire(&mut sampler, &params(4, 0.01, 3));

        assert!(result.is_accepted());
        assert_eq!(result.diagnostics().attempts_used, 2);
        assert_eq!(sampler.calls, 8);
    }

    #[test]
    fn test_no_carryover_between_attempts() {
        // Attempt 1: [1.0, 3.0] unstable. Attempt 2: [2.0, 2.0] stable.
        // A carried-over window would mix in the first attempt's values.
        let script = vec![Some(1.0), Some(3.0), Some(2.0), Some(2.0)];
        let mut sampler = ScriptedSampler::new(script);

        let result = AcquisitionController::new().acquire(&mut sampler, &params(2, 0.01, 3));

        assert_eq!(result.voltage(), Some(2.0));
        assert_eq!(result.diagnostics().relative_stdev, Some(0.0));
    }

    #[test]
    fn test_all_reads_failing_rejected_after_max_attempts() {
        let mut sampler = ScriptedSampler::failing();
        let result = AcquisitionController::new().acquire(&mut sampler, &params(10, 0.01, 4));

        match result {
            AcquisitionResult::Rejected { diagnostics } => {
                assert_eq!(diagnostics.attempts_used, 4);
                assert_eq!(diagnostics.success_rate, 0.0);
                assert_eq!(diagnostics.mean_voltage, None);
                assert_eq!(diagnostics.relative_stdev, None);
                assert!(!diagnostics.accepted);
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
        assert_eq!(sampler.calls, 40);
    }

    #[test]
    fn test_low_success_rate_skips_stability() {
        // 150 of 200 reads succeed with identical values: tight but starved
        let mut script = Vec::new();
        for i in 0..200 {
            script.push(if i % 4 == 3 { None } else { Some(2.0) });
        }
        let mut sampler = ScriptedSampler::new(script);

        let result = AcquisitionController::new().acquire(&mut sampler, &params(200, 0.01, 1));

        match result {
            AcquisitionResult::Rejected { diagnostics } => {
                assert!((diagnostics.success_rate - 0.75).abs() < 1e-12);
                assert_eq!(diagnostics.mean_voltage, None);
                assert_eq!(diagnostics.relative_stdev, None);
                assert_eq!(diagnostics.attempts_used, 1);
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn test_success_rate_at_threshold_is_considered() {
        // 8 of 10 reads succeed: exactly 0.8 passes the floor
        let script = (0..10)
            .map(|i| if i == 1 || i == 4 { None } else { Some(1.0) })
            .collect();
        let mut sampler = ScriptedSampler::new(script);

        let result = AcquisitionController::new().acquire(&mut sampler, &params(10, 0.01, 1));

        assert!(result.is_accepted());
        assert!((result.diagnostics().success_rate - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_three_unstable_attempts_report_last_diagnostics() {
        // Each attempt has a different spread: the second is the best
        let script = [(1.0, 1.4), (1.0, 1.1), (1.0, 2.0)]
            .into_iter()
            .flat_map(|(first, second)| [Some(first), Some(second)])
            .collect();
        let mut sampler = ScriptedSampler::new(script);

        let result = AcquisitionController::new().acquire(&mut sampler, &params(2, 0.01, 3));

        match result {
            AcquisitionResult::Rejected { diagnostics } => {
                assert_eq!(diagnostics.attempts_used, 3);
                assert!((diagnostics.mean_voltage.unwrap() - 1.5).abs() < 1e-12);
                // stdev of [1.0, 2.0] (n - 1) is sqrt(0.5)
                let expected_rsd = 0.5_f64.sqrt() / 1.5;
                assert!((diagnostics.relative_stdev.unwrap() - expected_rsd).abs() < 1e-12);
                assert!(!diagnostics.accepted);
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_mean_signal_rejected_for_instability() {
        let mut sampler = ScriptedSampler::constant(0.0);
        let result = AcquisitionController::new().acquire(&mut sampler, &params(20, 0.01, 2));

        let diagnostics = *result.diagnostics();
        assert!(!result.is_accepted());
        assert_eq!(diagnostics.attempts_used, 2);
        assert_eq!(diagnostics.success_rate, 1.0);
        assert_eq!(diagnostics.mean_voltage, Some(0.0));
        assert!(diagnostics.relative_stdev.unwrap().is_infinite());
    }

    #[test]
    fn test_zero_max_attempts_still_makes_one_attempt() {
        let mut sampler = ScriptedSampler::failing();
        let result = AcquisitionController::new().acquire(&mut sampler, &params(5, 0.01, 0));
        assert_eq!(result.diagnostics().attempts_used, 1);
        assert_eq!(sampler.calls, 5);
    }

    #[test]
    fn test_zero_samples_is_rejected() {
        let mut sampler = ScriptedSampler::constant(1.0);
        let result = AcquisitionController::new().acquire(&mut sampler, &params(0, 0.01, 2));
        assert!(!result.is_accepted());
        assert_eq!(result.diagnostics().success_rate, 0.0);
        assert_eq!(sampler.calls, 0);
    }

    #[test]
    fn test_sampling_interval_spaces_reads() {
        let mut sampler = ScriptedSampler::constant(1.0);
        let p = AcquisitionParams {
            num_samples: 4,
            sampling_interval: Duration::from_millis(5),
            tolerance: 0.01,
            max_attempts: 1,
        };

        let start = std::time::Instant::now();
        let result = AcquisitionController::new().acquire(&mut sampler, &p);

        assert!(result.is_accepted());
        // Three gaps between four reads
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
