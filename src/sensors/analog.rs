//! Analog sensor: one ADS1115 channel, stabilized acquisition, calibration.

use std::sync::PoisonError;

use tracing::{debug, warn};

use super::{Conditions, Sensor, SensorKind, SensorReading};
use crate::acquisition::{AcquisitionController, AcquisitionParams};
use crate::adc::{AdcDevice, SharedAdc};
use crate::calibration::CalibrationModel;

/// Conductivity change per °C relative to 25 °C.
pub const TDS_TEMPERATURE_COEFFICIENT: f64 = 0.02;

/// Reference temperature for TDS compensation.
pub const TDS_REFERENCE_CELSIUS: f64 = 25.0;

/// Refer a measured TDS probe voltage back to 25 °C.
///
/// Returns the voltage unchanged if the compensation factor is not positive.
#[must_use]
pub fn compensate_tds_voltage(voltage: f64, water_celsius: f64) -> f64 {
    let factor = 1.0 + TDS_TEMPERATURE_COEFFICIENT * (water_celsius - TDS_REFERENCE_CELSIUS);
    if factor > 0.0 {
        voltage / factor
    } else {
        voltage
    }
}

/// A sensor wired to one channel of a shared ADS1115.
pub struct AnalogSensor<D: AdcDevice> {
    kind: SensorKind,
    adc: SharedAdc<D>,
    channel: u8,
    params: AcquisitionParams,
    model: CalibrationModel,
    controller: AcquisitionController,
    temperature_compensation: bool,
}

impl<D: AdcDevice> AnalogSensor<D> {
    pub fn new(
        kind: SensorKind,
        adc: SharedAdc<D>,
        channel: u8,
        params: AcquisitionParams,
        model: CalibrationModel,
    ) -> Self {
        Self {
            kind,
            adc,
            channel,
            params,
            model,
            controller: AcquisitionController::new(),
            temperature_compensation: false,
        }
    }

    /// Divide the accepted voltage by the temperature factor before
    /// calibration, when a water temperature is available.
    #[must_use]
    pub fn with_temperature_compensation(mut self, enabled: bool) -> Self {
        self.temperature_compensation = enabled;
        self
    }

    #[must_use]
    pub fn channel(&self) -> u8 {
        self.channel
    }

    #[must_use]
    pub fn params(&self) -> &AcquisitionParams {
        &self.params
    }
}

impl<D: AdcDevice> Sensor for AnalogSensor<D> {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn read(&self, conditions: &Conditions) -> SensorReading {
        // The converter holds only configuration state, so a panic elsewhere
        // while locked leaves nothing to repair.
        let mut adc = self.adc.lock().unwrap_or_else(PoisonError::into_inner);
        let result = self
            .controller
            .acquire(&mut adc.channel(self.channel), &self.params);
        drop(adc);

        let diagnostics = *result.diagnostics();
        let value = result.voltage().map(|voltage| {
            let voltage = match (self.temperature_compensation, conditions.water_temperature) {
                (true, Some(celsius)) => compensate_tds_voltage(voltage, celsius),
                _ => voltage,
            };
            self.model.apply(voltage)
        });

        match value {
            Some(v) => debug!(
                "{} = {:.3} {} (rsd {:?}, attempts {})",
                self.kind,
                v,
                self.kind.unit(),
                diagnostics.relative_stdev,
                diagnostics.attempts_used
            ),
            None => warn!(
                "{} on channel {} produced no value (success rate {:.2}, rsd {:?})",
                self.kind, self.channel, diagnostics.success_rate, diagnostics.relative_stdev
            ),
        }

        SensorReading {
            sensor: self.kind,
            value,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::mocks::MockAdc;
    use std::time::Duration;

    fn fast_params() -> AcquisitionParams {
        AcquisitionParams {
            num_samples: 20,
            sampling_interval: Duration::ZERO,
            tolerance: 0.01,
            max_attempts: 3,
        }
    }

    #[test]
    fn test_reading_applies_calibration() {
        let adc = MockAdc::new([1.5, 0.0, 0.0, 0.0]).shared();
        let model = CalibrationModel::new("ph", vec![2.0, -1.0], 1).unwrap();
        let sensor = AnalogSensor::new(SensorKind::Ph, adc, 0, fast_params(), model);

        let reading = sensor.read(&Conditions::default());

        assert_eq!(reading.sensor, SensorKind::Ph);
        let value = reading.value.unwrap();
        assert!((value - 2.0).abs() < 1e-12);
        assert!(reading.diagnostics.accepted);
        assert_eq!(reading.diagnostics.attempts_used, 1);
    }

    #[test]
    fn test_reads_its_own_channel() {
        let adc = MockAdc::new([0.5, 1.0, 2.0, 3.0]).shared();
        let sensor = AnalogSensor::new(
            SensorKind::Tds,
            adc,
            2,
            fast_params(),
            CalibrationModel::identity("total_dissolved_solids"),
        );

        let value = sensor.read(&Conditions::default()).value.unwrap();
        assert!((value - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_zero_voltage_yields_no_value() {
        let adc = MockAdc::new([0.0; 4]).shared();
        let sensor = AnalogSensor::new(
            SensorKind::Turbidity,
            adc,
            1,
            fast_params(),
            CalibrationModel::identity("turbidity"),
        );

        let reading = sensor.read(&Conditions::default());
        assert_eq!(reading.value, None);
        assert!(!reading.diagnostics.accepted);
        assert_eq!(reading.diagnostics.attempts_used, 3);
    }

    #[test]
    fn test_bus_failures_yield_no_value() {
        let adc = MockAdc::new([1.0; 4]);
        adc.set_fail_every(1);
        let sensor = AnalogSensor::new(
            SensorKind::Ph,
            adc.shared(),
            0,
            fast_params(),
            CalibrationModel::identity("ph"),
        );

        let reading = sensor.read(&Conditions::default());
        assert_eq!(reading.value, None);
        assert_eq!(reading.diagnostics.success_rate, 0.0);
        assert_eq!(reading.diagnostics.mean_voltage, None);
    }

    #[test]
    fn test_temperature_compensation() {
        let adc = MockAdc::new([0.0, 0.0, 1.2, 0.0]).shared();
        let sensor = AnalogSensor::new(
            SensorKind::Tds,
            adc,
            2,
            fast_params(),
            CalibrationModel::identity("total_dissolved_solids"),
        )
        .with_temperature_compensation(true);

        let warm = Conditions {
            water_temperature: Some(35.0),
        };
        let value = sensor.read(&warm).value.unwrap();
        assert!((value - 1.0).abs() < 1e-3);

        // No temperature available: uncompensated
        let value = sensor.read(&Conditions::default()).value.unwrap();
        assert!((value - 1.2).abs() < 1e-3);
    }

    #[test]
    fn test_compensation_disabled_ignores_temperature() {
        let adc = MockAdc::new([0.0, 0.0, 1.2, 0.0]).shared();
        let sensor = AnalogSensor::new(
            SensorKind::Tds,
            adc,
            2,
            fast_params(),
            CalibrationModel::identity("total_dissolved_solids"),
        );
        let warm = Conditions {
            water_temperature: Some(35.0),
        };
        let value = sensor.read(&warm).value.unwrap();
        assert!((value - 1.2).abs() < 1e-3);
    }

    #[test]
    fn test_compensate_tds_voltage() {
        assert_eq!(compensate_tds_voltage(1.0, 25.0), 1.0);
        assert!((compensate_tds_voltage(1.1, 30.0) - 1.0).abs() < 1e-12);
        assert!((compensate_tds_voltage(0.9, 20.0) - 1.0).abs() < 1e-12);
        // Non-physical factor leaves the voltage alone
        assert_eq!(compensate_tds_voltage(1.0, -30.0), 1.0);
    }
}
