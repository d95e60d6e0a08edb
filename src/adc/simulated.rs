//! Converter stand-in for machines without an ADS1115.

use tracing::info;

use super::ads1115::{raw_to_volts, Gain, CHANNEL_COUNT};
use super::AdcDevice;
use crate::error::{AquasenseError, Result};

/// Reports a fixed voltage per input, quantized like the ADS1115 at the
/// configured gain.
#[derive(Debug, Clone)]
pub struct SimulatedAdc {
    gain: Gain,
    channel_volts: [f64; 4],
}

impl SimulatedAdc {
    pub fn new(gain: Gain, channel_volts: [f64; 4]) -> Self {
        info!("Using simulated ADS1115 (no hardware access)");
        Self { gain, channel_volts }
    }

    /// Every input at half of the positive full scale
    pub fn mid_scale(gain: Gain) -> Self {
        Self::new(gain, [gain.full_scale_volts() / 2.0; 4])
    }
}

impl AdcDevice for SimulatedAdc {
    fn read_voltage(&mut self, channel: u8) -> Result<f64> {
        if channel >= CHANNEL_COUNT {
            return Err(AquasenseError::HardwareIo(format!(
                "Invalid ADS1115 channel {} (must be 0-3)",
                channel
            )));
        }
        let full_scale = self.gain.full_scale_volts();
        let code = (self.channel_volts[usize::from(channel)] / full_scale * 32768.0)
            .round()
            .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
        Ok(raw_to_volts(code, self.gain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_within_one_lsb() {
        let mut adc = SimulatedAdc::new(Gain::TwoThirds, [0.5, 1.25, 2.5, 3.3]);
        let lsb = Gain::TwoThirds.full_scale_volts() / 32768.0;
        for (channel, expected) in [(0, 0.5), (1, 1.25), (2, 2.5), (3, 3.3)] {
            assert!((adc.read_voltage(channel).unwrap() - expected).abs() <= lsb);
        }
    }

    #[test]
    fn test_saturates_above_full_scale() {
        let mut adc = SimulatedAdc::new(Gain::One, [5.0, 0.0, 0.0, 0.0]);
        let volts = adc.read_voltage(0).unwrap();
        assert!((volts - raw_to_volts(i16::MAX, Gain::One)).abs() < 1e-9);
    }

    #[test]
    fn test_mid_scale() {
        let mut adc = SimulatedAdc::mid_scale(Gain::TwoThirds);
        assert!((adc.read_voltage(3).unwrap() - 3.072).abs() < 1e-3);
    }

    #[test]
    fn test_invalid_channel() {
        let mut adc = SimulatedAdc::mid_scale(Gain::One);
        assert!(adc.read_voltage(4).is_err());
    }
}
