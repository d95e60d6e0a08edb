//! # ADC Module
//!
//! Analog voltage acquisition through an ADS1115 on the I2C bus.
//!
//! This module handles:
//! - The [`VoltageSampler`] boundary used by the acquisition controller
//! - The [`AdcDevice`] seam between sensors and a converter
//! - The `ads1x1x`-backed ADS1115 and a simulated converter for
//!   development machines
//!
//! The ADC is a shared, non-reentrant resource. It is owned through a
//! [`SharedAdc`] handle and an acquisition keeps the lock for its whole
//! batch sequence.

pub mod ads1115;
pub mod simulated;

use std::sync::{Arc, Mutex};

use crate::error::Result;

pub use ads1115::{Ads1115, Gain};
pub use simulated::SimulatedAdc;

/// Converter handle shared between the analog sensors of one bus.
pub type SharedAdc<D> = Arc<Mutex<D>>;

/// Source of single voltage readings from one analog channel.
///
/// Each call performs one physical bus transaction. Implementations must not
/// retry internally; retry policy belongs to the acquisition controller.
pub trait VoltageSampler {
    /// Read one voltage, in volts.
    ///
    /// # Errors
    ///
    /// Returns `HardwareIo` if the transport cannot be read.
    fn sample(&mut self) -> Result<f64>;
}

/// Multi-channel analog-to-digital converter
pub trait AdcDevice: Send {
    /// One conversion on `channel`, in volts
    ///
    /// # Errors
    ///
    /// Returns `HardwareIo` on an invalid channel or a failed conversion.
    fn read_voltage(&mut self, channel: u8) -> Result<f64>;

    /// Borrow one input as a [`VoltageSampler`]
    fn channel(&mut self, channel: u8) -> AdcChannel<'_, Self> {
        AdcChannel { adc: self, channel }
    }
}

/// One converter input, borrowed for the span of an acquisition
pub struct AdcChannel<'a, D: ?Sized> {
    adc: &'a mut D,
    channel: u8,
}

impl<D: AdcDevice + ?Sized> VoltageSampler for AdcChannel<'_, D> {
    fn sample(&mut self) -> Result<f64> {
        self.adc.read_voltage(self.channel)
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::AquasenseError;
    use std::collections::VecDeque;

    /// Replays a scripted sequence of readings. `None` entries fail with an
    /// I/O error. Once the script runs out the last entry repeats.
    pub struct ScriptedSampler {
        script: VecDeque<Option<f64>>,
        last: Option<f64>,
        pub calls: usize,
    }

    impl ScriptedSampler {
        pub fn new(script: Vec<Option<f64>>) -> Self {
            Self {
                script: script.into(),
                last: None,
                calls: 0,
            }
        }

        /// Every read returns `value`.
        pub fn constant(value: f64) -> Self {
            Self::new(vec![Some(value)])
        }

        /// Every read fails.
        pub fn failing() -> Self {
            Self::new(vec![None])
        }
    }

    impl VoltageSampler for ScriptedSampler {
        fn sample(&mut self) -> Result<f64> {
            self.calls += 1;
            let next = match self.script.pop_front() {
                Some(entry) => {
                    self.last = entry;
                    entry
                }
                None => self.last,
            };
            next.ok_or_else(|| AquasenseError::HardwareIo("Mock read error".to_string()))
        }
    }

    /// Converter with fixed input voltages, recorded reads and injectable
    /// failures
    #[derive(Clone)]
    pub struct MockAdc {
        pub channel_volts: [f64; 4],
        pub read_channels: Arc<Mutex<Vec<u8>>>,
        /// Fail every n-th conversion
        pub fail_every: Arc<Mutex<Option<usize>>>,
    }

    impl MockAdc {
        pub fn new(channel_volts: [f64; 4]) -> Self {
            Self {
                channel_volts,
                read_channels: Arc::new(Mutex::new(Vec::new())),
                fail_every: Arc::new(Mutex::new(None)),
            }
        }

        pub fn get_read_channels(&self) -> Vec<u8> {
            self.read_channels.lock().unwrap().clone()
        }

        pub fn set_fail_every(&self, n: usize) {
            *self.fail_every.lock().unwrap() = Some(n);
        }

        pub fn shared(self) -> SharedAdc<MockAdc> {
            Arc::new(Mutex::new(self))
        }
    }

    impl AdcDevice for MockAdc {
        fn read_voltage(&mut self, channel: u8) -> Result<f64> {
            let count = {
                let mut reads = self.read_channels.lock().unwrap();
                reads.push(channel);
                reads.len()
            };
            if let Some(n) = *self.fail_every.lock().unwrap() {
                if count % n == 0 {
                    return Err(AquasenseError::HardwareIo("Mock NACK".to_string()));
                }
            }
            self.channel_volts
                .get(usize::from(channel))
                .copied()
                .ok_or_else(|| AquasenseError::HardwareIo(format!("Invalid channel {}", channel)))
        }
    }
}
