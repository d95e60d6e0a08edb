//! # ADS1115 Adapter
//!
//! Single-shot reads of the four single-ended inputs through the `ads1x1x`
//! driver, on any embedded-hal blocking I2C bus.
//!
//! The driver reports a conversion in progress as `WouldBlock`; the
//! adapter polls until the result is ready or the conversion timeout
//! passes, then scales the raw code:
//!
//! `volts = raw * full_scale / 32768`

use std::fmt::Debug;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use ads1x1x::channel::{SingleA0, SingleA1, SingleA2, SingleA3};
use ads1x1x::ic::{Ads1115 as Ads1115Ic, Resolution16Bit};
use ads1x1x::interface::I2cInterface;
use ads1x1x::{mode, Ads1x1x, DataRate16Bit, FullScaleRange, SlaveAddr};
use embedded_hal::adc::OneShot;
use embedded_hal::blocking::i2c::{Write, WriteRead};
use tracing::trace;

use super::AdcDevice;
use crate::error::{AquasenseError, Result};

/// Default I2C address (ADDR pin tied to GND)
pub const DEFAULT_ADDRESS: u8 = 0x48;

/// Number of single-ended inputs
pub const CHANNEL_COUNT: u8 = 4;

/// Supported data rates in samples per second
pub const DATA_RATES: [u16; 8] = [8, 16, 32, 64, 128, 250, 475, 860];

/// Delay between ready polls
const READY_POLL: Duration = Duration::from_micros(500);

type Driver<I2C> = Ads1x1x<I2cInterface<I2C>, Ads1115Ic, Resolution16Bit, mode::OneShot>;

/// Programmable gain amplifier setting.
///
/// Named after the gain values used by common ADS1x15 drivers; each one
/// selects a full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    /// ±6.144 V
    TwoThirds,
    /// ±4.096 V
    One,
    /// ±2.048 V
    Two,
    /// ±1.024 V
    Four,
    /// ±0.512 V
    Eight,
    /// ±0.256 V
    Sixteen,
}

impl Gain {
    /// Full-scale range in volts
    #[must_use]
    pub fn full_scale_volts(self) -> f64 {
        match self {
            Gain::TwoThirds => 6.144,
            Gain::One => 4.096,
            Gain::Two => 2.048,
            Gain::Four => 1.024,
            Gain::Eight => 0.512,
            Gain::Sixteen => 0.256,
        }
    }

    /// Driver setting for this gain
    #[must_use]
    pub fn full_scale_range(self) -> FullScaleRange {
        match self {
            Gain::TwoThirds => FullScaleRange::Within6_144V,
            Gain::One => FullScaleRange::Within4_096V,
            Gain::Two => FullScaleRange::Within2_048V,
            Gain::Four => FullScaleRange::Within1_024V,
            Gain::Eight => FullScaleRange::Within0_512V,
            Gain::Sixteen => FullScaleRange::Within0_256V,
        }
    }
}

impl FromStr for Gain {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "2/3" => Ok(Gain::TwoThirds),
            "1" => Ok(Gain::One),
            "2" => Ok(Gain::Two),
            "4" => Ok(Gain::Four),
            "8" => Ok(Gain::Eight),
            "16" => Ok(Gain::Sixteen),
            other => Err(format!("unsupported ADS1115 gain '{}' (use 2/3, 1, 2, 4, 8 or 16)", other)),
        }
    }
}

/// Driver data rate for `samples_per_second`, if the ADS1115 supports it
#[must_use]
pub fn data_rate(samples_per_second: u16) -> Option<DataRate16Bit> {
    match samples_per_second {
        8 => Some(DataRate16Bit::Sps8),
        16 => Some(DataRate16Bit::Sps16),
        32 => Some(DataRate16Bit::Sps32),
        64 => Some(DataRate16Bit::Sps64),
        128 => Some(DataRate16Bit::Sps128),
        250 => Some(DataRate16Bit::Sps250),
        475 => Some(DataRate16Bit::Sps475),
        860 => Some(DataRate16Bit::Sps860),
        _ => None,
    }
}

/// Driver address for a 7-bit I2C address selectable with the ADDR pin
#[must_use]
pub fn target_address(address: u8) -> Option<SlaveAddr> {
    match address {
        0x48 => Some(SlaveAddr::new_gnd()),
        0x49 => Some(SlaveAddr::new_vdd()),
        0x4A => Some(SlaveAddr::new_sda()),
        0x4B => Some(SlaveAddr::new_scl()),
        _ => None,
    }
}

/// Convert a raw conversion code to volts
#[must_use]
pub fn raw_to_volts(raw: i16, gain: Gain) -> f64 {
    f64::from(raw) * gain.full_scale_volts() / 32768.0
}

fn driver_error<E: Debug>(context: &str, error: ads1x1x::Error<E>) -> AquasenseError {
    AquasenseError::HardwareIo(format!("{}: {:?}", context, error))
}

/// ADS1115 on an I2C bus
pub struct Ads1115<I2C> {
    adc: Driver<I2C>,
    address: u8,
    gain: Gain,
    conversion_timeout: Duration,
}

impl<I2C> std::fmt::Debug for Ads1115<I2C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ads1115")
            .field("address", &format_args!("0x{:02X}", self.address))
            .field("gain", &self.gain)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "hardware")]
impl Ads1115<rppal::i2c::I2c> {
    /// Open `/dev/i2c-<bus>` and configure the converter at `address`
    ///
    /// # Errors
    ///
    /// Returns `HardwareIo` if the bus cannot be opened or configured
    pub fn open(bus: u8, address: u8, gain: Gain, samples_per_second: u16) -> Result<Self> {
        let i2c = rppal::i2c::I2c::with_bus(bus).map_err(|e| {
            AquasenseError::HardwareIo(format!("Failed to open I2C bus {}: {}", bus, e))
        })?;
        tracing::info!("Opened I2C bus {}", bus);
        Self::new(i2c, address, gain, samples_per_second)
    }
}

impl<I2C, E> Ads1115<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: Debug,
{
    /// Configure gain and data rate of the converter at `address`
    ///
    /// # Errors
    ///
    /// Returns `HardwareIo` for an address or data rate the ADS1115 does
    /// not support, or if the configuration cannot be written
    pub fn new(i2c: I2C, address: u8, gain: Gain, samples_per_second: u16) -> Result<Self> {
        let target = target_address(address).ok_or_else(|| {
            AquasenseError::HardwareIo(format!("Unsupported ADS1115 address: 0x{:02X}", address))
        })?;
        let rate = data_rate(samples_per_second).ok_or_else(|| {
            AquasenseError::HardwareIo(format!(
                "Unsupported ADS1115 data rate: {} SPS",
                samples_per_second
            ))
        })?;

        let mut adc = Ads1x1x::new_ads1115(i2c, target);
        adc.set_full_scale_range(gain.full_scale_range())
            .map_err(|e| driver_error("Failed to set ADS1115 gain", e))?;
        adc.set_data_rate(rate)
            .map_err(|e| driver_error("Failed to set ADS1115 data rate", e))?;

        // Two conversion periods plus scheduling slack
        let conversion_timeout = Duration::from_micros(2_000_000 / u64::from(samples_per_second))
            + Duration::from_millis(10);

        Ok(Self {
            adc,
            address,
            gain,
            conversion_timeout,
        })
    }

    /// Configured gain
    #[must_use]
    pub fn gain(&self) -> Gain {
        self.gain
    }

    fn read_raw(&mut self, channel: u8) -> nb::Result<i16, ads1x1x::Error<E>> {
        match channel {
            0 => self.adc.read(&mut SingleA0),
            1 => self.adc.read(&mut SingleA1),
            2 => self.adc.read(&mut SingleA2),
            _ => self.adc.read(&mut SingleA3),
        }
    }
}

impl<I2C, E> AdcDevice for Ads1115<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E> + Send,
    E: Debug,
{
    fn read_voltage(&mut self, channel: u8) -> Result<f64> {
        if channel >= CHANNEL_COUNT {
            return Err(AquasenseError::HardwareIo(format!(
                "Invalid ADS1115 channel {} (must be 0-3)",
                channel
            )));
        }

        let started = Instant::now();
        let raw = loop {
            match self.read_raw(channel) {
                Ok(raw) => break raw,
                Err(nb::Error::WouldBlock) => {
                    if started.elapsed() > self.conversion_timeout {
                        return Err(AquasenseError::HardwareIo(format!(
                            "Conversion on channel {} did not complete",
                            channel
                        )));
                    }
                    thread::sleep(READY_POLL);
                }
                Err(nb::Error::Other(e)) => return Err(driver_error("ADS1115 read failed", e)),
            }
        };

        let volts = raw_to_volts(raw, self.gain);
        trace!("ADS1115 ch{} raw={} ({:.6} V)", channel, raw, volts);
        Ok(volts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Two-register stand-in: config reads report the conversion state,
    /// conversion reads return a fixed code.
    #[derive(Clone, Default)]
    struct FakeI2c {
        written_data: Arc<Mutex<Vec<Vec<u8>>>>,
        conversion: i16,
        busy: bool,
        fail_reads: bool,
    }

    impl FakeI2c {
        fn with_conversion(conversion: i16) -> Self {
            Self {
                conversion,
                ..Self::default()
            }
        }

        fn get_written_data(&self) -> Vec<Vec<u8>> {
            self.written_data.lock().unwrap().clone()
        }
    }

    impl Write for FakeI2c {
        type Error = &'static str;

        fn write(&mut self, _address: u8, bytes: &[u8]) -> std::result::Result<(), Self::Error> {
            self.written_data.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
    }

    impl WriteRead for FakeI2c {
        type Error = &'static str;

        fn write_read(
            &mut self,
            _address: u8,
            bytes: &[u8],
            buffer: &mut [u8],
        ) -> std::result::Result<(), Self::Error> {
            if self.fail_reads {
                return Err("nack");
            }
            let value = match bytes.first() {
                Some(&0x01) if self.busy => 0x0583,
                Some(&0x01) => 0x8583,
                _ => self.conversion as u16,
            };
            for (slot, byte) in buffer.iter_mut().zip(value.to_be_bytes()) {
                *slot = byte;
            }
            Ok(())
        }
    }

    #[test]
    fn test_gain_parsing() {
        assert_eq!("2/3".parse::<Gain>().unwrap(), Gain::TwoThirds);
        assert_eq!("1".parse::<Gain>().unwrap(), Gain::One);
        assert_eq!(" 16 ".parse::<Gain>().unwrap(), Gain::Sixteen);
        assert!("3".parse::<Gain>().is_err());
    }

    #[test]
    fn test_data_rates() {
        for rate in DATA_RATES {
            assert!(data_rate(rate).is_some(), "{} SPS should be supported", rate);
        }
        assert!(data_rate(100).is_none());
    }

    #[test]
    fn test_target_addresses() {
        for address in 0x48..=0x4B {
            assert!(target_address(address).is_some());
        }
        assert!(target_address(0x47).is_none());
        assert!(target_address(0x4C).is_none());
    }

    #[test]
    fn test_raw_to_volts() {
        assert_eq!(raw_to_volts(0, Gain::One), 0.0);
        assert!((raw_to_volts(16384, Gain::One) - 2.048).abs() < 1e-9);
        assert!((raw_to_volts(-32768, Gain::TwoThirds) + 6.144).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_data_rate() {
        let result = Ads1115::new(FakeI2c::default(), 0x48, Gain::One, 100);
        assert!(matches!(result, Err(AquasenseError::HardwareIo(_))));
    }

    #[test]
    fn test_invalid_address() {
        let result = Ads1115::new(FakeI2c::default(), 0x50, Gain::One, 128);
        assert!(matches!(result, Err(AquasenseError::HardwareIo(_))));
    }

    #[test]
    fn test_read_voltage_scales_conversion() {
        let mut adc = Ads1115::new(FakeI2c::with_conversion(16384), 0x48, Gain::One, 860).unwrap();
        let volts = adc.read_voltage(1).unwrap();
        assert!((volts - 2.048).abs() < 1e-9);
    }

    #[test]
    fn test_read_voltage_selects_input_and_gain() {
        let bus = FakeI2c::with_conversion(100);
        let mut adc = Ads1115::new(bus.clone(), 0x48, Gain::One, 860).unwrap();
        adc.read_voltage(2).unwrap();

        let config_writes: Vec<_> = bus
            .get_written_data()
            .into_iter()
            .filter(|bytes| bytes.len() == 3 && bytes[0] == 0x01)
            .collect();
        let last = config_writes.last().unwrap();
        // MUX=110 (AIN2 single-ended), PGA=001 (+/-4.096 V)
        assert_eq!(last[1] & 0x70, 0x60);
        assert_eq!(last[1] & 0x0E, 0x02);
    }

    #[test]
    fn test_read_voltage_invalid_channel() {
        let mut adc = Ads1115::new(FakeI2c::default(), 0x48, Gain::One, 128).unwrap();
        assert!(adc.read_voltage(4).is_err());
    }

    #[test]
    fn test_bus_failure_is_hardware_error() {
        let bus = FakeI2c {
            fail_reads: true,
            ..FakeI2c::default()
        };
        let mut adc = Ads1115::new(bus, 0x48, Gain::One, 860).unwrap();
        assert!(matches!(adc.read_voltage(0), Err(AquasenseError::HardwareIo(_))));
    }

    #[test]
    fn test_conversion_timeout() {
        let bus = FakeI2c {
            busy: true,
            ..FakeI2c::default()
        };
        let mut adc = Ads1115::new(bus, 0x48, Gain::One, 860).unwrap();
        let err = adc.read_voltage(0).unwrap_err();
        assert!(err.to_string().contains("did not complete"));
    }

    #[test]
    fn test_channel_sampler() {
        use crate::adc::VoltageSampler;

        let mut adc = Ads1115::new(FakeI2c::with_conversion(12288), 0x48, Gain::Two, 860).unwrap();
        let mut channel = adc.channel(3);
        // 12288 / 32768 * 2.048
        assert!((channel.sample().unwrap() - 0.768).abs() < 1e-9);
    }
}
