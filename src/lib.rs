//! # Aquasense Library
//!
//! Water-quality monitoring on a Raspberry Pi class device.
//!
//! This library provides stabilized analog acquisition through an ADS1115
//! (pH, turbidity, TDS), DS18B20 temperature over 1-Wire, polynomial
//! calibration, and the telemetry sinks fed by the periodic sampler: a CSV
//! log, a remote upload and a local read API.

pub mod acquisition;
pub mod adc;
pub mod api;
pub mod calibration;
pub mod config;
pub mod error;
pub mod sampler;
pub mod sensors;
pub mod telemetry;
