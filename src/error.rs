//! # Error Types
//!
//! Custom error types for Aquasense using `thiserror`.

use thiserror::Error;

/// Main error type for Aquasense
#[derive(Debug, Error)]
pub enum AquasenseError {
    /// Bus transaction failed (I2C or 1-Wire)
    #[error("Hardware I/O error: {0}")]
    HardwareIo(String),

    /// Calibration file missing, malformed or inconsistent
    #[error("Calibration load error: {0}")]
    CalibrationLoad(String),

    /// A sensor was requested that is not registered
    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Telemetry upload errors
    #[error("Upload error: {0}")]
    Upload(String),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Aquasense
pub type Result<T> = std::result::Result<T, AquasenseError>;
