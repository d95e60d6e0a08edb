//! Append-only CSV sample log.
//!
//! The header row is written only when the file is created. Existing files
//! are appended to, never rewritten.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::TelemetrySample;
use crate::error::Result;

/// Writes one row per sample to a CSV file.
#[derive(Debug, Clone)]
pub struct CsvLogger {
    path: PathBuf,
}

impl CsvLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `sample`, creating the file (and its parent directory) with a
    /// header row if needed.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Csv` if the file cannot be opened or written.
    pub fn append(&self, sample: &TelemetrySample) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let is_new = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        let mut writer = csv::WriterBuilder::new().has_headers(is_new).from_writer(file);
        writer.serialize(sample)?;
        writer.flush()?;

        debug!("Logged sample to {}", self.path.display());
        Ok(())
    }
}
