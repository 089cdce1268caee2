//! Error types shared across the relay.

use std::path::PathBuf;
use thiserror::Error;

/// Failure driving a PTT output line.
#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("Failed to open GPIO chip {path}: {source}")]
    Chip {
        path: PathBuf,
        #[source]
        source: gpio_cdev::Error,
    },

    #[error("GPIO line {pin}: {source}")]
    Line {
        pin: u32,
        #[source]
        source: gpio_cdev::Error,
    },
}

impl embedded_hal::digital::Error for HardwareError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

/// Invalid or unparsable configuration value.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse {key}: {value:?}")]
    Parse { key: &'static str, value: &'static str },

    #[error("{key} out of range: {reason}")]
    Range { key: &'static str, reason: String },

    #[error("Unknown GPIO backend: {0}")]
    UnknownBackend(String),
}

/// Failure persisting a finished recording.
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
}
