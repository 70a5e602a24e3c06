//! Error types shared by the codec, telemetry, bus and control layers

use crate::bus::DeviceAddress;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad magic, bad length, missing delimiters or unknown command
    #[error("Frame format error: {0}")]
    FrameFormat(String),

    /// Binary frame checksum disagreement
    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch {
        /// Checksum computed over the received bytes
        expected: u16,
        /// Checksum carried by the frame
        actual: u16,
    },

    /// No reply within the read deadline
    #[error("Timed out waiting for device")]
    Timeout,

    /// Explicit NACK from the device
    #[error("Device rejected request (code {code:?})")]
    DeviceRejected { code: Option<u8> },

    /// Reply id other than the expected acknowledgement
    #[error("Command {request:#06x} failed (reply {reply:#06x})")]
    CommandFailed { request: u16, reply: u16 },

    /// Telemetry payload of an unknown shape
    #[error("Unexpected IMU payload length: {len} (expected 42 or 30)")]
    PayloadFormat { len: usize },

    /// Probe returned not-acknowledged
    #[error("No device at {0}")]
    DeviceNotPresent(DeviceAddress),

    /// Invalid address string, inverted PWM window and the like
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation the selected protocol variant cannot express
    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    /// External record store failure
    #[error("Record store error: {0}")]
    Store(String),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Store(err.to_string())
        }
    }
}
