use std::io;
use thiserror::Error;

/// The primary error type for the `weldlink` library.
#[derive(Error, Debug)]
pub enum WeldError {
    #[error("weld controller not found on any candidate endpoint")]
    DeviceNotFound,

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out talking to the device: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("not connected: no persisted endpoint and no active link")]
    NotConnected,

    #[error("another operation is already using the transport")]
    Busy,

    #[error("a device scan is already in progress")]
    ScanInProgress,

    #[error("lost network device after {attempts} attempts")]
    NetworkDeviceLost { attempts: u32 },
}
