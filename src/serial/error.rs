use std::io;

use thiserror::Error;

/// Problems on the wire between us and the device.
#[derive(Debug, Error)]
pub enum SerialPortError {
    /// IO related errors.
    #[error("Underlying IO problem: {0}")]
    Io(#[from] io::Error),
}
