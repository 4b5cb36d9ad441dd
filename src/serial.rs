//! The serial port session: the open device handle, the line framing
//! over its byte stream, and the task pumping between the two.

/// Serial port related errors.
pub(crate) mod error;

/// The serial port session task.
pub(crate) mod serial_port;

/// Codecs for framing bytes to/from the wire.
pub(crate) mod codecs;
