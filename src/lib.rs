#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

/// Code relating to setting up the server which exposes the serial
/// session over HTTP.
pub mod server;

/// The command line interface.
pub mod cli;

/// The session manager: owns the one serial port session in the
/// process and coordinates open/close/send/status.
pub mod session;

/// Session lifecycle events and their fan-out to subscribers.
pub mod events;

/// Enumerating serial devices and auto-detecting a candidate.
pub mod discovery;

/// Mocked serial devices, for running without hardware.
pub mod mock;

/// Serial port handling: the device handle, line framing, the session
/// task.
pub(crate) mod serial;

/// Errors.
pub mod error;

/// Configuration of the bridge.
pub mod config;

/// Logging and tracing.
pub mod logging;
