//! A mock device, useful to exercise the serial session without actual
//! serial ports.
//!
//! A test installs a named mock and gets back the device side of an
//! in-memory pipe. Opening the session with the path `mock:<name>`
//! attaches it to the other side. Dropping the [`MockDevice`] ends the
//! stream, which looks to the session exactly like the device being
//! unplugged.

use std::{
    collections::HashMap,
    sync::{Mutex, OnceLock},
};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tracing::info;

/// The path prefix marking a mock device.
pub const MOCK_PATH_PREFIX: &str = "mock:";

fn registry() -> &'static Mutex<HashMap<String, DuplexStream>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, DuplexStream>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Does this path name a mock device?
pub fn is_mock_path(path: &str) -> bool {
    path.starts_with(MOCK_PATH_PREFIX)
}

/// Install a mock device under `mock:<name>`.
///
/// The returned [`MockDevice`] is the device side: what it writes comes
/// out of the session as received lines, and what the session writes
/// can be read back from it.
///
/// Installing the same name again replaces the previous pipe.
pub fn install(name: &str) -> MockDevice {
    let path = format!("{MOCK_PATH_PREFIX}{name}");
    info!(%path, "Installing mock device");

    let (host_side, device_side) = tokio::io::duplex(4096);

    registry()
        .lock()
        .expect("Mock registry lock should not be poisoned")
        .insert(path.clone(), host_side);

    MockDevice {
        path,
        pipe: BufReader::new(device_side),
    }
}

/// Claim the host side of an installed mock. Each install can be
/// claimed once.
pub(crate) fn take(path: &str) -> Option<DuplexStream> {
    registry()
        .lock()
        .expect("Mock registry lock should not be poisoned")
        .remove(path)
}

/// The device side of a mock serial port.
#[derive(Debug)]
pub struct MockDevice {
    path: String,
    pipe: BufReader<DuplexStream>,
}

impl MockDevice {
    /// The path to open the session against.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Emit raw bytes from the device. No delimiter is added, so chunk
    /// boundaries land wherever the caller puts them.
    pub async fn emit_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.pipe.write_all(bytes).await?;
        self.pipe.flush().await
    }

    /// Emit one full line (terminator included) from the device.
    pub async fn emit_line(&mut self, line: &str) -> std::io::Result<()> {
        self.emit_bytes(format!("{line}\n").as_bytes()).await
    }

    /// Read the next line written by the host, without its newline.
    pub async fn next_written_line(&mut self) -> std::io::Result<String> {
        let mut line = String::new();
        self.pipe.read_line(&mut line).await?;
        Ok(line.trim_end_matches('\n').to_string())
    }
}
