#![allow(dead_code)]

use std::time::Duration;

use color_eyre::Result;
use serial_bridge::{
    config::Config,
    events::{SessionEvent, TimestampedEvent},
    session::SessionHandle,
};
use tokio::sync::{broadcast, oneshot};
use tokio::time::timeout;

/// A config which never touches real hardware.
pub fn test_config() -> Config {
    Config {
        auto_detect: false,
        ..Default::default()
    }
}

/// Start the server on some available port and return that port.
pub async fn start_server() -> Result<u16> {
    let (port_tx, port_rx) = oneshot::channel();

    tokio::spawn(async move { serial_bridge::server::run_any_port(test_config(), port_tx).await });

    Ok(port_rx.await?)
}

/// A session manager with no startup auto-detection.
pub fn start_session() -> SessionHandle {
    SessionHandle::new(&test_config())
}

/// The next event, or give up after a while.
pub async fn next_event(rx: &mut broadcast::Receiver<TimestampedEvent>) -> Result<SessionEvent> {
    let event = timeout(Duration::from_secs(5), rx.recv()).await??;

    Ok(event.inner)
}
