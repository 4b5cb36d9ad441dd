use futures::{
    channel::mpsc::{self, UnboundedSender},
    SinkExt, StreamExt,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::Decoder;
use tracing::{info, info_span, trace, warn, Instrument};

use crate::{
    error::Error,
    events::{EventBus, SessionEvent},
    serial::{codecs::lines::LinesCodec, error::SerialPortError},
};

/// Reported to the session manager when a port task dies.
///
/// The generation lets the manager ignore reports from a session it has
/// already torn down.
#[derive(Debug)]
pub(crate) struct PortFailure {
    pub(crate) generation: u64,
    pub(crate) error: Error,
}

/// Builder for a [`SerialPortHandle`].
#[derive(Debug)]
pub(crate) struct SerialPortBuilder {
    path: String,
    baud: u32,
    generation: u64,
}

fn try_open_serial_stream(path: &str, baud: u32) -> Result<tokio_serial::SerialStream, Error> {
    tokio_serial::new(path, baud)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| Error::from_open_failure(&e))
}

impl SerialPortBuilder {
    /// Start a new builder.
    /// The path should likely be along the lines of `/dev/ttyACMx` on unix,
    /// and `COMx` on Windows.
    pub(crate) fn new(path: &str, baud: u32, generation: u64) -> Self {
        Self {
            path: path.to_string(),
            baud,
            generation,
        }
    }

    /// Open the device and start the session task.
    ///
    /// Failure to acquire the handle is returned without spawning anything.
    pub(crate) fn build(
        self,
        events: EventBus,
        failures: tokio::sync::mpsc::UnboundedSender<PortFailure>,
    ) -> Result<SerialPortHandle, Error> {
        let serial_stream = try_open_serial_stream(&self.path, self.baud)?;

        info!(%self.path, %self.baud, "Serial port opened");

        Ok(self.spawn(serial_stream, events, failures))
    }

    /// Start the session task over an already-open byte stream.
    ///
    /// Real sessions use [`SerialPortBuilder::build`]; this is the seam
    /// that lets mock transports drive the same task.
    pub(crate) fn spawn<S>(
        self,
        stream: S,
        events: EventBus,
        failures: tokio::sync::mpsc::UnboundedSender<PortFailure>,
    ) -> SerialPortHandle
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        enum Event {
            PleasePutThisOnWire(String),
            ThisCameFromWire(Result<String, SerialPortError>),
        }

        let (line_tx, line_rx) = mpsc::unbounded::<String>();

        // Sink: write lines (to device), stream: read lines (from device).
        let (mut sink, from_wire) = LinesCodec::new().framed(stream).split();

        let mut from_wire = from_wire.map(Event::ThisCameFromWire).fuse();
        let mut to_wire = line_rx.map(Event::PleasePutThisOnWire);

        let generation = self.generation;
        let tty_span = info_span!("tty", path = %self.path);

        let handle = tokio::spawn(
            async move {
                let failure = loop {
                    let event = futures::select! {
                        event = from_wire.next() => event,
                        event = to_wire.select_next_some() => Some(event),
                    };

                    match event {
                        Some(Event::PleasePutThisOnWire(line)) => match sink.send(line).await {
                            Ok(()) => trace!("Line written to wire"),
                            Err(e) => break Error::Io(e.to_string()),
                        },
                        Some(Event::ThisCameFromWire(Ok(line))) => {
                            trace!(%line, "Line from wire");
                            events.publish(SessionEvent::Data(line));
                        }
                        Some(Event::ThisCameFromWire(Err(e))) => break Error::Io(e.to_string()),
                        // End of stream: the device went away under us.
                        None => break Error::DeviceRemoved("Serial stream ended".to_string()),
                    }
                };

                warn!(?failure, "Serial port task exiting");

                // The manager may itself be shutting down; then nobody cares.
                let _ = failures.send(PortFailure {
                    generation,
                    error: failure,
                });
            }
            .instrument(tty_span),
        );

        SerialPortHandle {
            path: self.path,
            handle,
            line_tx,
        }
    }
}

/// A live serial session: the task owning the device handle plus the
/// channel for lines to put on the wire.
#[derive(Debug)]
pub(crate) struct SerialPortHandle {
    pub(crate) path: String,
    handle: JoinHandle<()>,
    line_tx: UnboundedSender<String>,
}

impl SerialPortHandle {
    /// Queue one line for writing. The codec appends the newline.
    ///
    /// Queued writes go out in submission order. Success here means
    /// accepted for writing; a failing write surfaces later through the
    /// session's `error` event.
    pub(crate) fn send(&self, line: String) -> Result<(), Error> {
        self.line_tx.unbounded_send(line).map_err(|_| Error::NotOpen)
    }

    /// Tear the session down.
    ///
    /// Aborting the task drops the framer (discarding any partial line)
    /// together with the device handle, so no framing can run against a
    /// released handle.
    pub(crate) fn shutdown(self) {
        self.handle.abort();
    }
}
