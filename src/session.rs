//! The session manager owns the one serial port session in the process.
//!
//! It runs as a single task with a mailbox, so every state transition
//! (idle, opening, open, closing) happens inside its loop and is
//! serialized by construction. Nothing else ever holds the device
//! handle.

use futures::{channel::mpsc, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    config::Config,
    discovery,
    error::Error,
    events::{EventBus, SessionEvent, TimestampedEvent},
    mock,
    serial::serial_port::{PortFailure, SerialPortBuilder, SerialPortHandle},
};

/// Snapshot of the current session state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStatus {
    /// Whether a device handle is currently open.
    pub open: bool,

    /// The open device's path. `None` exactly when not open.
    pub path: Option<String>,
}

/// What can be asked of the session manager.
#[derive(Debug)]
enum Action {
    Open { path: String, baud: u32 },
    Close,
    Send(String),
    Status,
}

#[derive(Debug)]
enum SessionResponse {
    Done,
    Status(SessionStatus),
}

impl SessionResponse {
    fn try_into_status(self) -> Result<SessionStatus, Self> {
        if let Self::Status(status) = self {
            Ok(status)
        } else {
            Err(self)
        }
    }
}

struct Request {
    action: Action,
    response: oneshot::Sender<Result<SessionResponse, Error>>,
}

struct Session {
    /// Requests for the session to handle.
    requests: mpsc::UnboundedReceiver<Request>,

    /// Failure reports from port tasks.
    failures: tokio::sync::mpsc::UnboundedReceiver<PortFailure>,

    /// Given to each spawned port task.
    failures_tx: tokio::sync::mpsc::UnboundedSender<PortFailure>,

    /// Where lifecycle events are fanned out.
    events: EventBus,

    /// The live port session, if any.
    port: Option<SerialPortHandle>,

    /// Bumped on every open, so failure reports from sessions we have
    /// already torn down can be told apart from current ones.
    generation: u64,

    config: Config,
}

impl Session {
    async fn run(mut self) {
        self.startup();

        loop {
            tokio::select! {
                request = self.requests.next() => match request {
                    Some(request) => self.handle_request(request),
                    // All handles are gone; nobody can talk to us anymore.
                    None => break,
                },
                failure = self.failures.recv() => {
                    if let Some(failure) = failure {
                        self.handle_port_failure(failure);
                    }
                }
            }
        }

        debug!("Session manager shutting down");
        if let Some(port) = self.port.take() {
            port.shutdown();
        }
    }

    /// The startup policy: an explicitly configured path is tried
    /// first, falling back to auto-detection; with no configured path,
    /// auto-detection runs right away. If nothing is found the session
    /// stays idle, available for a manual open. No automatic retries.
    fn startup(&mut self) {
        let baud = self.config.baud();

        if let Some(path) = self.config.serial_port.clone() {
            info!(%path, %baud, "Opening configured serial port");
            match self.open_port(path, baud) {
                Ok(()) => return,
                Err(e) => warn!(%e, "Configured port failed to open, trying auto-detect"),
            }
        }

        if !self.config.auto_detect {
            return;
        }

        let descriptors = discovery::list_ports();
        match discovery::select_candidate(&descriptors) {
            Some(descriptor) => {
                let path = descriptor.path.clone();
                info!(%path, %baud, "Auto-detected a serial device");

                if let Err(e) = self.open_port(path, baud) {
                    warn!(%e, "Auto-detected port failed to open");
                }
            }
            None => info!("No serial device detected, staying idle"),
        }
    }

    fn handle_request(&mut self, request: Request) {
        let result = match request.action {
            Action::Open { path, baud } => {
                self.open_port(path, baud).map(|_| SessionResponse::Done)
            }
            Action::Close => {
                self.close_port();
                Ok(SessionResponse::Done)
            }
            Action::Send(line) => self.send_line(line).map(|_| SessionResponse::Done),
            Action::Status => Ok(SessionResponse::Status(self.status())),
        };

        // The requester may have hung up; that is their business.
        let _ = request.response.send(result);
    }

    /// Acquire a device handle, closing any current session first so
    /// exactly one handle exists at any instant.
    ///
    /// A failed open leaves the session closed, never half-open.
    fn open_port(&mut self, path: String, baud: u32) -> Result<(), Error> {
        if self.port.is_some() {
            self.close_port();
        }

        self.generation += 1;
        let builder = SerialPortBuilder::new(&path, baud, self.generation);

        let result = if mock::is_mock_path(&path) {
            match mock::take(&path) {
                Some(stream) => Ok(builder.spawn(stream, self.events.clone(), self.failures_tx.clone())),
                None => Err(Error::DeviceNotFound(path.clone())),
            }
        } else {
            builder.build(self.events.clone(), self.failures_tx.clone())
        };

        match result {
            Ok(handle) => {
                info!(%path, %baud, "Session open");
                self.port = Some(handle);
                self.events.publish(SessionEvent::Open);
                Ok(())
            }
            Err(e) => {
                warn!(%path, %e, "Open failed");
                self.events.publish(SessionEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Tear down the port session, if any.
    ///
    /// `close` is always published, open or not, so observers always
    /// see a close after any open.
    fn close_port(&mut self) {
        if let Some(port) = self.port.take() {
            info!(path = %port.path, "Closing serial port");
            port.shutdown();
        }

        self.events.publish(SessionEvent::Close);
    }

    fn send_line(&mut self, line: String) -> Result<(), Error> {
        match &self.port {
            Some(port) => port.send(line),
            None => Err(Error::NotOpen),
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            open: self.port.is_some(),
            path: self.port.as_ref().map(|port| port.path.clone()),
        }
    }

    /// A port task died. Publish the problem, then tear down as a
    /// close. Reports from a generation we already tore down are
    /// ignored.
    fn handle_port_failure(&mut self, failure: PortFailure) {
        if failure.generation != self.generation || self.port.is_none() {
            debug!(?failure, "Stale port failure, ignoring");
            return;
        }

        warn!(error = %failure.error, "Serial session failed");
        self.events.publish(SessionEvent::Error(failure.error.to_string()));
        self.close_port();
    }
}

/// Handle to the process-wide session manager.
///
/// Cheap to clone; all clones talk to the same session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    requests: mpsc::UnboundedSender<Request>,
    events: EventBus,
}

impl SessionHandle {
    /// Spawn the session manager and apply its startup policy.
    pub fn new(config: &Config) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded();
        let (failures_tx, failures_rx) = tokio::sync::mpsc::unbounded_channel();
        let events = EventBus::default();

        let session = Session {
            requests: requests_rx,
            failures: failures_rx,
            failures_tx,
            events: events.clone(),
            port: None,
            generation: 0,
            config: config.clone(),
        };

        tokio::spawn(session.run().instrument(info_span!("Session")));

        Self {
            requests: requests_tx,
            events,
        }
    }

    async fn perform(&self, action: Action) -> Result<SessionResponse, Error> {
        let (tx, rx) = oneshot::channel();

        self.requests
            .unbounded_send(Request {
                action,
                response: tx,
            })
            .expect("Session should be alive while handles exist");

        rx.await.expect("Session should always respond")
    }

    /// Open the device at `path`.
    ///
    /// An already open session is fully closed first. Errors are
    /// returned here and also published as an `error` event.
    pub async fn open(&self, path: impl Into<String>, baud: u32) -> Result<(), Error> {
        self.perform(Action::Open {
            path: path.into(),
            baud,
        })
        .await
        .map(|_| ())
    }

    /// Close the session. Always succeeds, and always publishes a
    /// `close` event, even when nothing was open.
    pub async fn close(&self) {
        self.perform(Action::Close)
            .await
            .expect("Close cannot fail");
    }

    /// Queue one line for the device. The newline delimiter is
    /// appended on the wire.
    ///
    /// Fails with [`Error::NotOpen`] when no session is open. A
    /// successful return means accepted for writing; write failures
    /// surface later as `error` events.
    pub async fn send(&self, line: impl Into<String>) -> Result<(), Error> {
        self.perform(Action::Send(line.into())).await.map(|_| ())
    }

    /// Snapshot of the current state. Pure, no side effects.
    pub async fn status(&self) -> SessionStatus {
        self.perform(Action::Status)
            .await
            .expect("Status cannot fail")
            .try_into_status()
            .expect("Status request must get a status reply")
    }

    /// Subscribe to session lifecycle events from this point onward.
    ///
    /// Dropping the receiver unsubscribes; subscriptions live across
    /// any number of open/close cycles.
    pub fn subscribe(&self) -> broadcast::Receiver<TimestampedEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::config::DEFAULT_BAUD;

    use super::*;

    /// Like [`SessionHandle::new`], but hands back the failure sender
    /// so tests can deliver reports at a chosen moment.
    fn spawn_bare_session() -> (
        SessionHandle,
        tokio::sync::mpsc::UnboundedSender<PortFailure>,
    ) {
        let (requests_tx, requests_rx) = mpsc::unbounded();
        let (failures_tx, failures_rx) = tokio::sync::mpsc::unbounded_channel();
        let events = EventBus::default();

        let session = Session {
            requests: requests_rx,
            failures: failures_rx,
            failures_tx: failures_tx.clone(),
            events: events.clone(),
            port: None,
            generation: 0,
            config: Config {
                auto_detect: false,
                ..Default::default()
            },
        };

        tokio::spawn(session.run());

        (
            SessionHandle {
                requests: requests_tx,
                events,
            },
            failures_tx,
        )
    }

    async fn next_event(rx: &mut broadcast::Receiver<TimestampedEvent>) -> SessionEvent {
        rx.recv().await.unwrap().inner
    }

    #[tokio::test]
    async fn failure_reports_from_torn_down_sessions_are_ignored() {
        let first = mock::install("stale-report-first");
        let second = mock::install("stale-report-second");

        let (session, failures_tx) = spawn_bare_session();
        let mut rx = session.subscribe();

        session.open(first.path(), DEFAULT_BAUD).await.unwrap();
        assert_eq!(next_event(&mut rx).await, SessionEvent::Open);

        // Replace the first session.
        session.open(second.path(), DEFAULT_BAUD).await.unwrap();
        assert_eq!(next_event(&mut rx).await, SessionEvent::Close);
        assert_eq!(next_event(&mut rx).await, SessionEvent::Open);

        // A report from the first session arriving after its
        // replacement is already up.
        failures_tx
            .send(PortFailure {
                generation: 1,
                error: Error::DeviceRemoved("late".into()),
            })
            .unwrap();

        // Two round-trips: by the second reply the report has been
        // handled, whichever the manager's loop picked up first.
        session.status().await;
        let status = session.status().await;

        assert!(status.open);
        assert_eq!(status.path.as_deref(), Some(second.path()));
        assert!(rx.try_recv().is_err());
    }
}
