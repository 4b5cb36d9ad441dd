use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// A session lifecycle event.
///
/// Everything observers can learn about the serial session arrives as
/// one of these. Lines are handed over as they are produced; no history
/// is retained anywhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionEvent {
    /// A device handle was acquired.
    Open,

    /// One line arrived from the device.
    Data(String),

    /// The session ended (or a close was requested while already closed).
    Close,

    /// Something went wrong. Carries a human readable message.
    Error(String),
}

impl SessionEvent {
    /// Which kind of event this is.
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Open => EventKind::Open,
            SessionEvent::Data(_) => EventKind::Data,
            SessionEvent::Close => EventKind::Close,
            SessionEvent::Error(_) => EventKind::Error,
        }
    }
}

impl Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Open => write!(f, "open"),
            SessionEvent::Data(line) => {
                let line = line.chars().take(48).collect::<String>();
                write!(f, "data: {}", line.trim_end())
            }
            SessionEvent::Close => write!(f, "close"),
            SessionEvent::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// The kinds of [`SessionEvent`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`SessionEvent::Open`].
    Open,
    /// See [`SessionEvent::Data`].
    Data,
    /// See [`SessionEvent::Close`].
    Close,
    /// See [`SessionEvent::Error`].
    Error,
}

impl EventKind {
    /// The wire name of this kind, also used as the SSE event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::Data => "data",
            EventKind::Close => "close",
            EventKind::Error => "error",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A [`SessionEvent`] plus when it happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimestampedEvent {
    /// The event.
    pub inner: SessionEvent,

    /// When the event happened.
    pub timestamp: DateTime<Utc>,
}

impl TimestampedEvent {
    /// Wrap an event with the current time.
    pub fn new(inner: SessionEvent) -> Self {
        Self {
            inner,
            timestamp: Utc::now(),
        }
    }

    /// Milliseconds since the unix epoch.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

impl Display for TimestampedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// Multicasts session events to any number of subscribers.
///
/// Each subscriber receives every event published after it subscribed,
/// in publication order. Subscribers are independent: one lagging or
/// dropping out never affects delivery to the others. Dropping the
/// receiver unsubscribes.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TimestampedEvent>,
}

impl EventBus {
    /// A new bus where slow subscribers may fall behind by at most
    /// `capacity` events before skipping ahead.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all events published from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<TimestampedEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: SessionEvent) {
        let event = TimestampedEvent::new(event);
        debug!(%event, "Publishing event");

        // An error here just means nobody is listening right now.
        match self.tx.send(event) {
            Ok(subscribers) => trace!("Delivered to {subscribers} subscriber(s)"),
            Err(_) => trace!("No subscribers"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_publication_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(SessionEvent::Open);
        bus.publish(SessionEvent::Data("hello".into()));
        bus.publish(SessionEvent::Close);

        assert_eq!(rx.recv().await.unwrap().inner, SessionEvent::Open);
        assert_eq!(
            rx.recv().await.unwrap().inner,
            SessionEvent::Data("hello".into())
        );
        assert_eq!(rx.recv().await.unwrap().inner, SessionEvent::Close);
    }

    #[tokio::test]
    async fn subscription_starts_at_registration() {
        let bus = EventBus::default();

        bus.publish(SessionEvent::Open);

        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());

        bus.publish(SessionEvent::Close);
        assert_eq!(rx.recv().await.unwrap().inner, SessionEvent::Close);
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_affect_others() {
        let bus = EventBus::default();

        let rx_dropped = bus.subscribe();
        let mut rx = bus.subscribe();

        drop(rx_dropped);

        bus.publish(SessionEvent::Data("still here".into()));
        assert_eq!(
            rx.recv().await.unwrap().inner,
            SessionEvent::Data("still here".into())
        );
    }
}
