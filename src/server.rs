use std::{net::SocketAddr, time::Duration};

use axum::{
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, get_service, post},
    Extension, Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::oneshot;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    config::{Config, DEFAULT_BAUD},
    discovery::{self, DeviceDescriptor},
    error::Error,
    events::{SessionEvent, TimestampedEvent},
    session::{SessionHandle, SessionStatus},
};

/// The default port to run the server on.
pub const DEFAULT_PORT: u16 = 3000;

async fn run(config: Config, port: Option<u16>, allocated_port: Option<oneshot::Sender<u16>>) {
    config.validate().expect("Configuration must be valid");

    let session = SessionHandle::new(&config);

    let static_files =
        get_service(ServeDir::new(config.static_dir())).handle_error(handle_static_file_error);

    let app = Router::new()
        .route("/serial/ports", get(list_ports))
        .route("/serial/open", post(open))
        .route("/serial/close", post(close))
        .route("/serial/send", post(send))
        .route("/serial/status", get(status))
        .route("/serial/stream", get(stream))
        .route("/healthz", get(healthz))
        .route("/config", get(show_config))
        .fallback(static_files)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // Each handler needs to be able to reach the session
                .layer(Extension(session))
                // The bridge config should be known to the web server
                .layer(Extension(config.clone())),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(0)));
    let server =
        axum::Server::bind(&addr).serve(app.into_make_service_with_connect_info::<SocketAddr>());
    let addr = server.local_addr();

    if let Some(port_reply) = allocated_port {
        port_reply
            .send(addr.port())
            .expect("The receiver of which port was allocated should not be dropped");
    }

    info!("listening on {}", addr);

    server.await.unwrap();
}

/// Start the server on an arbitrary available port.
/// The port allocated will be sent on the provided channel.
pub async fn run_any_port(config: Config, allocated_port: oneshot::Sender<u16>) {
    run(config, None, Some(allocated_port)).await
}

/// Start the server on the given port.
pub async fn run_on_port(config: Config, port: u16) {
    run(config, Some(port), None).await
}

async fn handle_static_file_error(error: std::io::Error) -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Could not serve static file: {error}"),
    )
}

/// Body of `POST /serial/open`.
#[derive(Debug, Deserialize)]
pub struct OpenRequest {
    /// Device path to open.
    pub path: String,

    /// Baud rate; defaults to [`DEFAULT_BAUD`].
    #[serde(default = "default_baud")]
    pub baud: u32,
}

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

/// Body of `POST /serial/send`.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    /// The line to put on the wire. The delimiter is appended.
    pub payload: String,
}

/// Synchronous acknowledgement of a request.
///
/// For opens this acknowledges request acceptance; actual device
/// readiness is signalled by the `open` event on the stream.
#[derive(Debug, Serialize)]
pub struct Ack {
    /// Whether the request was accepted.
    pub ok: bool,

    /// The problem, when not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<(), Error>> for Ack {
    fn from(result: Result<(), Error>) -> Self {
        match result {
            Ok(()) => Self {
                ok: true,
                error: None,
            },
            Err(e) => Self {
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

async fn list_ports() -> Json<Vec<DeviceDescriptor>> {
    Json(discovery::list_ports())
}

async fn open(
    Extension(session): Extension<SessionHandle>,
    Json(request): Json<OpenRequest>,
) -> Json<Ack> {
    Json(session.open(request.path, request.baud).await.into())
}

async fn close(Extension(session): Extension<SessionHandle>) -> Json<Ack> {
    session.close().await;
    Json(Ok(()).into())
}

async fn send(
    Extension(session): Extension<SessionHandle>,
    Json(request): Json<SendRequest>,
) -> Json<Ack> {
    Json(session.send(request.payload).await.into())
}

async fn status(Extension(session): Extension<SessionHandle>) -> Json<SessionStatus> {
    Json(session.status().await)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "ts": chrono::Utc::now().timestamp_millis() }))
}

async fn show_config(Extension(config): Extension<Config>) -> impl IntoResponse {
    config.serialize_pretty()
}

fn sse_event(event: TimestampedEvent) -> Result<SseEvent, serde_json::Error> {
    let payload = match &event.inner {
        SessionEvent::Data(line) => json!({ "line": line }),
        SessionEvent::Error(message) => json!({ "message": message }),
        SessionEvent::Open | SessionEvent::Close => json!({ "ts": event.timestamp_millis() }),
    };

    SseEvent::default()
        .event(event.inner.kind().as_str())
        .json_data(payload)
}

/// The long-lived event stream.
///
/// Each connected client holds its own subscription; closing the
/// connection drops it, so nothing is ever delivered to a dead client.
/// Comment frames keep idle connections alive.
async fn stream(
    Extension(session): Extension<SessionHandle>,
) -> Sse<impl Stream<Item = Result<SseEvent, serde_json::Error>>> {
    info!("Event stream client connected");

    let events = BroadcastStream::new(session.subscribe()).filter_map(|event| async move {
        match event {
            Ok(event) => Some(sse_event(event)),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(%skipped, "Event stream client lagging, skipping ahead");
                None
            }
        }
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(20))
            .text("ping"),
    )
}
