//! WebSocket transport to one pilight daemon.
//!
//! A [`HubClient`] owns exactly one connection at a time. A background
//! task connects, classifies inbound frames into [`HubEvent`]s on a
//! [`tokio::sync::broadcast`] channel, and reconnects after a fixed
//! delay when the connection is lost. Outbound traffic is serialized
//! through a [`SerializedQueue`] so sends never interleave and always
//! respect the daemon's minimum message spacing.
//!
//! # Example
//!
//! ```rust,ignore
//! use pilight_api::{HubClient, HubConfig, Request};
//!
//! let client = HubClient::new(config);
//! client.connect();
//! let mut events = client.subscribe();
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//!
//! client.close().await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, watch};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::error::Error;
use crate::protocol::{self, ConfigSnapshot, Message, Request, StateUpdate};
use crate::queue::SerializedQueue;

const EVENT_CHANNEL_CAPACITY: usize = 256;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, tungstenite::Message>;

// ── HubEvent ─────────────────────────────────────────────────────────

/// Classified transport event, fanned out to all subscribers.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// The connection opened and the config snapshot was requested.
    Connected,
    /// The connection was lost; a reconnect is scheduled.
    Disconnected,
    /// Full device/GUI registry.
    Config(ConfigSnapshot),
    /// Full current-values registry, kept raw.
    Values(serde_json::Value),
    /// State-change broadcast.
    Update(StateUpdate),
}

impl From<Message> for HubEvent {
    fn from(message: Message) -> Self {
        match message {
            Message::Config(snapshot) => Self::Config(snapshot),
            Message::Values(values) => Self::Values(values),
            Message::Update(update) => Self::Update(update),
        }
    }
}

// ── SendTicket ───────────────────────────────────────────────────────

/// Delivery receipt for one queued send.
///
/// Resolves once the frame has been written and the inter-message
/// spacing has elapsed. If the queue is reset before the job runs
/// (connection lost), the ticket resolves to
/// [`Error::ConnectionLost`].
pub struct SendTicket {
    rx: oneshot::Receiver<Result<(), Error>>,
}

impl SendTicket {
    pub async fn wait(self) -> Result<(), Error> {
        self.rx.await.map_err(|_| Error::ConnectionLost)?
    }

    fn failed(error: Error) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self { rx }
    }
}

// ── HubClient ────────────────────────────────────────────────────────

/// Client for one pilight daemon. Cheap to clone.
#[derive(Clone)]
pub struct HubClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: HubConfig,
    queue: SerializedQueue,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    connected: watch::Sender<bool>,
    event_tx: broadcast::Sender<Arc<HubEvent>>,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl HubClient {
    /// Create a client. Does not connect; call
    /// [`connect`](Self::connect) to spawn the connection loop.
    pub fn new(config: HubConfig) -> Self {
        let (connected, _) = watch::channel(false);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(ClientInner {
                config,
                queue: SerializedQueue::new(),
                sink: tokio::sync::Mutex::new(None),
                connected,
                event_tx,
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Spawn the background connection loop. Returns immediately;
    /// connection establishment is asynchronous. Calling this more
    /// than once is a no-op.
    pub fn connect(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(run_loop(Arc::clone(&self.inner)));
    }

    /// Subscribe to the classified event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<HubEvent>> {
        self.inner.event_tx.subscribe()
    }

    /// Observe connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Queue a message for ordered, rate-limited delivery.
    pub fn send(&self, request: &Request) -> SendTicket {
        enqueue_send(&self.inner, request)
    }

    /// Ask the daemon for its config snapshot.
    pub fn request_config(&self) -> SendTicket {
        self.send(&Request::RequestConfig)
    }

    /// Ask the daemon for its current-values snapshot.
    pub fn request_values(&self) -> SendTicket {
        self.send(&Request::RequestValues)
    }

    /// Shut down: abandon queued sends, wait for any in-flight write
    /// to finish, close the socket with a normal close code, and
    /// suppress reconnection.
    pub async fn close(&self) {
        self.inner.cancel.cancel();
        self.inner.queue.reset().await;

        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "manual shutdown".into(),
            };
            if let Err(e) = sink.send(tungstenite::Message::Close(Some(frame))).await {
                tracing::debug!(
                    hub = %self.inner.config.label(),
                    error = %e,
                    "close frame not delivered"
                );
            }
        }

        let _ = self.inner.connected.send(false);
    }
}

fn enqueue_send(inner: &Arc<ClientInner>, request: &Request) -> SendTicket {
    let text = match serde_json::to_string(request) {
        Ok(text) => text,
        Err(e) => return SendTicket::failed(Error::Send(e.to_string())),
    };

    let (tx, rx) = oneshot::channel();
    let job_inner = Arc::clone(inner);

    inner.queue.push(async move {
        tracing::debug!(hub = %job_inner.config.label(), payload = %text, "sending message");
        match write_frame(&job_inner, text).await {
            Ok(()) => {
                // Fixed-spacing throttle; holds the queue slot, not
                // the socket.
                tokio::time::sleep(job_inner.config.message_interval()).await;
                let _ = tx.send(Ok(()));
            }
            Err(e) => {
                tracing::error!(
                    hub = %job_inner.config.label(),
                    error = %e,
                    "message write failed"
                );
                let _ = tx.send(Err(e));
                tokio::time::sleep(job_inner.config.message_interval()).await;
            }
        }
    });

    SendTicket { rx }
}

async fn write_frame(inner: &ClientInner, text: String) -> Result<(), Error> {
    let mut guard = inner.sink.lock().await;
    let sink = guard.as_mut().ok_or(Error::NotConnected)?;
    sink.send(tungstenite::Message::Text(text.into()))
        .await
        .map_err(|e| Error::Send(e.to_string()))
}

fn emit(inner: &ClientInner, event: HubEvent) {
    // Send errors only mean nobody is subscribed right now.
    let _ = inner.event_tx.send(Arc::new(event));
}

// ── Background connection loop ───────────────────────────────────────

/// Main loop: connect → read until the connection drops → clean up →
/// wait the configured retry interval → reconnect. Exits when the
/// client is closed.
async fn run_loop(inner: Arc<ClientInner>) {
    loop {
        let result = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            result = connect_and_read(&inner) => result,
        };

        // The peer is gone: partially-sent commands cannot be assumed
        // delivered, so the whole backlog is abandoned.
        let was_open = inner.sink.lock().await.take().is_some();
        let _ = inner.connected.send(false);
        inner.queue.reset().await;

        if inner.cancel.is_cancelled() {
            break;
        }

        match result {
            Ok(()) => tracing::info!(hub = %inner.config.label(), "connection closed by peer"),
            Err(e) => {
                tracing::warn!(hub = %inner.config.label(), error = %e, "connection failed");
            }
        }

        if was_open {
            emit(&inner, HubEvent::Disconnected);
        }

        tracing::info!(
            hub = %inner.config.label(),
            retry_in_secs = inner.config.retry_interval().as_secs(),
            "reconnecting after delay"
        );

        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            () = tokio::time::sleep(inner.config.retry_interval()) => {}
        }
    }

    tracing::debug!(hub = %inner.config.label(), "connection loop exiting");
}

/// Establish one connection and read frames until it drops.
///
/// `Ok(())` means the peer ended the connection (close frame or EOF);
/// an error means the connect or the stream itself failed. Either way
/// the caller schedules a reconnect.
async fn connect_and_read(inner: &Arc<ClientInner>) -> Result<(), Error> {
    let url = inner.config.socket_url()?;
    tracing::info!(hub = %inner.config.label(), url = %url, "connecting");

    let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::Connect(e.to_string()))?;

    tracing::info!(hub = %inner.config.label(), "connection established");

    let (sink, mut read) = stream.split();
    *inner.sink.lock().await = Some(sink);
    let _ = inner.connected.send(true);
    emit(inner, HubEvent::Connected);

    // The daemon pushes nothing until asked; request the device
    // registry right away.
    drop(enqueue_send(inner, &Request::RequestConfig));

    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => return Ok(()),
            frame = read.next() => match frame {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    if let Some(message) = protocol::classify(text.as_str()) {
                        emit(inner, HubEvent::from(message));
                    }
                }
                Some(Ok(tungstenite::Message::Ping(_))) => {
                    // tungstenite replies with a pong automatically
                    tracing::trace!("ping");
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    match frame {
                        Some(cf) => tracing::info!(
                            hub = %inner.config.label(),
                            code = %cf.code,
                            reason = %cf.reason,
                            "close frame received"
                        ),
                        None => tracing::info!(
                            hub = %inner.config.label(),
                            "close frame received (no payload)"
                        ),
                    }
                    return Ok(());
                }
                Some(Ok(_)) => {
                    tracing::debug!(hub = %inner.config.label(), "dropping non-text frame");
                }
                Some(Err(e)) => return Err(Error::Socket(e.to_string())),
                None => {
                    tracing::info!(hub = %inner.config.label(), "stream ended");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HubConfig {
        HubConfig {
            name: Some("test".into()),
            host: "127.0.0.1".into(),
            port: 5001,
            message_interval_ms: 1,
            retry_interval_secs: 1,
        }
    }

    #[tokio::test]
    async fn send_without_connection_fails_fast() {
        let client = HubClient::new(config());
        let ticket = client.send(&Request::RequestConfig);
        assert!(matches!(ticket.wait().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn dropped_ticket_sender_reads_as_connection_lost() {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        let ticket = SendTicket { rx };
        assert!(matches!(ticket.wait().await, Err(Error::ConnectionLost)));
    }

    #[tokio::test]
    async fn close_is_idempotent_without_connection() {
        let client = HubClient::new(config());
        client.close().await;
        client.close().await;
        assert!(!client.is_connected());
    }
}
