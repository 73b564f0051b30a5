//! WebSocket relay channel for `BoardSync`.
//!
//! Implements [`BoardChannel`] over a WebSocket connection to a relay
//! server speaking the [`RelayFrame`] protocol. One connection carries one
//! board subscription; connecting to another board replaces it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use boardsync_proto::codec;
use boardsync_proto::relay::{self, RelayFrame};
use boardsync_proto::{BoardId, Task, TaskMoveRequest, UserId};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{BoardChannel, ChannelError, ChannelEvent, ChannelStatus, SendStatus, Subscription};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<WsStream, Message>;

/// Type alias for the read half of a WebSocket connection.
type WsReader = futures_util::stream::SplitStream<WsStream>;

/// Default timeout for opening the WebSocket.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for each handshake acknowledgment.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the event queue handed to a [`Subscription`].
pub const DEFAULT_EVENT_BUFFER: usize = 256;

const OUTGOING_BUFFER: usize = 64;

/// Settings for a [`RelayChannel`].
#[derive(Debug, Clone)]
pub struct RelayChannelConfig {
    /// Relay WebSocket URL, e.g. `ws://localhost:8080/ws`.
    pub url: String,
    /// User announced in the `Connect` frame.
    pub user_id: Option<UserId>,
    /// Timeout for opening the WebSocket.
    pub connect_timeout: Duration,
    /// Timeout for each acknowledgment during the handshake.
    pub handshake_timeout: Duration,
    /// Capacity of the event queue.
    pub event_buffer: usize,
}

impl RelayChannelConfig {
    /// Settings for `url` with default timeouts.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_id: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// A live relay connection subscribed to one board.
struct Connection {
    board_id: BoardId,
    generation: u64,
    outgoing: mpsc::Sender<RelayFrame>,
    connected: Arc<AtomicBool>,
    reader: tokio::task::JoinHandle<()>,
}

impl Connection {
    fn is_up(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Unsubscribes and lets the writer close the socket once the queue
    /// drains.
    fn shutdown(self) {
        let unsubscribe = RelayFrame::Unsubscribe {
            topic: relay::board_topic(self.board_id),
        };
        if self.is_up() && self.outgoing.try_send(unsubscribe).is_err() {
            tracing::debug!(board_id = %self.board_id, "unsubscribe not queued");
        }
        tracing::info!(board_id = %self.board_id, "relay subscription closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::Relaxed);
        self.reader.abort();
    }
}

type Slot = Arc<Mutex<Option<Connection>>>;

/// WebSocket relay channel implementing [`BoardChannel`].
pub struct RelayChannel {
    config: RelayChannelConfig,
    slot: Slot,
    generation: AtomicU64,
}

impl RelayChannel {
    /// Creates a channel; nothing is opened until [`BoardChannel::connect`].
    #[must_use]
    pub fn new(config: RelayChannelConfig) -> Self {
        Self {
            config,
            slot: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// The relay URL this channel connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Board currently subscribed, if any.
    #[must_use]
    pub fn board_id(&self) -> Option<BoardId> {
        self.slot.lock().as_ref().map(|c| c.board_id)
    }
}

impl BoardChannel for RelayChannel {
    /// Opens a connection and subscribes to `board_id`.
    ///
    /// Performs the following steps:
    /// 1. Opens the WebSocket (connect timeout)
    /// 2. Sends `Connect` and waits for `Connected` (handshake timeout)
    /// 3. Sends `Subscribe` and waits for `Subscribed` (handshake timeout)
    /// 4. Spawns the reader and writer tasks
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Timeout`] if any step times out.
    /// - [`ChannelError::Unreachable`] if the relay cannot be reached.
    /// - [`ChannelError::Handshake`] if the relay refuses the session or the
    ///   board.
    /// - [`ChannelError::ConnectionClosed`] if the relay hangs up midway.
    async fn connect(&self, board_id: BoardId) -> Result<Subscription, ChannelError> {
        let (ws_sender, ws_reader, early) = open(&self.config, board_id).await?;

        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_BUFFER);
        let connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(writer_loop(ws_sender, outgoing_rx));
        let reader = tokio::spawn(reader_loop(
            board_id,
            early,
            ws_reader,
            events_tx,
            Arc::clone(&connected),
        ));

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self.slot.lock().replace(Connection {
            board_id,
            generation,
            outgoing: outgoing_tx,
            connected,
            reader,
        });
        if let Some(old) = previous {
            old.shutdown();
        }

        let slot = Arc::clone(&self.slot);
        Ok(Subscription::new(board_id, events_rx, move || {
            let mut guard = slot.lock();
            if guard.as_ref().is_some_and(|c| c.generation == generation)
                && let Some(conn) = guard.take()
            {
                conn.shutdown();
            }
        }))
    }

    fn send_move(&self, board_id: BoardId, command: &TaskMoveRequest) -> SendStatus {
        let guard = self.slot.lock();
        let Some(conn) = guard
            .as_ref()
            .filter(|c| c.board_id == board_id && c.is_up())
        else {
            tracing::debug!(board_id = %board_id, task_id = %command.task_id, "move not sent, channel down");
            return SendStatus::NotConnected;
        };

        let body = match codec::encode(command) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(err = %e, "failed to encode move command");
                return SendStatus::NotConnected;
            }
        };
        let frame = RelayFrame::Send {
            destination: relay::move_destination(board_id),
            body,
        };
        match conn.outgoing.try_send(frame) {
            Ok(()) => {
                tracing::debug!(
                    board_id = %board_id,
                    task_id = %command.task_id,
                    version = command.version,
                    "move command queued"
                );
                SendStatus::Queued
            }
            Err(e) => {
                tracing::warn!(board_id = %board_id, err = %e, "move command dropped");
                SendStatus::NotConnected
            }
        }
    }

    fn disconnect(&self) {
        let taken = self.slot.lock().take();
        if let Some(conn) = taken {
            conn.shutdown();
        }
    }

    fn status(&self) -> ChannelStatus {
        if self.slot.lock().as_ref().is_some_and(Connection::is_up) {
            ChannelStatus::Connected
        } else {
            ChannelStatus::Disconnected
        }
    }
}

/// Runs the connect and subscribe handshake.
///
/// Returns the split socket plus any board messages that raced ahead of the
/// `Subscribed` acknowledgment.
async fn open(
    config: &RelayChannelConfig,
    board_id: BoardId,
) -> Result<(WsSender, WsReader, Vec<RelayFrame>), ChannelError> {
    let url = config.url.as_str();
    let (ws_stream, _response) = tokio::time::timeout(config.connect_timeout, connect_async(url))
        .await
        .map_err(|_| {
            tracing::warn!(url, "relay WebSocket connect timed out");
            ChannelError::Timeout
        })?
        .map_err(|e| {
            tracing::warn!(url, err = %e, "relay WebSocket connect failed");
            map_ws_connect_error(e, url)
        })?;

    let (mut ws_sender, mut ws_reader) = ws_stream.split();

    send_frame(
        &mut ws_sender,
        &RelayFrame::Connect {
            user_id: config.user_id,
        },
    )
    .await?;
    match next_frame(&mut ws_reader, config.handshake_timeout).await? {
        RelayFrame::Connected { session } => {
            tracing::info!(session = %session, url, "relay session opened");
        }
        RelayFrame::Error { reason, .. } => {
            tracing::warn!(reason = %reason, "relay refused session");
            return Err(ChannelError::Handshake(reason));
        }
        other => {
            tracing::warn!(?other, "unexpected relay frame during connect");
            return Err(ChannelError::Handshake(
                "unexpected frame during connect".to_string(),
            ));
        }
    }

    let topic = relay::board_topic(board_id);
    send_frame(
        &mut ws_sender,
        &RelayFrame::Subscribe {
            topic: topic.clone(),
        },
    )
    .await?;

    let mut early = Vec::new();
    loop {
        match next_frame(&mut ws_reader, config.handshake_timeout).await? {
            RelayFrame::Subscribed { topic: acked } if acked == topic => {
                tracing::info!(board_id = %board_id, topic = %topic, "subscribed to board");
                return Ok((ws_sender, ws_reader, early));
            }
            RelayFrame::Error { reason, .. } => {
                tracing::warn!(board_id = %board_id, reason = %reason, "relay refused subscription");
                return Err(ChannelError::Handshake(reason));
            }
            frame @ RelayFrame::Message { .. } => early.push(frame),
            other => tracing::debug!(?other, "ignoring frame while subscribing"),
        }
    }
}

/// Reads the next protocol frame, skipping control frames.
async fn next_frame(reader: &mut WsReader, timeout: Duration) -> Result<RelayFrame, ChannelError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let next = tokio::time::timeout_at(deadline, reader.next())
            .await
            .map_err(|_| {
                tracing::warn!("relay acknowledgment timed out");
                ChannelError::Timeout
            })?;
        match next {
            Some(Ok(Message::Text(text))) => {
                return relay::decode(text.as_str()).map_err(|e| {
                    tracing::warn!(err = %e, "malformed relay handshake frame");
                    ChannelError::Handshake(format!("malformed frame: {e}"))
                });
            }
            Some(Ok(Message::Close(_))) | None => {
                tracing::warn!("relay closed connection during handshake");
                return Err(ChannelError::ConnectionClosed);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(err = %e, "WebSocket error during handshake");
                return Err(ChannelError::Handshake(format!("WebSocket error: {e}")));
            }
        }
    }
}

async fn send_frame(sender: &mut WsSender, frame: &RelayFrame) -> Result<(), ChannelError> {
    let text = relay::encode(frame)?;
    sender.send(Message::Text(text.into())).await.map_err(|e| {
        tracing::warn!(err = %e, "failed to send handshake frame");
        ChannelError::ConnectionClosed
    })
}

/// Background task that drains queued frames onto the socket.
///
/// Sends a close frame once every queue sender is gone.
async fn writer_loop(mut ws_sender: WsSender, mut outgoing: mpsc::Receiver<RelayFrame>) {
    while let Some(frame) = outgoing.recv().await {
        let text = match relay::encode(&frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(err = %e, "failed to encode outgoing frame");
                continue;
            }
        };
        if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
            tracing::warn!(err = %e, "relay write failed");
            return;
        }
    }
    let _ = ws_sender.close().await;
    tracing::debug!("relay writer task exiting");
}

/// Background task that turns relay frames into [`ChannelEvent`]s.
///
/// Malformed frames and messages for other topics are logged and skipped;
/// the task does not disconnect on bad data. Emits
/// [`ChannelEvent::Disconnected`] and clears `connected` when the socket
/// closes or errors out.
async fn reader_loop(
    board_id: BoardId,
    early: Vec<RelayFrame>,
    mut ws_reader: WsReader,
    tx: mpsc::Sender<ChannelEvent>,
    connected: Arc<AtomicBool>,
) {
    for frame in early {
        if let Some(event) = frame_to_event(board_id, frame)
            && tx.send(event).await.is_err()
        {
            return;
        }
    }

    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match relay::decode(text.as_str()) {
                Ok(frame) => {
                    if let Some(event) = frame_to_event(board_id, frame)
                        && tx.send(event).await.is_err()
                    {
                        // Subscription dropped.
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed relay frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(board_id = %board_id, "relay WebSocket closed by server");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(board_id = %board_id, err = %e, "relay WebSocket read error");
                break;
            }
        }
    }

    connected.store(false, Ordering::Relaxed);
    let _ = tx.send(ChannelEvent::Disconnected { board_id }).await;
    tracing::info!(board_id = %board_id, "relay reader task exiting");
}

fn frame_to_event(board_id: BoardId, frame: RelayFrame) -> Option<ChannelEvent> {
    match frame {
        RelayFrame::Message { topic, body } => {
            if relay::parse_board_topic(&topic) != Some(board_id) {
                tracing::debug!(topic = %topic, "message for another topic, skipping");
                return None;
            }
            match codec::decode::<Task>(&body) {
                Ok(task) => Some(ChannelEvent::TaskUpdated { board_id, task }),
                Err(e) => {
                    tracing::warn!(err = %e, "malformed task record, skipping");
                    None
                }
            }
        }
        RelayFrame::Error { reason, refusal } => {
            tracing::warn!(
                board_id = %board_id,
                reason = %reason,
                task_id = refusal.map(|r| r.task_id.get()),
                "relay rejected command"
            );
            Some(ChannelEvent::Rejected {
                board_id,
                reason,
                refusal,
            })
        }
        other => {
            tracing::debug!(?other, "unexpected relay frame type");
            None
        }
    }
}

/// Map a `tokio_tungstenite` connection error to a [`ChannelError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error, url: &str) -> ChannelError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::AddrNotAvailable
                    | std::io::ErrorKind::NotFound
            ) {
                ChannelError::Unreachable(url.to_string())
            } else {
                ChannelError::Unreachable(format!("{url} ({io_err})"))
            }
        }
        WsError::Tls(_) => ChannelError::Handshake(format!("TLS error: {err}")),
        WsError::Http(response) => ChannelError::Handshake(format!(
            "relay HTTP error: status {}",
            response.status()
        )),
        WsError::Url(e) => ChannelError::Unreachable(format!("{url} ({e})")),
        other => ChannelError::Handshake(format!("relay connection error: {other}")),
    }
}
