//! Relay server core: shared state, WebSocket handler, session registry,
//! and topic routing.
//!
//! The relay accepts WebSocket connections, opens a session per connection,
//! and fans task records out to every session subscribed to a board topic.
//! Move commands published on `/app/task/move/{boardId}` are checked
//! against the [`BoardStore`] before anything is broadcast.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use boardsync_proto::relay::{self, MoveRefusal, RefusalKind, RelayFrame};
use boardsync_proto::{BoardId, Task, TaskMoveRequest, UserId, codec};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};

use crate::api;
use crate::store::{BoardStore, ConflictPolicy, StoreError};
use crate::topics::TopicRegistry;

/// Default maximum allowed command body size in bytes (64 KB).
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Shared relay server state: sessions, subscriptions, and board data.
pub struct RelayState {
    /// Maps session id to a channel sender for delivering WebSocket messages.
    sessions: RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>,
    /// Topic subscriptions per session.
    pub topics: TopicRegistry,
    /// Authoritative boards, columns, and tasks.
    pub store: BoardStore,
    /// Maximum allowed command body size in bytes.
    max_payload_size: usize,
    /// How version mismatches on moves are handled.
    conflict_policy: ConflictPolicy,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a relay state over the demo board with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(
            BoardStore::demo(),
            DEFAULT_MAX_PAYLOAD_SIZE,
            ConflictPolicy::default(),
        )
    }

    /// Creates a relay state over `store` with custom limits and policy.
    #[must_use]
    pub fn with_config(
        store: BoardStore,
        max_payload_size: usize,
        conflict_policy: ConflictPolicy,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            topics: TopicRegistry::new(),
            store,
            max_payload_size,
            conflict_policy,
        }
    }

    /// Returns the configured conflict policy.
    #[must_use]
    pub const fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict_policy
    }

    /// Registers a session, storing the sender half of its message channel.
    pub async fn register(
        &self,
        session: &str,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Option<mpsc::UnboundedSender<Message>> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.to_string(), sender)
    }

    /// Removes a session and all of its subscriptions.
    pub async fn unregister(&self, session: &str) -> Option<mpsc::UnboundedSender<Message>> {
        self.topics.unsubscribe_all(session).await;
        let mut sessions = self.sessions.write().await;
        sessions.remove(session)
    }

    /// Returns a clone of the sender for the given session, if registered.
    pub async fn get_sender(&self, session: &str) -> Option<mpsc::UnboundedSender<Message>> {
        let sessions = self.sessions.read().await;
        sessions.get(session).cloned()
    }

    /// Returns the number of open sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Send a WebSocket Close frame to all connected sessions.
    ///
    /// Each session's writer task forwards the close frame, which the
    /// client-side reader reports as a disconnect.
    pub async fn close_all_connections(&self) {
        let sessions = self.sessions.read().await;
        for (session, sender) in sessions.iter() {
            tracing::info!(session = %session, "sending close frame to session");
            let _ = sender.send(Message::Close(None));
        }
    }

    /// Broadcasts a task record to every subscriber of `board`'s topic.
    ///
    /// Returns the number of sessions the record was handed to.
    pub async fn publish_task(&self, board: BoardId, task: &Task) -> usize {
        let topic = relay::board_topic(board);
        let body = match codec::encode(task) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "failed to encode task record");
                return 0;
            }
        };
        let frame = RelayFrame::Message {
            topic: topic.clone(),
            body,
        };
        let text = match relay::encode(&frame) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode message frame");
                return 0;
            }
        };

        let mut delivered = 0;
        for session in self.topics.subscribers(&topic).await {
            if let Some(sender) = self.get_sender(&session).await
                && sender.send(Message::Text(text.clone().into())).is_ok()
            {
                delivered += 1;
            }
        }
        tracing::debug!(
            board_id = %board,
            task_id = %task.id,
            version = task.version,
            delivered,
            "task broadcast"
        );
        delivered
    }
}

/// Handles an upgraded WebSocket connection for a single session.
///
/// The connection lifecycle:
/// 1. Wait for a `Connect` frame.
/// 2. Open a session and send `Connected` back.
/// 3. Enter the frame loop, handling subscriptions and commands.
/// 4. On disconnect, drop the session and its subscriptions.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(user_id) = wait_for_connect(&mut ws_receiver).await else {
        tracing::warn!("connection closed before connect");
        return;
    };

    let session = uuid::Uuid::now_v7().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(&session, tx).await;

    let ack = RelayFrame::Connected {
        session: session.clone(),
    };
    if let Err(e) = send_frame(&mut ws_sender, &ack).await {
        tracing::error!(session = %session, error = %e, "failed to send Connected ack");
        state.unregister(&session).await;
        return;
    }

    tracing::info!(
        session = %session,
        user_id = ?user_id.map(UserId::get),
        "session opened"
    );

    let writer_session = session.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(session = %writer_session, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let reader_session = session.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_text_frame(&reader_session, text.as_str(), &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(session = %reader_session, "received close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.unregister(&session).await;
    tracing::info!(session = %session, "session closed");
}

/// Waits for the first frame on the WebSocket, expecting `Connect`.
///
/// Returns the (optional) user id carried by the frame, or `None` if the
/// connection closes or anything else arrives first.
async fn wait_for_connect(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<Option<UserId>> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match relay::decode(text.as_str()) {
                Ok(RelayFrame::Connect { user_id }) => return Some(user_id),
                Ok(other) => {
                    tracing::warn!(frame = ?other, "expected Connect, got different frame");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode connect frame");
                    return None;
                }
            },
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Handles a text frame from an open session.
async fn handle_text_frame(session: &str, text: &str, state: &Arc<RelayState>) {
    let frame = match relay::decode(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(session = %session, error = %e, "failed to decode frame");
            send_error(state, session, format!("malformed frame: {e}")).await;
            return;
        }
    };

    match frame {
        RelayFrame::Subscribe { topic } => handle_subscribe(session, &topic, state).await,
        RelayFrame::Unsubscribe { topic } => {
            let existed = state.topics.unsubscribe(&topic, session).await;
            tracing::debug!(session = %session, topic = %topic, existed, "unsubscribed");
        }
        RelayFrame::Send { destination, body } => {
            if body.len() > state.max_payload_size {
                tracing::warn!(
                    session = %session,
                    size = body.len(),
                    max = state.max_payload_size,
                    "command body exceeds size limit"
                );
                let reason = format!(
                    "payload too large: {} bytes (max {})",
                    body.len(),
                    state.max_payload_size
                );
                send_error(state, session, reason).await;
                return;
            }
            let Some(board) = relay::parse_move_destination(&destination) else {
                tracing::warn!(session = %session, destination = %destination, "unknown destination");
                send_error(state, session, format!("unknown destination: {destination}")).await;
                return;
            };
            match codec::decode::<TaskMoveRequest>(&body) {
                Ok(req) => handle_move(session, board, &req, state).await,
                Err(e) => {
                    tracing::warn!(session = %session, error = %e, "malformed move command");
                    send_error(state, session, format!("malformed move command: {e}")).await;
                }
            }
        }
        RelayFrame::Connect { .. } => {
            tracing::warn!(session = %session, "received duplicate Connect on open session");
        }
        other => {
            tracing::warn!(session = %session, frame = ?other, "unexpected frame type from client");
        }
    }
}

async fn handle_subscribe(session: &str, topic: &str, state: &Arc<RelayState>) {
    let Some(board) = relay::parse_board_topic(topic) else {
        send_error(state, session, format!("unknown topic: {topic}")).await;
        return;
    };
    if state.store.board(board).await.is_none() {
        send_error(state, session, format!("board {board} not found")).await;
        return;
    }
    match state.topics.subscribe(topic, session).await {
        Ok(added) => {
            tracing::info!(session = %session, topic = %topic, added, "subscribed");
            let ack = RelayFrame::Subscribed {
                topic: topic.to_string(),
            };
            send_to_session(state, session, &ack).await;
        }
        Err(e) => send_error(state, session, e.to_string()).await,
    }
}

/// Applies a move and broadcasts the outcome.
///
/// A refused move answers the sender alone with an `Error` naming the task.
/// On a version conflict the current record follows on the board topic, so
/// its optimistic state is replaced.
async fn handle_move(session: &str, board: BoardId, req: &TaskMoveRequest, state: &Arc<RelayState>) {
    match state
        .store
        .move_task(board, req, state.conflict_policy)
        .await
    {
        Ok(task) => {
            tracing::info!(
                session = %session,
                board_id = %board,
                task_id = %task.id,
                column_id = %task.column_id,
                version = task.version,
                "move accepted"
            );
            state.publish_task(board, &task).await;
        }
        Err(StoreError::VersionConflict { current }) => {
            tracing::info!(
                session = %session,
                board_id = %board,
                task_id = %current.id,
                sent = req.version,
                current = current.version,
                "move rejected on version conflict"
            );
            let refusal = MoveRefusal {
                task_id: req.task_id,
                kind: RefusalKind::Conflict,
            };
            let frame = RelayFrame::Error {
                reason: "Task was modified by another user".to_string(),
                refusal: Some(refusal),
            };
            send_to_session(state, session, &frame).await;
            send_task_to_session(state, session, board, &current).await;
        }
        Err(e) => {
            tracing::warn!(session = %session, board_id = %board, error = %e, "move refused");
            let kind = match e {
                StoreError::TaskNotFound(_) => RefusalKind::TaskNotFound,
                StoreError::ColumnNotFound(_) | StoreError::BoardNotFound(_) => {
                    RefusalKind::ColumnNotFound
                }
                StoreError::VersionConflict { .. } => RefusalKind::Conflict,
                StoreError::Validation(_) => RefusalKind::Invalid,
            };
            let frame = RelayFrame::Error {
                reason: e.to_string(),
                refusal: Some(MoveRefusal {
                    task_id: req.task_id,
                    kind,
                }),
            };
            send_to_session(state, session, &frame).await;
        }
    }
}

async fn send_task_to_session(state: &Arc<RelayState>, session: &str, board: BoardId, task: &Task) {
    match codec::encode(task) {
        Ok(body) => {
            let frame = RelayFrame::Message {
                topic: relay::board_topic(board),
                body,
            };
            send_to_session(state, session, &frame).await;
        }
        Err(e) => tracing::error!(error = %e, "failed to encode task record"),
    }
}

async fn send_error(state: &Arc<RelayState>, session: &str, reason: String) {
    send_to_session(state, session, &RelayFrame::error(reason)).await;
}

/// Sends a frame to an open session via its channel.
async fn send_to_session(state: &Arc<RelayState>, session: &str, frame: &RelayFrame) {
    if let Some(sender) = state.get_sender(session).await
        && let Ok(text) = relay::encode(frame)
    {
        let _ = sender.send(Message::Text(text.into()));
    }
}

/// Encodes and sends a frame directly on a WebSocket sender.
async fn send_frame(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    frame: &RelayFrame,
) -> Result<(), String> {
    let text = relay::encode(frame).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the relay server over the demo board and returns the bound
/// address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// Serves the WebSocket endpoint at `/ws` and the CRUD routes under `/api`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .nest("/api", api::routes())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
