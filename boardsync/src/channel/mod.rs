//! Realtime channel abstraction for `BoardSync`.
//!
//! Defines the [`BoardChannel`] trait the session controller talks to.
//! Concrete implementations:
//! - [`relay::RelayChannel`] — WebSocket connection to a relay server
//! - [`loopback::LoopbackChannel`] — in-process channel for testing
//!
//! A channel holds at most one board subscription at a time. Events for it
//! are delivered through the [`Subscription`] returned by
//! [`BoardChannel::connect`], in the order the channel received them.

pub mod loopback;
pub mod relay;

use std::fmt;

use boardsync_proto::codec::CodecError;
use boardsync_proto::relay::MoveRefusal;
use boardsync_proto::{BoardId, Task, TaskMoveRequest};
use tokio::sync::mpsc;

/// Something the channel observed for a subscribed board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// An authoritative task record was published on the board topic.
    TaskUpdated {
        /// Board the record was published for.
        board_id: BoardId,
        /// The record.
        task: Task,
    },
    /// The relay refused a command this client sent.
    Rejected {
        /// Board the subscription belongs to.
        board_id: BoardId,
        /// Reason given by the relay.
        reason: String,
        /// The refused move, when the error answers one.
        refusal: Option<MoveRefusal>,
    },
    /// The connection was lost. No further events follow.
    Disconnected {
        /// Board the subscription belonged to.
        board_id: BoardId,
    },
}

impl ChannelEvent {
    /// Board the event belongs to.
    #[must_use]
    pub const fn board_id(&self) -> BoardId {
        match self {
            Self::TaskUpdated { board_id, .. }
            | Self::Rejected { board_id, .. }
            | Self::Disconnected { board_id } => *board_id,
        }
    }
}

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Subscribed and able to publish.
    Connected,
    /// No usable connection.
    Disconnected,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Whether a published command left this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Handed to the connection for delivery.
    Queued,
    /// Dropped because there is no connection for the board.
    NotConnected,
}

/// Errors that can occur while connecting a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The operation timed out before completing.
    #[error("channel operation timed out")]
    Timeout,

    /// The relay could not be reached.
    #[error("relay {0} is unreachable")]
    Unreachable(String),

    /// The connection closed before the subscription was established.
    #[error("connection closed")]
    ConnectionClosed,

    /// The relay answered the handshake with something unexpected.
    #[error("relay handshake failed: {0}")]
    Handshake(String),

    /// A frame could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Receiving end of a board subscription.
///
/// Dropping the subscription (or calling [`Subscription::cancel`]) closes it
/// on the channel that produced it.
pub struct Subscription {
    board_id: BoardId,
    events: mpsc::Receiver<ChannelEvent>,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps an event receiver; `on_cancel` runs once when the subscription
    /// is cancelled or dropped.
    pub fn new(
        board_id: BoardId,
        events: mpsc::Receiver<ChannelEvent>,
        on_cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            board_id,
            events,
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// Board this subscription is for.
    #[must_use]
    pub const fn board_id(&self) -> BoardId {
        self.board_id
    }

    /// Waits for the next event. Returns `None` once the channel side has
    /// gone away.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Returns the next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    /// Closes the subscription.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(f) = self.on_cancel.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("board_id", &self.board_id)
            .field("cancelled", &self.on_cancel.is_none())
            .finish_non_exhaustive()
    }
}

/// Board-scoped publish/subscribe channel.
///
/// Connecting again replaces any previous subscription. Publishing is
/// fire-and-forget: [`BoardChannel::send_move`] never waits for the network
/// and never fails loudly.
pub trait BoardChannel: Send + Sync {
    /// Connects and subscribes to `board_id`'s update topic.
    fn connect(
        &self,
        board_id: BoardId,
    ) -> impl std::future::Future<Output = Result<Subscription, ChannelError>> + Send;

    /// Publishes a move command for `board_id`.
    ///
    /// Returns [`SendStatus::NotConnected`] without doing anything when no
    /// connection for that board is up.
    fn send_move(&self, board_id: BoardId, command: &TaskMoveRequest) -> SendStatus;

    /// Unsubscribes and releases the connection. Idempotent.
    fn disconnect(&self);

    /// Current connection state.
    fn status(&self) -> ChannelStatus;
}
