//! Relay wire protocol for the `BoardSync` realtime channel.
//!
//! Defines the [`RelayFrame`] enum that is JSON-encoded and sent over
//! WebSocket text frames between clients and the relay server, plus the
//! naming scheme for board topics and command destinations.
//!
//! The protocol is a small publish/subscribe dialect:
//!
//! ```text
//! client                              relay
//!   Connect { userId }          ->
//!                               <-    Connected { session }
//!   Subscribe { topic }         ->
//!                               <-    Subscribed { topic }
//!   Send { destination, body }  ->
//!                               <-    Message { topic, body }   (to every subscriber)
//!                               <-    Error { reason, refusal } (to the sender only)
//! ```
//!
//! An `Error` answering a move command carries a [`MoveRefusal`] naming the
//! task, so the sender can undo its optimistic move.

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError};
use crate::ids::{BoardId, TaskId, UserId};

/// Prefix of per-board update topics.
pub const BOARD_TOPIC_PREFIX: &str = "/topic/board/";

/// Prefix of per-board move-command destinations.
pub const MOVE_DESTINATION_PREFIX: &str = "/app/task/move/";

/// Frames exchanged between relay clients and the relay server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RelayFrame {
    /// Opens a relay session. Must be the first frame a client sends.
    Connect {
        /// The connecting user, when known.
        #[serde(default)]
        user_id: Option<UserId>,
    },

    /// Server acknowledges a `Connect`.
    Connected {
        /// Server-assigned session identifier.
        session: String,
    },

    /// Subscribe the session to a topic.
    Subscribe {
        /// Topic name, e.g. `/topic/board/7`.
        topic: String,
    },

    /// Server confirms a `Subscribe`.
    Subscribed {
        /// Topic the session is now subscribed to.
        topic: String,
    },

    /// Remove the session's subscription to a topic.
    Unsubscribe {
        /// Topic name.
        topic: String,
    },

    /// Publish a command to an application destination.
    Send {
        /// Destination, e.g. `/app/task/move/7`.
        destination: String,
        /// JSON text of the command.
        body: String,
    },

    /// A message delivered on a subscribed topic.
    Message {
        /// Topic the message was published on.
        topic: String,
        /// JSON text of the payload (a task record for board topics).
        body: String,
    },

    /// Server reports an error condition to one session.
    Error {
        /// Human-readable error description.
        reason: String,
        /// Set when the error refuses a move command.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refusal: Option<MoveRefusal>,
    },
}

impl RelayFrame {
    /// An `Error` frame unrelated to any move.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
            refusal: None,
        }
    }
}

/// The move command an `Error` frame refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRefusal {
    /// Task the refused command tried to move.
    pub task_id: TaskId,
    /// Why the command was refused.
    pub kind: RefusalKind,
}

/// Category of a move refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefusalKind {
    /// The command named an outdated version. The current record follows.
    Conflict,
    /// The task no longer exists on this board.
    TaskNotFound,
    /// The target column is not part of this board.
    ColumnNotFound,
    /// The command failed validation.
    Invalid,
}

/// Encodes a [`RelayFrame`] as JSON text.
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails.
pub fn encode(frame: &RelayFrame) -> Result<String, CodecError> {
    codec::encode(frame)
}

/// Decodes a [`RelayFrame`] from JSON text.
///
/// # Errors
///
/// Returns [`CodecError`] if the text is not a valid frame.
pub fn decode(text: &str) -> Result<RelayFrame, CodecError> {
    codec::decode(text)
}

/// Returns the update topic for a board.
#[must_use]
pub fn board_topic(board: BoardId) -> String {
    format!("{BOARD_TOPIC_PREFIX}{board}")
}

/// Returns the move-command destination for a board.
#[must_use]
pub fn move_destination(board: BoardId) -> String {
    format!("{MOVE_DESTINATION_PREFIX}{board}")
}

/// Extracts the board id from a board update topic.
#[must_use]
pub fn parse_board_topic(topic: &str) -> Option<BoardId> {
    topic.strip_prefix(BOARD_TOPIC_PREFIX)?.parse().ok()
}

/// Extracts the board id from a move-command destination.
#[must_use]
pub fn parse_move_destination(destination: &str) -> Option<BoardId> {
    destination
        .strip_prefix(MOVE_DESTINATION_PREFIX)?
        .parse()
        .ok()
}
