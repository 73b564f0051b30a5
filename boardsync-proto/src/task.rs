//! Task records and task-level commands.
//!
//! A [`Task`] is the authoritative JSON record the CRUD service returns and
//! the relay broadcasts after every accepted change. [`TaskMoveRequest`] is
//! the command a client publishes to reposition a task, and
//! [`CreateTaskRequest`] is the body for both `POST /tasks` and
//! `PUT /tasks/{id}`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::{ColumnId, TaskId, UserId};

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 200;

/// Ordering key of a task within its column.
///
/// Positions are real numbers so a task can always be placed between two
/// neighbours without renumbering the column. Comparison uses
/// [`f64::total_cmp`], which makes the type totally ordered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(f64);

impl Position {
    /// Creates a position from a raw value.
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Position {}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for Position {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task urgency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Normal work.
    #[default]
    Medium,
    /// Should be picked up soon.
    High,
    /// Drop everything.
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Urgent => write!(f, "URGENT"),
        }
    }
}

/// Error returned when parsing an unknown priority name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority: {0} (expected LOW, MEDIUM, HIGH or URGENT)")]
pub struct ParsePriorityError(String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "URGENT" => Ok(Self::Urgent),
            _ => Err(ParsePriorityError(s.to_string())),
        }
    }
}

/// The authoritative task record.
///
/// `column_id` and `position` are the fields the move path mutates;
/// `version` is bumped by the server on every accepted change and is the
/// only ordering clients trust when reconciling concurrent updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task identifier.
    pub id: TaskId,
    /// Display title.
    pub title: String,
    /// Optional long-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Ordering key within the owning column.
    pub position: Position,
    /// Owning column.
    pub column_id: ColumnId,
    /// Assigned user, if any.
    #[serde(default)]
    pub assigned_to_id: Option<UserId>,
    /// Username of the assigned user, resolved by the server.
    #[serde(default)]
    pub assigned_to_username: Option<String>,
    /// Optional due timestamp (server local time, no zone).
    #[serde(default)]
    pub due_date: Option<NaiveDateTime>,
    /// Urgency; `MEDIUM` when the server sends nothing.
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: Priority,
    /// Card color as a hex string such as `#3b82f6`.
    #[serde(default)]
    pub color: Option<String>,
    /// Optimistic-concurrency version.
    pub version: u64,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    /// Last-modified timestamp.
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
}

impl Task {
    /// Creates a task with only the ordering-relevant fields set.
    ///
    /// Display fields default to empty / `None` and priority to `MEDIUM`.
    #[must_use]
    pub fn new(
        id: TaskId,
        column_id: ColumnId,
        title: impl Into<String>,
        position: Position,
        version: u64,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            position,
            column_id,
            assigned_to_id: None,
            assigned_to_username: None,
            due_date: None,
            priority: Priority::default(),
            color: None,
            version,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Command asking the authoritative side to move a task.
///
/// `version` is the version the client last observed for the task; the
/// server uses it to detect that someone else changed the task first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMoveRequest {
    /// Task being moved.
    pub task_id: TaskId,
    /// Destination column.
    pub target_column_id: ColumnId,
    /// Position computed by the client for the destination column.
    pub new_position: Position,
    /// Version the client observed when it issued the move.
    pub version: u64,
}

/// Body of `POST /tasks` and `PUT /tasks/{id}`.
///
/// On update the server ignores `column_id`; columns only change through
/// the move path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    /// Display title.
    pub title: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Column the task is created in.
    pub column_id: ColumnId,
    /// Assigned user.
    #[serde(default)]
    pub assigned_to_id: Option<UserId>,
    /// Optional due timestamp.
    #[serde(default)]
    pub due_date: Option<NaiveDateTime>,
    /// Urgency.
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: Priority,
    /// Card color.
    #[serde(default)]
    pub color: Option<String>,
}

impl CreateTaskRequest {
    /// Creates a request with only a title and column.
    #[must_use]
    pub fn new(column_id: ColumnId, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            column_id,
            assigned_to_id: None,
            due_date: None,
            priority: Priority::default(),
            color: None,
        }
    }
}

/// Deserializes an explicit JSON `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
