//! Board CRUD service client.
//!
//! The [`BoardApi`] trait covers the request/response half of the system:
//! loading a board and creating, editing and deleting tasks. Moves never go
//! through here; they travel over the realtime channel.
//!
//! - [`http::HttpBoardApi`] talks to the REST service
//! - [`memory::MemoryBoardApi`] is an in-process stand-in for tests

pub mod http;
pub mod memory;

use std::future::Future;

use boardsync_proto::{Board, BoardId, Column, ColumnId, CreateTaskRequest, Task, TaskId};

/// Errors returned by a [`BoardApi`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("{url} returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
        /// Response body, if any.
        message: String,
    },

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The configured base URL cannot be used.
    #[error("invalid service url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// HTTP status carried by the error, if the service answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::Http(_) | Self::InvalidUrl(_) => None,
        }
    }
}

/// Request/response access to boards and tasks.
///
/// Reads return records in the service's order: columns by position, tasks
/// by position within their column.
pub trait BoardApi: Send + Sync {
    /// Fetches board metadata, including members.
    fn fetch_board(&self, id: BoardId) -> impl Future<Output = Result<Board, ApiError>> + Send;

    /// Fetches a board's columns.
    fn fetch_columns(
        &self,
        board_id: BoardId,
    ) -> impl Future<Output = Result<Vec<Column>, ApiError>> + Send;

    /// Fetches the tasks of one column.
    fn fetch_tasks(
        &self,
        column_id: ColumnId,
    ) -> impl Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// Creates a task and returns the stored record.
    fn create_task(
        &self,
        request: &CreateTaskRequest,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Replaces a task's editable fields and returns the stored record.
    fn update_task(
        &self,
        id: TaskId,
        request: &CreateTaskRequest,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Deletes a task.
    fn delete_task(&self, id: TaskId) -> impl Future<Output = Result<(), ApiError>> + Send;
}
