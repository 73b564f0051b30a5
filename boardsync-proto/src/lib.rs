//! Shared protocol definitions for the `BoardSync` wire format.

pub mod board;
pub mod codec;
pub mod ids;
pub mod relay;
pub mod task;

pub use board::{Board, BoardMember, Column, Role};
pub use ids::{BoardId, ColumnId, TaskId, UserId};
pub use task::{CreateTaskRequest, MAX_TASK_TITLE_LENGTH, Position, Priority, Task, TaskMoveRequest};
