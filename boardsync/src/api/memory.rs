//! In-process [`BoardApi`] for tests and offline use.
//!
//! Behaves like the REST service: versions start at zero and go up by one
//! on every update, new tasks land at the tail of their column, and reads
//! come back sorted. Individual reads can be made to fail so partial-load
//! behaviour can be exercised.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use boardsync_proto::{
    Board, BoardId, Column, ColumnId, CreateTaskRequest, MAX_TASK_TITLE_LENGTH, Position, Task,
    TaskId,
};
use chrono::Utc;
use parking_lot::Mutex;

use super::{ApiError, BoardApi};
use crate::board::ordering::STEP;

#[derive(Default)]
struct Inner {
    boards: BTreeMap<BoardId, Board>,
    columns: BTreeMap<ColumnId, Column>,
    tasks: BTreeMap<TaskId, Task>,
    next_task: i64,
    failing_columns: HashSet<ColumnId>,
    requests: usize,
}

impl Inner {
    fn validate(request: &CreateTaskRequest) -> Result<(), ApiError> {
        let title = request.title.trim();
        if title.is_empty() || title.chars().count() > MAX_TASK_TITLE_LENGTH {
            return Err(ApiError::Status {
                status: 400,
                url: "memory:/tasks".to_string(),
                message: "Task title is required".to_string(),
            });
        }
        Ok(())
    }

    fn tail_position(&self, column: ColumnId) -> Position {
        self.tasks
            .values()
            .filter(|t| t.column_id == column)
            .map(|t| t.position)
            .max()
            .map_or(Position::new(0.0), |p| Position::new(p.value() + STEP))
    }
}

/// Shared in-memory board service. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryBoardApi {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBoardApi {
    /// Creates an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a board.
    pub fn put_board(&self, board: Board) {
        self.inner.lock().boards.insert(board.id, board);
    }

    /// Adds or replaces a column.
    pub fn put_column(&self, column: Column) {
        self.inner.lock().columns.insert(column.id, column);
    }

    /// Adds or replaces a task record exactly as given.
    pub fn put_task(&self, task: Task) {
        let mut inner = self.inner.lock();
        inner.next_task = inner.next_task.max(task.id.get());
        inner.tasks.insert(task.id, task);
    }

    /// Makes task reads for `column` fail with a `503`.
    pub fn fail_column(&self, column: ColumnId) {
        self.inner.lock().failing_columns.insert(column);
    }

    /// Clears every injected failure.
    pub fn heal(&self) {
        self.inner.lock().failing_columns.clear();
    }

    /// Current stored record for a task.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.inner.lock().tasks.get(&id).cloned()
    }

    /// Applies a move the way the realtime service does: rejects a stale
    /// version, otherwise stores the new column and position and bumps the
    /// version. Returns the stored record either way.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] if the task does not exist.
    pub fn apply_move(
        &self,
        task_id: TaskId,
        column: ColumnId,
        position: Position,
        version: u64,
    ) -> Result<(bool, Task), ApiError> {
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| ApiError::NotFound(format!("task {task_id}")))?;
        if task.version != version {
            return Ok((false, task.clone()));
        }
        task.column_id = column;
        task.position = position;
        task.version += 1;
        Ok((true, task.clone()))
    }

    /// Number of requests served so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.inner.lock().requests
    }
}

impl BoardApi for MemoryBoardApi {
    async fn fetch_board(&self, id: BoardId) -> Result<Board, ApiError> {
        let mut inner = self.inner.lock();
        inner.requests += 1;
        inner
            .boards
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("board {id}")))
    }

    async fn fetch_columns(&self, board_id: BoardId) -> Result<Vec<Column>, ApiError> {
        let mut inner = self.inner.lock();
        inner.requests += 1;
        if !inner.boards.contains_key(&board_id) {
            return Err(ApiError::NotFound(format!("board {board_id}")));
        }
        let mut columns: Vec<Column> = inner
            .columns
            .values()
            .filter(|c| c.board_id == board_id)
            .cloned()
            .collect();
        columns.sort_by_key(|c| (c.position, c.id));
        Ok(columns)
    }

    async fn fetch_tasks(&self, column_id: ColumnId) -> Result<Vec<Task>, ApiError> {
        let mut inner = self.inner.lock();
        inner.requests += 1;
        if inner.failing_columns.contains(&column_id) {
            return Err(ApiError::Status {
                status: 503,
                url: format!("memory:/tasks/column/{column_id}"),
                message: "injected failure".to_string(),
            });
        }
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.column_id == column_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.position, t.id));
        Ok(tasks)
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task, ApiError> {
        Inner::validate(request)?;
        let mut inner = self.inner.lock();
        inner.requests += 1;
        if !inner.columns.contains_key(&request.column_id) {
            return Err(ApiError::NotFound(format!("column {}", request.column_id)));
        }
        inner.next_task += 1;
        let id = TaskId::new(inner.next_task);
        let position = inner.tail_position(request.column_id);
        let mut task = Task::new(id, request.column_id, request.title.trim(), position, 0);
        task.description.clone_from(&request.description);
        task.assigned_to_id = request.assigned_to_id;
        task.due_date = request.due_date;
        task.priority = request.priority;
        task.color.clone_from(&request.color);
        task.created_at = Some(Utc::now().naive_utc());
        inner.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: TaskId, request: &CreateTaskRequest) -> Result<Task, ApiError> {
        Inner::validate(request)?;
        let mut inner = self.inner.lock();
        inner.requests += 1;
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("task {id}")))?;
        request.title.trim().clone_into(&mut task.title);
        task.description.clone_from(&request.description);
        task.assigned_to_id = request.assigned_to_id;
        task.due_date = request.due_date;
        task.priority = request.priority;
        task.color.clone_from(&request.color);
        task.updated_at = Some(Utc::now().naive_utc());
        task.version += 1;
        Ok(task.clone())
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        let mut inner = self.inner.lock();
        inner.requests += 1;
        inner
            .tasks
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("task {id}")))
    }
}
