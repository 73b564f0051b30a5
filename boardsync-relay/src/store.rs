//! In-memory authoritative board store.
//!
//! The [`BoardStore`] holds boards, columns, and tasks for the development
//! relay and is the single place where task versions are assigned. Every
//! accepted change bumps the task's `version` by one; a move carrying a
//! version other than the stored one is a conflict and is resolved according
//! to the configured [`ConflictPolicy`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use boardsync_proto::task::MAX_TASK_TITLE_LENGTH;
use boardsync_proto::{
    Board, BoardId, BoardMember, Column, ColumnId, CreateTaskRequest, Position, Priority, Role,
    Task, TaskId, TaskMoveRequest, UserId,
};
use chrono::{NaiveDateTime, Utc};
use tokio::sync::RwLock;

/// Gap left between a new task and the last task of its column.
const APPEND_STEP: f64 = 1024.0;

/// How the store reacts to a move whose version does not match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Refuse the move; the sender is told the current state.
    #[default]
    Reject,
    /// Apply the move on top of whatever is stored.
    Rebase,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => write!(f, "reject"),
            Self::Rebase => write!(f, "rebase"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "rebase" => Ok(Self::Rebase),
            other => Err(format!(
                "unknown conflict policy: {other} (expected reject or rebase)"
            )),
        }
    }
}

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No board with this id.
    #[error("board {0} not found")]
    BoardNotFound(BoardId),
    /// No column with this id (or it belongs to another board).
    #[error("column {0} not found")]
    ColumnNotFound(ColumnId),
    /// No task with this id.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),
    /// The move was issued against an outdated version.
    #[error("Task was modified by another user (current version {})", current.version)]
    VersionConflict {
        /// The task as currently stored.
        current: Box<Task>,
    },
    /// The request body failed validation.
    #[error("invalid request: {0}")]
    Validation(String),
}

/// Errors raised while loading a seed file.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// The seed file could not be read.
    #[error("failed to read seed file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The seed file is not valid JSON for [`Seed`].
    #[error("failed to parse seed file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Initial contents for a [`BoardStore`], as read from a JSON seed file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct Seed {
    /// Boards to create.
    pub boards: Vec<Board>,
    /// Columns to create.
    pub columns: Vec<Column>,
    /// Tasks to create.
    pub tasks: Vec<Task>,
}

#[derive(Default)]
struct Inner {
    boards: HashMap<BoardId, Board>,
    columns: HashMap<ColumnId, Column>,
    tasks: HashMap<TaskId, Task>,
    next_task_id: i64,
}

impl Inner {
    fn board_of_column(&self, column: ColumnId) -> Option<BoardId> {
        self.columns.get(&column).map(|c| c.board_id)
    }

    fn allocate_task_id(&mut self) -> TaskId {
        self.next_task_id += 1;
        TaskId::new(self.next_task_id)
    }

    fn tail_position(&self, column: ColumnId) -> Position {
        self.tasks
            .values()
            .filter(|t| t.column_id == column)
            .map(|t| t.position)
            .max()
            .map_or(Position::new(0.0), |last| {
                Position::new(last.value() + APPEND_STEP)
            })
    }

    fn put_task(&mut self, task: Task) {
        self.next_task_id = self.next_task_id.max(task.id.get());
        self.tasks.insert(task.id, task);
    }
}

/// Thread-safe in-memory store of boards, columns, and tasks.
pub struct BoardStore {
    inner: RwLock<Inner>,
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Creates a store populated from a [`Seed`].
    #[must_use]
    pub fn from_seed(seed: Seed) -> Self {
        let mut inner = Inner::default();
        for board in seed.boards {
            inner.boards.insert(board.id, board);
        }
        for column in seed.columns {
            inner.columns.insert(column.id, column);
        }
        for task in seed.tasks {
            inner.put_task(task);
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Loads a store from a JSON seed file.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError`] if the file cannot be read or parsed.
    pub fn load_seed_file(path: &Path) -> Result<Self, SeedError> {
        let contents = std::fs::read_to_string(path).map_err(|e| SeedError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let seed: Seed = serde_json::from_str(&contents)?;
        Ok(Self::from_seed(seed))
    }

    /// Creates a store holding one demo board with the default three
    /// columns and a handful of tasks.
    #[must_use]
    pub fn demo() -> Self {
        let board_id = BoardId::new(1);
        let owner = UserId::new(1);
        let board = Board {
            id: board_id,
            name: "Demo board".to_string(),
            owner_id: Some(owner),
            members: vec![BoardMember {
                user_id: owner,
                username: Some("demo".to_string()),
                role: Role::Owner,
            }],
        };
        let columns: Vec<Column> = ["To Do", "In Progress", "Done"]
            .iter()
            .zip(1_i64..)
            .zip(0_i32..)
            .map(|((title, id), position)| Column {
                id: ColumnId::new(id),
                board_id,
                title: (*title).to_string(),
                position,
            })
            .collect();

        let now = now();
        let mut tasks = Vec::new();
        for (id, column, position, title, priority) in [
            (1, 1, 0.0, "Draft release notes", Priority::Medium),
            (2, 1, APPEND_STEP, "Triage bug reports", Priority::High),
            (3, 2, 0.0, "Review drag-and-drop PR", Priority::Urgent),
            (4, 3, 0.0, "Set up CI", Priority::Low),
        ] {
            let mut task = Task::new(
                TaskId::new(id),
                ColumnId::new(column),
                title,
                Position::new(position),
                0,
            );
            task.priority = priority;
            task.created_at = Some(now);
            task.updated_at = Some(now);
            tasks.push(task);
        }

        Self::from_seed(Seed {
            boards: vec![board],
            columns,
            tasks,
        })
    }

    /// Inserts or replaces a board.
    pub async fn put_board(&self, board: Board) {
        self.inner.write().await.boards.insert(board.id, board);
    }

    /// Inserts or replaces a column.
    pub async fn put_column(&self, column: Column) {
        self.inner.write().await.columns.insert(column.id, column);
    }

    /// Inserts or replaces a task as-is, version included.
    pub async fn put_task(&self, task: Task) {
        self.inner.write().await.put_task(task);
    }

    /// Returns board metadata.
    pub async fn board(&self, id: BoardId) -> Option<Board> {
        self.inner.read().await.boards.get(&id).cloned()
    }

    /// Returns a single task.
    pub async fn task(&self, id: TaskId) -> Option<Task> {
        self.inner.read().await.tasks.get(&id).cloned()
    }

    /// Returns the board a column belongs to.
    pub async fn board_of_column(&self, column: ColumnId) -> Option<BoardId> {
        self.inner.read().await.board_of_column(column)
    }

    /// Returns a board's columns ordered by their ordinal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BoardNotFound`] for an unknown board.
    pub async fn columns(&self, board: BoardId) -> Result<Vec<Column>, StoreError> {
        let inner = self.inner.read().await;
        if !inner.boards.contains_key(&board) {
            return Err(StoreError::BoardNotFound(board));
        }
        let mut columns: Vec<Column> = inner
            .columns
            .values()
            .filter(|c| c.board_id == board)
            .cloned()
            .collect();
        drop(inner);
        columns.sort_by_key(|c| (c.position, c.id));
        Ok(columns)
    }

    /// Returns a column's tasks ordered by position, ties by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ColumnNotFound`] for an unknown column.
    pub async fn tasks(&self, column: ColumnId) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.read().await;
        if !inner.columns.contains_key(&column) {
            return Err(StoreError::ColumnNotFound(column));
        }
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.column_id == column)
            .cloned()
            .collect();
        drop(inner);
        tasks.sort_by_key(|t| (t.position, t.id));
        Ok(tasks)
    }

    /// Creates a task at the tail of its column with version 0.
    ///
    /// Returns the owning board alongside the new record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a bad title and
    /// [`StoreError::ColumnNotFound`] for an unknown column.
    pub async fn create_task(&self, req: CreateTaskRequest) -> Result<(BoardId, Task), StoreError> {
        validate_title(&req.title)?;
        let mut inner = self.inner.write().await;
        let board = inner
            .board_of_column(req.column_id)
            .ok_or(StoreError::ColumnNotFound(req.column_id))?;

        let id = inner.allocate_task_id();
        let position = inner.tail_position(req.column_id);
        let now = now();
        let task = Task {
            id,
            title: req.title,
            description: req.description,
            position,
            column_id: req.column_id,
            assigned_to_id: req.assigned_to_id,
            assigned_to_username: None,
            due_date: req.due_date,
            priority: req.priority,
            color: req.color,
            version: 0,
            created_at: Some(now),
            updated_at: Some(now),
        };
        inner.tasks.insert(id, task.clone());
        drop(inner);
        Ok((board, task))
    }

    /// Replaces a task's editable fields and bumps its version.
    ///
    /// `req.column_id` is ignored; columns only change through moves.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a bad title and
    /// [`StoreError::TaskNotFound`] for an unknown task.
    pub async fn update_task(
        &self,
        id: TaskId,
        req: CreateTaskRequest,
    ) -> Result<(BoardId, Task), StoreError> {
        validate_title(&req.title)?;
        let mut inner = self.inner.write().await;
        let column = inner
            .tasks
            .get(&id)
            .map(|t| t.column_id)
            .ok_or(StoreError::TaskNotFound(id))?;
        let board = inner
            .board_of_column(column)
            .ok_or(StoreError::ColumnNotFound(column))?;
        let task = inner.tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;

        task.title = req.title;
        task.description = req.description;
        task.assigned_to_id = req.assigned_to_id;
        task.due_date = req.due_date;
        task.priority = req.priority;
        task.color = req.color;
        task.version += 1;
        task.updated_at = Some(now());
        let updated = task.clone();
        drop(inner);
        Ok((board, updated))
    }

    /// Deletes a task, returning its owning board and last record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] for an unknown task.
    pub async fn delete_task(&self, id: TaskId) -> Result<(BoardId, Task), StoreError> {
        let mut inner = self.inner.write().await;
        let task = inner.tasks.remove(&id).ok_or(StoreError::TaskNotFound(id))?;
        let board = inner
            .board_of_column(task.column_id)
            .ok_or(StoreError::ColumnNotFound(task.column_id))?;
        drop(inner);
        Ok((board, task))
    }

    /// Applies a move command issued on `board`'s destination.
    ///
    /// The task and the target column must both belong to `board`. A
    /// matching version is applied and bumped; a mismatch is rejected with
    /// [`StoreError::VersionConflict`] under [`ConflictPolicy::Reject`] and
    /// applied anyway under [`ConflictPolicy::Rebase`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the task or column is unknown or the
    /// version conflicts.
    pub async fn move_task(
        &self,
        board: BoardId,
        req: &TaskMoveRequest,
        policy: ConflictPolicy,
    ) -> Result<Task, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.board_of_column(req.target_column_id) != Some(board) {
            return Err(StoreError::ColumnNotFound(req.target_column_id));
        }
        let source = inner
            .tasks
            .get(&req.task_id)
            .map(|t| t.column_id)
            .ok_or(StoreError::TaskNotFound(req.task_id))?;
        if inner.board_of_column(source) != Some(board) {
            return Err(StoreError::TaskNotFound(req.task_id));
        }
        let task = inner
            .tasks
            .get_mut(&req.task_id)
            .ok_or(StoreError::TaskNotFound(req.task_id))?;

        if task.version != req.version && policy == ConflictPolicy::Reject {
            return Err(StoreError::VersionConflict {
                current: Box::new(task.clone()),
            });
        }

        task.column_id = req.target_column_id;
        task.position = req.new_position;
        task.version += 1;
        task.updated_at = Some(now());
        let moved = task.clone();
        drop(inner);
        Ok(moved)
    }
}

fn validate_title(title: &str) -> Result<(), StoreError> {
    if title.trim().is_empty() {
        return Err(StoreError::Validation("title must not be blank".to_string()));
    }
    if title.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(StoreError::Validation(format!(
            "title exceeds {MAX_TASK_TITLE_LENGTH} characters"
        )));
    }
    Ok(())
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
