//! Client-local board view state.
//!
//! A [`BoardView`] is the client's picture of one board: its ordered columns,
//! each column's tasks in display order, which tasks have an unconfirmed
//! local move, and the greatest version accepted for every task seen so far.
//!
//! Only the reconciliation and mutator functions in this module's siblings
//! change a view; everything public here is read-only.

use std::collections::HashMap;

use boardsync_proto::{Board, BoardId, Column, ColumnId, Position, Task, TaskId};

use super::ordering::{compare, sort_column};

/// Prediction recorded for a task with an unconfirmed local move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMove {
    /// Version of the task when the move was issued.
    pub observed_version: u64,
    /// Column the task was moved to locally.
    pub column_id: ColumnId,
    /// Position the task was given locally.
    pub position: Position,
    /// Column of the last authoritative record.
    pub origin_column: ColumnId,
    /// Position of the last authoritative record.
    pub origin_position: Position,
}

/// Ordered snapshot of a board as seen by this client.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardView {
    board: Board,
    columns: Vec<Column>,
    tasks: HashMap<ColumnId, Vec<Task>>,
    pending: HashMap<TaskId, PendingMove>,
    high_water: HashMap<TaskId, u64>,
}

impl BoardView {
    /// Builds a view from freshly loaded data.
    ///
    /// Columns are ordered by ordinal and each column's tasks by position.
    /// Tasks whose `column_id` disagrees with the column they were listed
    /// under are filed under their own `column_id` when that column is part
    /// of the board, and dropped otherwise.
    #[must_use]
    pub fn new(board: Board, mut columns: Vec<Column>, tasks: Vec<(ColumnId, Vec<Task>)>) -> Self {
        columns.sort_by_key(|c| (c.position, c.id));
        let mut by_column: HashMap<ColumnId, Vec<Task>> =
            columns.iter().map(|c| (c.id, Vec::new())).collect();
        let mut high_water = HashMap::new();

        for task in tasks.into_iter().flat_map(|(_, list)| list) {
            let Some(list) = by_column.get_mut(&task.column_id) else {
                tracing::debug!(
                    task_id = %task.id,
                    column_id = %task.column_id,
                    "task outside board, dropped"
                );
                continue;
            };
            let (id, version) = (task.id, task.version);
            // A task listed twice keeps its newest record.
            if let Some(existing) = list.iter_mut().find(|t| t.id == id) {
                if version > existing.version {
                    *existing = task;
                }
            } else {
                list.push(task);
            }
            let hw = high_water.entry(id).or_insert(version);
            *hw = (*hw).max(version);
        }
        for list in by_column.values_mut() {
            sort_column(list);
        }

        Self {
            board,
            columns,
            tasks: by_column,
            pending: HashMap::new(),
            high_water,
        }
    }

    /// Board identifier.
    #[must_use]
    pub const fn board_id(&self) -> BoardId {
        self.board.id
    }

    /// Board metadata.
    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    /// Columns in left-to-right order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Looks up a column.
    #[must_use]
    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Whether a column is part of this view.
    #[must_use]
    pub fn has_column(&self, id: ColumnId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Tasks of a column in display order; empty for unknown columns.
    #[must_use]
    pub fn tasks(&self, column: ColumnId) -> &[Task] {
        self.tasks.get(&column).map_or(&[], Vec::as_slice)
    }

    /// Iterates columns with their tasks, left to right.
    pub fn iter_columns(&self) -> impl Iterator<Item = (&Column, &[Task])> {
        self.columns.iter().map(|c| (c, self.tasks(c.id)))
    }

    /// Looks up a task in any column.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.values().flatten().find(|t| t.id == id)
    }

    /// Returns the column and index currently holding a task.
    #[must_use]
    pub fn locate(&self, id: TaskId) -> Option<(ColumnId, usize)> {
        self.tasks.iter().find_map(|(column, list)| {
            list.iter().position(|t| t.id == id).map(|i| (*column, i))
        })
    }

    /// Total number of tasks in view.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.values().map(Vec::len).sum()
    }

    /// Ids of every task in view, column by column.
    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.columns
            .iter()
            .flat_map(|c| self.tasks(c.id).iter().map(|t| t.id))
    }

    /// Whether a task has an unconfirmed local move.
    #[must_use]
    pub fn is_pending(&self, id: TaskId) -> bool {
        self.pending.contains_key(&id)
    }

    /// The recorded prediction for a pending task.
    #[must_use]
    pub fn pending(&self, id: TaskId) -> Option<&PendingMove> {
        self.pending.get(&id)
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Greatest version accepted for a task, even if it has since left the
    /// view.
    #[must_use]
    pub fn held_version(&self, id: TaskId) -> Option<u64> {
        self.high_water.get(&id).copied()
    }

    pub(crate) fn remove_everywhere(&mut self, id: TaskId) -> Option<Task> {
        let mut removed = None;
        for list in self.tasks.values_mut() {
            if let Some(i) = list.iter().position(|t| t.id == id) {
                removed = Some(list.remove(i));
            }
        }
        removed
    }

    /// Inserts a task into its column in display order. Returns `false`
    /// (and drops the task) if the column is not in view.
    pub(crate) fn insert_sorted(&mut self, task: Task) -> bool {
        let Some(list) = self.tasks.get_mut(&task.column_id) else {
            return false;
        };
        let at = list.partition_point(|t| compare(t, &task).is_lt());
        list.insert(at, task);
        true
    }

    pub(crate) fn record_version(&mut self, id: TaskId, version: u64) {
        let hw = self.high_water.entry(id).or_insert(version);
        *hw = (*hw).max(version);
    }

    pub(crate) fn mark_pending(&mut self, id: TaskId, pending: PendingMove) {
        self.pending.insert(id, pending);
    }

    pub(crate) fn clear_pending(&mut self, id: TaskId) -> Option<PendingMove> {
        self.pending.remove(&id)
    }
}
