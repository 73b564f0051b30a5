//! Optimistic local moves.
//!
//! A move is applied to the [`BoardView`] immediately and the task is marked
//! pending; the caller is handed the [`TaskMoveRequest`] to publish. The
//! task's version is left untouched: only authoritative records change
//! versions, and the reconciliation engine clears the pending mark when one
//! arrives.

use boardsync_proto::{ColumnId, TaskId, TaskMoveRequest};

use super::BoardError;
use super::ordering::{self, PlacementPolicy, TargetIndex};
use super::state::{BoardView, PendingMove};

/// Result of an optimistic move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The view changed; publish this command.
    Applied(TaskMoveRequest),
    /// The task is already where it was asked to go.
    NoOp,
}

/// Applies a move of `task_id` to `dest_column` at `target` to `view`.
///
/// Nothing in `view` changes unless `MoveOutcome::Applied` is returned.
///
/// # Errors
///
/// Returns [`BoardError::TaskNotFound`] or [`BoardError::ColumnNotFound`]
/// when either is not in view, and [`BoardError::Ordering`] when no position
/// can be computed.
pub fn apply_local_move(
    view: &mut BoardView,
    task_id: TaskId,
    dest_column: ColumnId,
    target: TargetIndex,
    policy: PlacementPolicy,
) -> Result<MoveOutcome, BoardError> {
    let (source_column, source_index) = view
        .locate(task_id)
        .ok_or(BoardError::TaskNotFound(task_id))?;
    if !view.has_column(dest_column) {
        return Err(BoardError::ColumnNotFound(dest_column));
    }

    let same_column = source_column == dest_column;
    if same_column && policy == PlacementPolicy::HeadOnly {
        return Ok(MoveOutcome::NoOp);
    }

    let placement = ordering::place(view.tasks(dest_column), task_id, target, policy)?;
    if same_column && placement.index == source_index {
        return Ok(MoveOutcome::NoOp);
    }

    let Some(mut task) = view.remove_everywhere(task_id) else {
        return Err(BoardError::TaskNotFound(task_id));
    };
    let observed_version = task.version;
    // A second move before the first is answered keeps the first origin.
    let (origin_column, origin_position) = view
        .pending(task_id)
        .map_or((task.column_id, task.position), |p| {
            (p.origin_column, p.origin_position)
        });
    task.column_id = dest_column;
    task.position = placement.position;
    view.insert_sorted(task);
    view.mark_pending(
        task_id,
        PendingMove {
            observed_version,
            column_id: dest_column,
            position: placement.position,
            origin_column,
            origin_position,
        },
    );

    tracing::debug!(
        task_id = %task_id,
        from = %source_column,
        to = %dest_column,
        index = placement.index,
        position = %placement.position,
        "optimistic move applied"
    );

    Ok(MoveOutcome::Applied(TaskMoveRequest {
        task_id,
        target_column_id: dest_column,
        new_position: placement.position,
        version: observed_version,
    }))
}
