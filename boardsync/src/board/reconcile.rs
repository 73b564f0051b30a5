//! Merging authoritative task records into a [`BoardView`].
//!
//! Per task, the server-assigned `version` is the only ordering that
//! matters: a record is applied only if it is newer than anything already
//! accepted for that task. A task with an unconfirmed local move is held to
//! the same rule against the version the move was issued at: the first
//! newer record is the server's answer and replaces the local prediction
//! whatever it says.
//!
//! Applying a record always removes the task from every column before
//! inserting it into its own, so nothing about delivery order or a previous
//! optimistic move can leave a task in two places.

use boardsync_proto::{ColumnId, Task, TaskId};

use super::state::BoardView;

/// What happened to an incoming task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A newer record was applied.
    Applied,
    /// A pending local move was confirmed exactly as predicted.
    Confirmed,
    /// A pending local move was superseded by a different authoritative
    /// state.
    ConflictResolved {
        /// Column the local move had predicted.
        predicted: ColumnId,
        /// Column the server settled on.
        authoritative: ColumnId,
    },
    /// The record was not newer than what is held and was discarded.
    Stale {
        /// Version already held for the task.
        held: u64,
        /// Version carried by the discarded record.
        incoming: u64,
    },
    /// The record was accepted but its column is not part of this view, so
    /// the task left the view.
    OutOfView,
}

impl ReconcileOutcome {
    /// Whether the record changed the view.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        !matches!(self, Self::Stale { .. })
    }
}

/// Applies an authoritative task record to `view`.
pub fn apply_remote(view: &mut BoardView, task: Task) -> ReconcileOutcome {
    let id = task.id;
    let incoming = task.version;

    let outcome = if let Some(pending) = view.pending(id).copied() {
        if incoming <= pending.observed_version {
            // Accepting a move bumps the version, so this predates the answer.
            return stale(view, id, pending.observed_version, incoming);
        }
        if task.column_id == pending.column_id && task.position == pending.position {
            ReconcileOutcome::Confirmed
        } else {
            ReconcileOutcome::ConflictResolved {
                predicted: pending.column_id,
                authoritative: task.column_id,
            }
        }
    } else {
        if let Some(held) = view.held_version(id)
            && incoming <= held
        {
            return stale(view, id, held, incoming);
        }
        ReconcileOutcome::Applied
    };

    view.clear_pending(id);
    view.record_version(id, incoming);
    view.remove_everywhere(id);
    let column = task.column_id;
    if !view.insert_sorted(task) {
        tracing::debug!(task_id = %id, column_id = %column, "task moved out of view");
        return ReconcileOutcome::OutOfView;
    }

    match outcome {
        ReconcileOutcome::ConflictResolved { .. } => {
            tracing::info!(task_id = %id, version = incoming, "local move superseded by server state");
        }
        _ => tracing::debug!(task_id = %id, version = incoming, ?outcome, "task update applied"),
    }
    outcome
}

/// Removes a task that the CRUD service confirmed deleted.
///
/// The version high-water mark is kept so a late update cannot bring the
/// task back. Returns the removed record, if it was in view.
pub fn remove_task(view: &mut BoardView, id: TaskId) -> Option<Task> {
    view.clear_pending(id);
    view.remove_everywhere(id)
}

/// Undoes a pending move the relay refused.
///
/// The task goes back to the column and position of the last authoritative
/// record, which an optimistic move never changes the version of. Returns
/// `false` if the task had no pending move.
pub fn revert_move(view: &mut BoardView, id: TaskId) -> bool {
    let Some(pending) = view.clear_pending(id) else {
        return false;
    };
    if let Some(mut task) = view.remove_everywhere(id) {
        task.column_id = pending.origin_column;
        task.position = pending.origin_position;
        view.insert_sorted(task);
    }
    tracing::info!(
        task_id = %id,
        column_id = %pending.origin_column,
        "refused move rolled back"
    );
    true
}

fn stale(view: &BoardView, id: TaskId, held: u64, incoming: u64) -> ReconcileOutcome {
    tracing::debug!(
        board_id = %view.board_id(),
        task_id = %id,
        held,
        incoming,
        "stale task update discarded"
    );
    ReconcileOutcome::Stale { held, incoming }
}
