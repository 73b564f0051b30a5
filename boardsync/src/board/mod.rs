//! Board state and the synchronous algorithms that change it.
//!
//! Everything here is pure: no I/O, no async. The session controller owns
//! the [`BoardView`] and calls [`apply_local_move`] for user moves and
//! [`apply_remote`] for authoritative records from the channel or the CRUD
//! service.

pub mod filter;
pub mod mutator;
pub mod ordering;
pub mod reconcile;
pub mod state;

pub use filter::{DueWindow, TaskFilter};
pub use mutator::{MoveOutcome, apply_local_move};
pub use ordering::{OrderingError, PlacementPolicy, TargetIndex};
pub use reconcile::{ReconcileOutcome, apply_remote, remove_task, revert_move};
pub use state::{BoardView, PendingMove};

use boardsync_proto::{ColumnId, TaskId};

/// Errors from local board operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoardError {
    /// The task is not in the current view.
    #[error("task {0} not found on this board")]
    TaskNotFound(TaskId),
    /// The column is not in the current view.
    #[error("column {0} not found on this board")]
    ColumnNotFound(ColumnId),
    /// No position could be computed for the move.
    #[error(transparent)]
    Ordering(#[from] OrderingError),
}
