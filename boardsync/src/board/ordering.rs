//! Position arithmetic for tasks within a column.
//!
//! Tasks carry a real-valued [`Position`]; a column is displayed in
//! ascending position order with ties broken by task id. Moving a task only
//! ever assigns a new position to the moved task, so no other task in the
//! destination column is renumbered.
//!
//! Target indices are interpreted against the destination sequence with
//! the moved task removed, so "index 2" always means "between whatever is
//! at 1 and 2 once I'm gone".

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use boardsync_proto::{Position, Task, TaskId};

/// Gap between a new head/tail position and its single neighbour.
pub const STEP: f64 = 1024.0;

/// Position assigned to the only task of an empty column.
pub const BASELINE: f64 = 0.0;

/// Where a moved task should land in the destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetIndex {
    /// Before every other task.
    Top,
    /// Immediately before the given task.
    Before(TaskId),
    /// After every other task.
    End,
    /// At a numeric index; values past the end clamp to the end.
    At(usize),
}

/// How a destination index is chosen for a move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlacementPolicy {
    /// Honour the requested index, placing the task at the midpoint of its
    /// new neighbours.
    #[default]
    Midpoint,
    /// Ignore the requested index and always place at the head of the
    /// destination column. Same-column moves are no-ops under this policy.
    ///
    /// This is a simplification kept for parity with older clients.
    HeadOnly,
}

impl fmt::Display for PlacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Midpoint => write!(f, "midpoint"),
            Self::HeadOnly => write!(f, "head-only"),
        }
    }
}

impl FromStr for PlacementPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "midpoint" => Ok(Self::Midpoint),
            "head-only" | "head_only" | "headonly" => Ok(Self::HeadOnly),
            other => Err(format!(
                "unknown placement policy: {other} (expected midpoint or head-only)"
            )),
        }
    }
}

/// Errors from position computation.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum OrderingError {
    /// The neighbours are too close for a strictly-between value to exist.
    #[error("no position left between {before} and {after}")]
    PrecisionExhausted {
        /// Position of the task that would precede the moved task.
        before: Position,
        /// Position of the task that would follow the moved task.
        after: Position,
    },
    /// `TargetIndex::Before` named a task that is not in the column.
    #[error("anchor task {0} is not in the destination column")]
    AnchorNotFound(TaskId),
}

/// A computed landing spot for a moved task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Index in the destination sequence (moved task excluded).
    pub index: usize,
    /// Position to assign to the moved task.
    pub position: Position,
}

/// Display order of two tasks: position, then id.
#[must_use]
pub fn compare(a: &Task, b: &Task) -> Ordering {
    a.position.cmp(&b.position).then(a.id.cmp(&b.id))
}

/// Sorts a column into display order.
pub fn sort_column(tasks: &mut [Task]) {
    tasks.sort_by(compare);
}

/// Returns a position strictly between the given neighbours.
///
/// A missing `before` means "insert at the head", a missing `after` means
/// "insert at the tail", and both missing means the column is empty.
///
/// # Errors
///
/// Returns [`OrderingError::PrecisionExhausted`] when no representable
/// value lies strictly between the neighbours.
pub fn position_between(
    before: Option<Position>,
    after: Option<Position>,
) -> Result<Position, OrderingError> {
    let candidate = match (before, after) {
        (None, None) => return Ok(Position::new(BASELINE)),
        (None, Some(a)) => a.value() - STEP,
        (Some(b), None) => b.value() + STEP,
        (Some(b), Some(a)) => b.value() + (a.value() - b.value()) / 2.0,
    };
    let candidate = Position::new(candidate);

    let after_before = before.is_none_or(|b| candidate > b);
    let before_after = after.is_none_or(|a| candidate < a);
    if candidate.value().is_finite() && after_before && before_after {
        Ok(candidate)
    } else {
        Err(OrderingError::PrecisionExhausted {
            before: before.unwrap_or(candidate),
            after: after.unwrap_or(candidate),
        })
    }
}

/// Resolves a [`TargetIndex`] against a sequence that excludes the moved
/// task.
///
/// # Errors
///
/// Returns [`OrderingError::AnchorNotFound`] if a `Before` anchor is absent.
pub fn resolve_index(others: &[&Task], target: TargetIndex) -> Result<usize, OrderingError> {
    match target {
        TargetIndex::Top => Ok(0),
        TargetIndex::End => Ok(others.len()),
        TargetIndex::At(i) => Ok(i.min(others.len())),
        TargetIndex::Before(anchor) => others
            .iter()
            .position(|t| t.id == anchor)
            .ok_or(OrderingError::AnchorNotFound(anchor)),
    }
}

/// Computes where `moving` lands in `column` (the destination column's
/// current display-ordered sequence, which may or may not contain it).
///
/// # Errors
///
/// Returns [`OrderingError`] if the anchor is unknown or the neighbours
/// leave no room.
pub fn place(
    column: &[Task],
    moving: TaskId,
    target: TargetIndex,
    policy: PlacementPolicy,
) -> Result<Placement, OrderingError> {
    let others: Vec<&Task> = column.iter().filter(|t| t.id != moving).collect();
    let index = match policy {
        PlacementPolicy::Midpoint => resolve_index(&others, target)?,
        PlacementPolicy::HeadOnly => 0,
    };
    let before = index
        .checked_sub(1)
        .and_then(|i| others.get(i))
        .map(|t| t.position);
    let after = others.get(index).map(|t| t.position);
    let position = position_between(before, after)?;
    Ok(Placement { index, position })
}
