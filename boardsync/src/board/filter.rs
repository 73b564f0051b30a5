//! Display filters over a column's tasks.
//!
//! Filtering is presentation-only: it never changes the view and never
//! affects how indices for moves are interpreted.

use std::fmt;
use std::str::FromStr;

use boardsync_proto::{Priority, Task};
use chrono::NaiveDateTime;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Due-date window a task must fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueWindow {
    /// Due before today.
    Overdue,
    /// Due today.
    Today,
    /// Due within the next seven days.
    Week,
    /// Due within the next thirty days.
    Month,
}

impl FromStr for DueWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OVERDUE" => Ok(Self::Overdue),
            "TODAY" => Ok(Self::Today),
            "WEEK" => Ok(Self::Week),
            "MONTH" => Ok(Self::Month),
            other => Err(format!(
                "unknown due window: {other} (expected overdue, today, week or month)"
            )),
        }
    }
}

impl fmt::Display for DueWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overdue => write!(f, "overdue"),
            Self::Today => write!(f, "today"),
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
        }
    }
}

/// Conjunction of optional task predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Case-insensitive substring of the title or description.
    pub search: Option<String>,
    /// Exact priority.
    pub priority: Option<Priority>,
    /// Due-date window. Tasks without a due date always pass.
    pub due: Option<DueWindow>,
}

impl TaskFilter {
    /// Whether no predicate is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.search.is_none() && self.priority.is_none() && self.due.is_none()
    }

    /// Whether `task` passes every set predicate, evaluated at `now`.
    #[must_use]
    pub fn matches(&self, task: &Task, now: NaiveDateTime) -> bool {
        if let Some(query) = self.search.as_deref().filter(|q| !q.is_empty()) {
            let query = query.to_lowercase();
            let in_title = task.title.to_lowercase().contains(&query);
            let in_description = task
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&query));
            if !in_title && !in_description {
                return false;
            }
        }

        if let Some(priority) = self.priority
            && task.priority != priority
        {
            return false;
        }

        if let (Some(window), Some(due)) = (self.due, task.due_date) {
            let days = days_until(due, now);
            let inside = match window {
                DueWindow::Overdue => days < 0,
                DueWindow::Today => days == 0,
                DueWindow::Week => (0..=7).contains(&days),
                DueWindow::Month => (0..=30).contains(&days),
            };
            if !inside {
                return false;
            }
        }

        true
    }

    /// Returns the tasks that pass, in their original order.
    #[must_use]
    pub fn apply<'a>(&self, tasks: &'a [Task], now: NaiveDateTime) -> Vec<&'a Task> {
        tasks.iter().filter(|t| self.matches(t, now)).collect()
    }
}

/// Whole days from `now` until `due`, rounded up.
fn days_until(due: NaiveDateTime, now: NaiveDateTime) -> i64 {
    let seconds = (due - now).num_seconds();
    seconds.div_euclid(SECONDS_PER_DAY) + i64::from(seconds.rem_euclid(SECONDS_PER_DAY) != 0)
}
