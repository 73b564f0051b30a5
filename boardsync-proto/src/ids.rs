//! Numeric identifier newtypes for boards, columns, tasks, and users.
//!
//! The CRUD service issues 64-bit integer identifiers. Each kind gets its
//! own newtype so a `ColumnId` can never be passed where a `TaskId` is
//! expected. All of them serialize as bare JSON numbers.

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identifier issued by the CRUD service.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw identifier value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

numeric_id!(
    /// Identifies a board.
    BoardId
);
numeric_id!(
    /// Identifies a column within a board.
    ColumnId
);
numeric_id!(
    /// Identifies a task.
    TaskId
);
numeric_id!(
    /// Identifies a user account.
    UserId
);
