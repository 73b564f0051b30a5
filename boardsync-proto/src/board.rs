//! Board and column records returned by the CRUD service.

use serde::{Deserialize, Serialize};

use crate::ids::{BoardId, ColumnId, UserId};

/// Role a user holds on a board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Created the board; exactly one per board.
    Owner,
    /// Can manage members and columns.
    Admin,
    /// Can edit and move tasks.
    #[default]
    Member,
    /// Read-only access.
    Viewer,
}

impl Role {
    /// Whether this role may create, edit, or move tasks.
    #[must_use]
    pub const fn can_edit(self) -> bool {
        !matches!(self, Self::Viewer)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "OWNER"),
            Self::Admin => write!(f, "ADMIN"),
            Self::Member => write!(f, "MEMBER"),
            Self::Viewer => write!(f, "VIEWER"),
        }
    }
}

/// A user's membership on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMember {
    /// The member.
    pub user_id: UserId,
    /// Display name of the member.
    #[serde(default)]
    pub username: Option<String>,
    /// The member's role.
    #[serde(default)]
    pub role: Role,
}

/// Board metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    /// Board identifier.
    pub id: BoardId,
    /// Display name.
    pub name: String,
    /// Owning user.
    #[serde(default)]
    pub owner_id: Option<UserId>,
    /// Members and their roles (the owner included).
    #[serde(default)]
    pub members: Vec<BoardMember>,
}

impl Board {
    /// Returns the role `user` holds on this board, if any.
    ///
    /// The owner is reported as [`Role::Owner`] even when the member list
    /// omits them.
    #[must_use]
    pub fn role_of(&self, user: UserId) -> Option<Role> {
        if self.owner_id == Some(user) {
            return Some(Role::Owner);
        }
        self.members
            .iter()
            .find(|m| m.user_id == user)
            .map(|m| m.role)
    }
}

/// A column of a board.
///
/// `position` is the left-to-right ordinal among sibling columns and is
/// unique per board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column identifier.
    pub id: ColumnId,
    /// Owning board.
    pub board_id: BoardId,
    /// Display title.
    pub title: String,
    /// Ordinal among sibling columns.
    pub position: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> Board {
        Board {
            id: BoardId::new(1),
            name: "Roadmap".to_string(),
            owner_id: Some(UserId::new(10)),
            members: vec![
                BoardMember {
                    user_id: UserId::new(11),
                    username: Some("bo".to_string()),
                    role: Role::Viewer,
                },
                BoardMember {
                    user_id: UserId::new(12),
                    username: None,
                    role: Role::Admin,
                },
            ],
        }
    }

    #[test]
    fn owner_role_wins_even_if_not_listed() {
        assert_eq!(board().role_of(UserId::new(10)), Some(Role::Owner));
    }

    #[test]
    fn member_roles_are_resolved() {
        let b = board();
        assert_eq!(b.role_of(UserId::new(11)), Some(Role::Viewer));
        assert_eq!(b.role_of(UserId::new(12)), Some(Role::Admin));
        assert_eq!(b.role_of(UserId::new(99)), None);
    }

    #[test]
    fn viewers_cannot_edit() {
        assert!(!Role::Viewer.can_edit());
        assert!(Role::Member.can_edit());
        assert!(Role::Owner.can_edit());
    }

    #[test]
    fn column_parses_from_server_json() {
        let col: Column =
            serde_json::from_str(r#"{"id":3,"title":"Doing","position":1,"boardId":1}"#).unwrap();
        assert_eq!(col.id, ColumnId::new(3));
        assert_eq!(col.board_id, BoardId::new(1));
        assert_eq!(col.position, 1);
    }

    #[test]
    fn member_role_defaults_to_member() {
        let m: BoardMember = serde_json::from_str(r#"{"userId":4}"#).unwrap();
        assert_eq!(m.role, Role::Member);
    }
}
