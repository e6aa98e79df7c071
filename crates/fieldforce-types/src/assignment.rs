//! Hierarchy edges
//!
//! An `Assignment` is a directed edge from a subordinate to its superior.
//! Edges are soft-deactivated and never rewritten: a reassignment closes the
//! old row and appends a new one, so the table doubles as the audit history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{ParseEnumError, Role};

/// The two edge kinds of the two-level forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    MarketerToAdmin,
    AdminToSuperAdmin,
}

impl AssignmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentKind::MarketerToAdmin => "marketer_to_admin",
            AssignmentKind::AdminToSuperAdmin => "admin_to_superadmin",
        }
    }

    pub fn subordinate_role(&self) -> Role {
        match self {
            AssignmentKind::MarketerToAdmin => Role::Marketer,
            AssignmentKind::AdminToSuperAdmin => Role::Admin,
        }
    }

    pub fn superior_role(&self) -> Role {
        match self {
            AssignmentKind::MarketerToAdmin => Role::Admin,
            AssignmentKind::AdminToSuperAdmin => Role::SuperAdmin,
        }
    }

    /// The kind of outgoing edge a user of `role` can hold, if any.
    pub fn for_subordinate(role: Role) -> Option<Self> {
        match role {
            Role::Marketer => Some(AssignmentKind::MarketerToAdmin),
            Role::Admin => Some(AssignmentKind::AdminToSuperAdmin),
            Role::SuperAdmin | Role::MasterAdmin => None,
        }
    }

    /// The kind of incoming edge a superior of `role` can receive, if any.
    pub fn for_superior(role: Role) -> Option<Self> {
        match role {
            Role::Admin => Some(AssignmentKind::MarketerToAdmin),
            Role::SuperAdmin => Some(AssignmentKind::AdminToSuperAdmin),
            Role::Marketer | Role::MasterAdmin => None,
        }
    }
}

impl fmt::Display for AssignmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "marketer_to_admin" => Ok(AssignmentKind::MarketerToAdmin),
            "admin_to_superadmin" => Ok(AssignmentKind::AdminToSuperAdmin),
            other => Err(ParseEnumError::new("assignment_kind", other)),
        }
    }
}

/// One hierarchy edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: Uuid,
    pub subordinate_id: Uuid,
    pub superior_id: Uuid,
    pub kind: AssignmentKind,
    pub active: bool,
    pub assigned_by: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub deactivated_by: Option<Uuid>,
}

impl Assignment {
    /// A fresh, active edge.
    pub fn new(subordinate_id: Uuid, superior_id: Uuid, kind: AssignmentKind, by: Uuid) -> Self {
        Self {
            assignment_id: Uuid::new_v4(),
            subordinate_id,
            superior_id,
            kind,
            active: true,
            assigned_by: by,
            assigned_at: Utc::now(),
            deactivated_at: None,
            deactivated_by: None,
        }
    }

    /// Close the edge. History rows are kept; only the flag and stamps move.
    pub fn deactivate(&mut self, by: Uuid, at: DateTime<Utc>) {
        self.active = false;
        self.deactivated_at = Some(at);
        self.deactivated_by = Some(by);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roles_are_consistent() {
        for kind in [
            AssignmentKind::MarketerToAdmin,
            AssignmentKind::AdminToSuperAdmin,
        ] {
            assert_eq!(AssignmentKind::for_subordinate(kind.subordinate_role()), Some(kind));
            assert_eq!(AssignmentKind::for_superior(kind.superior_role()), Some(kind));
        }
        assert_eq!(AssignmentKind::for_subordinate(Role::SuperAdmin), None);
        assert_eq!(AssignmentKind::for_superior(Role::MasterAdmin), None);
    }

    #[test]
    fn test_deactivate_keeps_row_identity() {
        let by = Uuid::new_v4();
        let mut edge = Assignment::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AssignmentKind::MarketerToAdmin,
            by,
        );
        let id = edge.assignment_id;
        edge.deactivate(by, Utc::now());

        assert_eq!(edge.assignment_id, id);
        assert!(!edge.active);
        assert_eq!(edge.deactivated_by, Some(by));
    }

    #[test]
    fn test_kind_parse_rejects_unknown() {
        assert_eq!(
            "admin_to_superadmin".parse::<AssignmentKind>().unwrap(),
            AssignmentKind::AdminToSuperAdmin
        );
        assert!("admin_to_master".parse::<AssignmentKind>().is_err());
    }
}
