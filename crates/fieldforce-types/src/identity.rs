//! Users, roles and call-site actors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ParseEnumError;

/// The four disjoint tiers. A user's role never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Marketer,
    Admin,
    SuperAdmin,
    MasterAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Marketer => "marketer",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
            Role::MasterAdmin => "master_admin",
        }
    }

    /// Reviewer tiers may act on submissions; marketers may not.
    pub fn is_reviewer(&self) -> bool {
        match self {
            Role::Marketer => false,
            Role::Admin | Role::SuperAdmin | Role::MasterAdmin => true,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "marketer" => Ok(Role::Marketer),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            "master_admin" => Ok(Role::MasterAdmin),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

/// A user as supplied by the identity collaborator. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    /// Free-form region tag; only used to filter superior listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl User {
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            name: name.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
        }
    }
}

/// Authenticated caller identity, trusted as passed in by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_master_admin(&self) -> bool {
        self.role == Role::MasterAdmin
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.id)
    }
}
