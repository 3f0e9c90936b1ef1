//! Role lookup and role-gated capabilities.
//!
//! Identity is owned by an external service; the board only maps an opaque
//! user id to a [`Role`] and derives which view and actions it may use.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::BoardError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Workstation,
    Line,
}

/// The screen a role lands on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum View {
    MasterConsole,
    WarehouseQueue,
    LineTablet,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Workstation => "workstation",
            Self::Line => "line",
        }
    }

    pub fn view(&self) -> View {
        match self {
            Self::Admin => View::MasterConsole,
            Self::Workstation => View::WarehouseQueue,
            Self::Line => View::LineTablet,
        }
    }

    pub fn can_submit(&self) -> bool {
        true
    }

    pub fn can_fulfill(&self) -> bool {
        matches!(self, Self::Admin | Self::Workstation)
    }

    /// Deleting single requests and resetting the board.
    pub fn can_administer(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "workstation" => Ok(Self::Workstation),
            "line" => Ok(Self::Line),
            _ => Err(BoardError::InvalidRole(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleAssignment {
    pub user_id: String,
    pub role: Role,
    pub view: View,
}

impl RoleAssignment {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            view: role.view(),
        }
    }
}

/// External identity → role lookup.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn role_for(&self, user_id: &str) -> Result<Option<Role>, BoardError>;
    async fn assign_role(&self, user_id: &str, role: Role) -> Result<(), BoardError>;
}
