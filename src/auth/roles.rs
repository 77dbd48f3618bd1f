// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Principal roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Principal roles for authorization.
///
/// ## Role Hierarchy
///
/// Declaration order is display precedence (`Owner` first).
///
/// - `Owner` - Tenant owner; cannot be granted, revoked or deleted in-band
/// - `Admin` - May administer other principals
/// - `Moderator` - Content moderation
/// - `DeliveryAgent` - Fulfilment staff
/// - `User` - Regular signed-up principal
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Top-privilege, non-removable role
    Owner,
    /// Administrative access to other principals
    Admin,
    /// Moderation staff
    Moderator,
    /// Delivery staff
    DeliveryAgent,
    /// Regular principal
    User,
}

impl Role {
    /// All roles in precedence order.
    pub const ALL: [Role; 5] = [
        Role::Owner,
        Role::Admin,
        Role::Moderator,
        Role::DeliveryAgent,
        Role::User,
    ];

    /// `Owner` and `Admin` may mutate other principals.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }

    /// Parse role from string (case-insensitive).
    /// Accepts both `delivery_agent` and `delivery-agent`.
    pub fn from_str(s: &str) -> Option<Role> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "owner" => Some(Role::Owner),
            "admin" => Some(Role::Admin),
            "moderator" => Some(Role::Moderator),
            "delivery_agent" => Some(Role::DeliveryAgent),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

/// True if any role in the set is elevated.
pub fn has_elevated(roles: &[Role]) -> bool {
    roles.iter().any(Role::is_elevated)
}

/// True if the set contains `Owner`.
pub fn has_owner(roles: &[Role]) -> bool {
    roles.contains(&Role::Owner)
}

impl Default for Role {
    /// Default role is User (least privilege for signed-up principals).
    fn default() -> Self {
        Role::User
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Admin => write!(f, "admin"),
            Role::Moderator => write!(f, "moderator"),
            Role::DeliveryAgent => write!(f, "delivery_agent"),
            Role::User => write!(f, "user"),
        }
    }
}
