// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Principal records shared by the core, the repositories and the API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::roles::Role;

/// Numeric principal identifier assigned by the repository.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[serde(transparent)]
pub struct PrincipalId(pub i64);

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PrincipalId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Postal address attached to a principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Address {
    /// ISO 3166-1 alpha-2 country code
    pub country_code: String,
    pub city: String,
    pub street: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apartment: Option<i32>,
    /// Free-form delivery instructions
    #[serde(default)]
    pub instructions: String,
}

/// An account record.
///
/// Deliberately not `Serialize`: the credential hash must never reach a
/// response body. The API layer converts into its own view type.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub id: PrincipalId,
    pub full_name: String,
    /// Set semantics; order is display precedence.
    pub roles: Vec<Role>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Argon2id PHC string; `None` for passwordless-only accounts.
    pub password_hash: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub addresses: Vec<Address>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_owner(&self) -> bool {
        crate::auth::roles::has_owner(&self.roles)
    }

    pub fn is_elevated(&self) -> bool {
        crate::auth::roles::has_elevated(&self.roles)
    }

    /// Highest-precedence role, used for role ordering in listings.
    pub fn primary_role(&self) -> Option<Role> {
        self.roles.iter().copied().min()
    }
}

/// A principal that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrincipal {
    pub full_name: String,
    pub roles: Vec<Role>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password_hash: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub addresses: Vec<Address>,
    pub created_at: DateTime<Utc>,
}

impl NewPrincipal {
    /// Attach the repository-assigned id.
    pub fn into_principal(self, id: PrincipalId) -> Principal {
        Principal {
            id,
            full_name: self.full_name,
            roles: self.roles,
            email: self.email,
            phone_number: self.phone_number,
            password_hash: self.password_hash,
            birth_date: self.birth_date,
            addresses: self.addresses,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Self-service or administrative profile change.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChangeset {
    /// Principal being changed
    pub subject_id: PrincipalId,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Plaintext; hashed before it reaches the repository
    pub password: Option<String>,
}

/// Validated partial update handed to the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalUpdate {
    pub id: PrincipalId,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password_hash: Option<String>,
}

impl PrincipalUpdate {
    /// Apply present fields to a principal and bump `updated_at`.
    pub fn apply_to(&self, principal: &mut Principal, now: DateTime<Utc>) {
        if let Some(full_name) = &self.full_name {
            principal.full_name = full_name.clone();
        }
        if let Some(email) = &self.email {
            principal.email = Some(email.clone());
        }
        if let Some(phone_number) = &self.phone_number {
            principal.phone_number = Some(phone_number.clone());
        }
        if let Some(password_hash) = &self.password_hash {
            principal.password_hash = Some(password_hash.clone());
        }
        principal.updated_at = now;
    }
}

/// Listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Id,
    FullNameAsc,
    FullNameDesc,
    EmailAsc,
    EmailDesc,
    RoleAsc,
    RoleDesc,
}

/// Default page size for principal listings.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Upper bound on page size.
pub const MAX_LIST_LIMIT: usize = 500;

/// Query parameters for listing principals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListPrincipalsQuery {
    /// Page size (default 50, max 500)
    pub limit: Option<usize>,
    /// Number of principals to skip
    pub offset: Option<usize>,
    /// Sort order (default `id`)
    #[serde(default)]
    pub sort_by: SortBy,
    /// Only principals with an address in this country
    pub country_code: Option<String>,
}

impl ListPrincipalsQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }

    /// Filter, sort and page an in-memory set of principals.
    ///
    /// Shared by the repository adapters so both list identically.
    pub fn apply(&self, mut principals: Vec<Principal>) -> Vec<Principal> {
        if let Some(country) = self.country_code.as_deref().filter(|c| !c.is_empty()) {
            principals.retain(|p| {
                p.addresses
                    .iter()
                    .any(|a| a.country_code.eq_ignore_ascii_case(country))
            });
        }

        match self.sort_by {
            SortBy::Id => principals.sort_by_key(|p| p.id),
            SortBy::FullNameAsc => principals.sort_by(|a, b| a.full_name.cmp(&b.full_name)),
            SortBy::FullNameDesc => principals.sort_by(|a, b| b.full_name.cmp(&a.full_name)),
            SortBy::EmailAsc => principals.sort_by(|a, b| a.email.cmp(&b.email)),
            SortBy::EmailDesc => principals.sort_by(|a, b| b.email.cmp(&a.email)),
            SortBy::RoleAsc => principals.sort_by_key(|p| (p.primary_role(), p.id)),
            SortBy::RoleDesc => {
                principals.sort_by(|a, b| (b.primary_role(), a.id).cmp(&(a.primary_role(), b.id)))
            }
        }

        principals
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.effective_limit())
            .collect()
    }
}
