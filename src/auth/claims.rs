// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session token claims and the authenticated principal snapshot.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;
use crate::models::PrincipalId;

/// Distinguishes access from refresh tokens (`typ` claim).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (principal id, decimal)
    pub sub: String,
    /// Role snapshot at issuance
    pub roles: Vec<Role>,
    pub typ: TokenKind,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    pub iss: String,
    /// Unique token id
    pub jti: String,
}

/// Claims carried by a refresh token. No roles: they are re-read on refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub jti: String,
}

/// Parse the `sub` claim back into a principal id.
pub(crate) fn parse_subject(sub: &str) -> Option<PrincipalId> {
    sub.parse::<i64>().ok().map(PrincipalId)
}

/// Authenticated principal extracted from a validated access token.
///
/// The role list is a snapshot from issuance time. Authorization decisions
/// for mutations re-read roles from the repository instead of trusting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    pub principal_id: PrincipalId,
    pub roles: Vec<Role>,
    /// Token expiration (Unix timestamp)
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn from_claims(principal_id: PrincipalId, claims: AccessClaims) -> Self {
        Self {
            principal_id,
            roles: claims.roles,
            expires_at: claims.exp,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}
