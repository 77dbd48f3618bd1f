// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session token issuance and validation.
//!
//! Tokens are HS256 JWTs. An access token carries the principal id and a role
//! snapshot; a refresh token carries only the principal id. The `typ` claim
//! keeps the two from being used interchangeably.
//!
//! ## Lifecycle
//!
//! `Issued → Valid → Expired`. Sessions are stateless: there is no revocation
//! list. Rotating the signing key with [`TokenService::set_key`] invalidates
//! every outstanding token at once.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use super::claims::{parse_subject, AccessClaims, AuthenticatedUser, RefreshClaims, TokenKind};
use super::error::AuthError;
use super::roles::Role;
use crate::models::PrincipalId;

/// Default access token lifetime (1 hour).
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(60 * 60);

/// Default refresh token lifetime (24 hours).
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Clock skew tolerance (60 seconds).
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

/// Access + refresh token pair returned to a client.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `Bearer`
    pub token_type: &'static str,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Mints and verifies session tokens.
pub struct TokenService {
    keys: RwLock<Keys>,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    leeway: u64,
}

impl TokenService {
    pub fn new(
        secret: &[u8],
        issuer: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            keys: RwLock::new(Keys::from_secret(secret)),
            issuer: issuer.into(),
            access_ttl,
            refresh_ttl,
            leeway: DEFAULT_LEEWAY_SECS,
        }
    }

    /// Override the clock skew tolerance.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway = leeway_secs;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Replace the signing key. All previously issued tokens stop validating.
    pub fn set_key(&self, secret: &[u8]) {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        *keys = Keys::from_secret(secret);
    }

    /// Mint an access/refresh pair for a principal.
    pub fn issue(&self, principal_id: PrincipalId, roles: &[Role]) -> Result<Session, AuthError> {
        let now = Utc::now();
        let access_expires_at = expiry(now, self.access_ttl)?;
        let refresh_expires_at = expiry(now, self.refresh_ttl)?;

        let access = AccessClaims {
            sub: principal_id.to_string(),
            roles: roles.to_vec(),
            typ: TokenKind::Access,
            iat: now.timestamp(),
            exp: access_expires_at.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };
        let refresh = RefreshClaims {
            sub: principal_id.to_string(),
            typ: TokenKind::Refresh,
            iat: now.timestamp(),
            exp: refresh_expires_at.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access, &keys.encoding).map_err(signing_failure)?;
        let refresh_token = encode(&header, &refresh, &keys.encoding).map_err(signing_failure)?;

        Ok(Session {
            access_token,
            refresh_token,
            token_type: "Bearer",
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Validate an access token and return the principal snapshot.
    pub fn validate_access(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims: AccessClaims = self.decode(token)?;
        if claims.typ != TokenKind::Access {
            debug!("Rejected non-access token presented as access token");
            return Err(AuthError::InvalidToken);
        }
        let principal_id = parse_subject(&claims.sub).ok_or(AuthError::InvalidToken)?;
        Ok(AuthenticatedUser::from_claims(principal_id, claims))
    }

    /// Validate a refresh token and return the principal id it names.
    pub fn validate_refresh(&self, token: &str) -> Result<PrincipalId, AuthError> {
        let claims: RefreshClaims = self.decode(token)?;
        if claims.typ != TokenKind::Refresh {
            debug!("Rejected non-refresh token presented as refresh token");
            return Err(AuthError::InvalidToken);
        }
        parse_subject(&claims.sub).ok_or(AuthError::InvalidToken)
    }

    fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_aud = false;

        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        decode::<T>(token, &keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(reason = ?e.kind(), "Token validation failed");
                AuthError::InvalidToken
            })
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, AuthError> {
    i64::try_from(ttl.as_secs())
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| AuthError::SigningFailure {
            op: "issue",
            detail: format!("token lifetime out of range: {ttl:?}"),
        })
}

fn signing_failure(e: jsonwebtoken::errors::Error) -> AuthError {
    AuthError::SigningFailure {
        op: "issue",
        detail: e.to_string(),
    }
}
