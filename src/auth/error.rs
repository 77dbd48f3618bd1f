// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.
//!
//! Every failure the core reports carries a stable [`ErrorKind`]. Collaborator
//! failures also carry the name of the operation that hit them and keep the
//! collaborator error as their `source`, so logs can show the full chain while
//! the transport only ever exposes the kind.

use crate::notify::NotifyError;
use crate::storage::StorageError;

/// Stable classification of core failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    InvalidCode,
    InvalidToken,
    InvalidCredentials,
    WeakCredential,
    InvalidEmail,
    InvalidPhoneNumber,
    InvalidFullName,
    NotFound,
    Forbidden,
    DeliveryFailure,
    CacheFailure,
    RepositoryFailure,
    SigningFailure,
}

impl ErrorKind {
    /// Machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidCode => "invalid_code",
            ErrorKind::InvalidToken => "invalid_token",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::WeakCredential => "weak_credential",
            ErrorKind::InvalidEmail => "invalid_email",
            ErrorKind::InvalidPhoneNumber => "invalid_phone_number",
            ErrorKind::InvalidFullName => "invalid_full_name",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::DeliveryFailure => "delivery_failure",
            ErrorKind::CacheFailure => "cache_failure",
            ErrorKind::RepositoryFailure => "repository_failure",
            ErrorKind::SigningFailure => "signing_failure",
        }
    }
}

/// Core error type.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed request (e.g. no contact identifier)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// One-time code absent, expired or mismatched
    #[error("one-time code is invalid or expired")]
    InvalidCode,

    /// Session token failed validation
    #[error("token is invalid or expired")]
    InvalidToken,

    /// Unknown account or wrong password (deliberately indistinguishable)
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("password must be between {min} and {max} characters")]
    WeakCredential { min: usize, max: usize },

    #[error("email address is not valid")]
    InvalidEmail,

    #[error("phone number must be between {min} and {max} characters")]
    InvalidPhoneNumber { min: usize, max: usize },

    #[error("full name must be between 1 and {max} characters")]
    InvalidFullName { max: usize },

    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{op}: notification delivery failed")]
    DeliveryFailure {
        op: &'static str,
        #[source]
        source: NotifyError,
    },

    #[error("{op}: challenge store failed")]
    CacheFailure {
        op: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("{op}: identity repository failed")]
    RepositoryFailure {
        op: &'static str,
        #[source]
        source: StorageError,
    },

    /// Token signing or password hashing failed
    #[error("{op}: cryptographic operation failed: {detail}")]
    SigningFailure { op: &'static str, detail: String },
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidInput(_) => ErrorKind::InvalidInput,
            AuthError::InvalidCode => ErrorKind::InvalidCode,
            AuthError::InvalidToken => ErrorKind::InvalidToken,
            AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthError::WeakCredential { .. } => ErrorKind::WeakCredential,
            AuthError::InvalidEmail => ErrorKind::InvalidEmail,
            AuthError::InvalidPhoneNumber { .. } => ErrorKind::InvalidPhoneNumber,
            AuthError::InvalidFullName { .. } => ErrorKind::InvalidFullName,
            AuthError::NotFound(_) => ErrorKind::NotFound,
            AuthError::Forbidden(_) => ErrorKind::Forbidden,
            AuthError::DeliveryFailure { .. } => ErrorKind::DeliveryFailure,
            AuthError::CacheFailure { .. } => ErrorKind::CacheFailure,
            AuthError::RepositoryFailure { .. } => ErrorKind::RepositoryFailure,
            AuthError::SigningFailure { .. } => ErrorKind::SigningFailure,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        self.kind().code()
    }

    /// Operation name attached to collaborator failures.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            AuthError::DeliveryFailure { op, .. }
            | AuthError::CacheFailure { op, .. }
            | AuthError::RepositoryFailure { op, .. }
            | AuthError::SigningFailure { op, .. } => Some(op),
            _ => None,
        }
    }

    /// True when a repository write was rejected for a duplicate email or phone.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AuthError::RepositoryFailure {
                source: StorageError::AlreadyExists(_),
                ..
            }
        )
    }

    pub(crate) fn repository(op: &'static str) -> impl FnOnce(StorageError) -> AuthError {
        move |source| AuthError::RepositoryFailure { op, source }
    }

    pub(crate) fn cache(op: &'static str) -> impl FnOnce(StorageError) -> AuthError {
        move |source| AuthError::CacheFailure { op, source }
    }

    pub(crate) fn delivery(op: &'static str) -> impl FnOnce(NotifyError) -> AuthError {
        move |source| AuthError::DeliveryFailure { op, source }
    }
}
