// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Argon2id password hashing.
//!
//! Hashes are PHC strings (algorithm, parameters and salt embedded), so they
//! can be verified without any side configuration.

use std::sync::OnceLock;

use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::rngs::OsRng;

use super::error::AuthError;

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::SigningFailure {
            op: "hash_password",
            detail: e.to_string(),
        })
}

/// Verify a password against a stored PHC hash.
///
/// A malformed stored hash verifies as false.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Burn the same work as a real verification.
///
/// Called when there is no account (or no stored hash) so that response
/// timing does not reveal whether an account exists.
pub fn dummy_verify(password: &str) {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
    let hash = DUMMY_HASH.get_or_init(|| hash_password("dummy-password-for-timing").ok());
    if let Some(hash) = hash {
        let _ = verify_password(password, hash);
    }
}
