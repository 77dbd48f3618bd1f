// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Field validation for profile changes.
//!
//! Lengths are counted in Unicode scalar values, not bytes.

use std::sync::LazyLock;

use regex::Regex;

use super::error::AuthError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MIN_PHONE_LEN: usize = 6;
pub const MAX_PHONE_LEN: usize = 30;
pub const MAX_FULL_NAME_LEN: usize = 250;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AuthError::WeakCredential {
            min: MIN_PASSWORD_LEN,
            max: MAX_PASSWORD_LEN,
        });
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if !EMAIL_RE.is_match(email) {
        return Err(AuthError::InvalidEmail);
    }
    Ok(())
}

pub fn validate_phone_number(phone_number: &str) -> Result<(), AuthError> {
    let len = phone_number.chars().count();
    if !(MIN_PHONE_LEN..=MAX_PHONE_LEN).contains(&len) {
        return Err(AuthError::InvalidPhoneNumber {
            min: MIN_PHONE_LEN,
            max: MAX_PHONE_LEN,
        });
    }
    Ok(())
}

pub fn validate_full_name(full_name: &str) -> Result<(), AuthError> {
    let len = full_name.chars().count();
    if len == 0 || len > MAX_FULL_NAME_LEN {
        return Err(AuthError::InvalidFullName {
            max: MAX_FULL_NAME_LEN,
        });
    }
    Ok(())
}
