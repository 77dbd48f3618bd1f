// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-time code challenges.
//!
//! A challenge binds a short numeric code to a contact identifier. Phone
//! numbers and emails share one key space in the challenge store.

use rand::{rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::AuthError;

/// Number of digits in a one-time code.
pub const CODE_LENGTH: usize = 6;

const CODE_SPACE: u32 = 1_000_000;

/// Generate a uniformly random, zero-padded numeric code from the OS CSPRNG.
pub fn generate_code() -> String {
    let value = OsRng.gen_range(0..CODE_SPACE);
    format!("{value:0width$}", width = CODE_LENGTH)
}

/// Delivery channel for a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Email,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Sms => write!(f, "sms"),
            Channel::Email => write!(f, "email"),
        }
    }
}

/// A resolved contact identifier and the channel it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub channel: Channel,
    pub identifier: String,
}

impl Contact {
    /// Pick the identifier to use. Phone wins when both are set; blank
    /// strings count as absent.
    pub fn resolve(phone_number: Option<&str>, email: Option<&str>) -> Result<Self, AuthError> {
        fn present(s: Option<&str>) -> Option<&str> {
            s.map(str::trim).filter(|s| !s.is_empty())
        }

        if let Some(phone) = present(phone_number) {
            return Ok(Self {
                channel: Channel::Sms,
                identifier: phone.to_string(),
            });
        }
        if let Some(email) = present(email) {
            return Ok(Self {
                channel: Channel::Email,
                identifier: email.to_string(),
            });
        }
        Err(AuthError::InvalidInput(
            "a phone number or an email is required".to_string(),
        ))
    }
}

/// Why the code is being requested; selects the message template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePurpose {
    SignUp,
    #[default]
    SignIn,
}

impl ChallengePurpose {
    pub fn title(&self) -> &'static str {
        match self {
            ChallengePurpose::SignUp => "Your sign-up code",
            ChallengePurpose::SignIn => "Your sign-in code",
        }
    }

    /// Message body; the code is appended after a colon.
    pub fn body(&self, code: &str) -> String {
        let lead = match self {
            ChallengePurpose::SignUp => "Here is your code for signing up",
            ChallengePurpose::SignIn => "Here is your code for signing in",
        };
        format!("{lead}: {code}")
    }
}
