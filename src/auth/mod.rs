// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Passwordless authentication and role-based authorization.
//!
//! ## Auth Flow
//!
//! 1. Client asks for a one-time code for a phone number or email
//! 2. The code is delivered over SMS or email and held in the challenge store
//! 3. Client completes sign-up or sign-in with the code
//! 4. The service issues an HS256 access/refresh token pair
//! 5. Client sends `Authorization: Bearer <access token>` on later calls
//!
//! ## Security
//!
//! - Codes are single-use and expire after the challenge TTL
//! - Challenge requests never reveal whether an account exists
//! - Password sign-in failures are indistinguishable for unknown accounts
//! - Clock skew tolerance is 60 seconds
//! - Mutations re-read the actor's roles instead of trusting the token snapshot

pub mod challenge;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod password;
pub mod roles;
pub mod service;
pub mod tokens;
pub mod validation;

pub use challenge::{ChallengePurpose, Channel};
pub use claims::AuthenticatedUser;
pub use error::{AuthError, ErrorKind};
pub use extractor::Auth;
pub use roles::Role;
pub use service::{AuthDependencies, AuthService, ChallengeRequest, SignInRequest, SignUpRequest};
pub use tokens::{Session, TokenService};
