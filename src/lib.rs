// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Identity - Passwordless Identity Service
//!
//! One-time-code sign-up and sign-in over SMS or email, HS256 session
//! tokens, and role-based administration of principals.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `app` - Startup wiring of configured collaborators
//! - `auth` - Challenges, sessions, roles and the auth service
//! - `notify` - SMS and email senders
//! - `storage` - Identity repository and challenge store adapters

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod state;
pub mod storage;

#[cfg(test)]
pub mod test_support;
