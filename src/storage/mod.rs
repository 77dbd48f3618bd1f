// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Collaborator contracts consumed by the auth core, plus the adapters the
//! service ships with.
//!
//! ## Contracts
//!
//! - [`IdentityRepository`] - durable principals, roles and credential hashes
//! - [`ChallengeStore`] - ephemeral one-time codes with per-key expiry
//!
//! ## Adapters
//!
//! - [`IdentityDatabase`] - embedded redb file (production)
//! - [`InMemoryIdentityRepository`] - process-local map (development, tests)
//! - [`MemoryChallengeStore`] - bounded LRU with per-entry TTL
//!
//! ## Role mutation
//!
//! `add_role` and `remove_role` are idempotent: granting a role the principal
//! already holds, or revoking one it does not hold, succeeds without change.
//! Each adapter performs the read-modify-write of the role set under a single
//! lock or write transaction, so concurrent mutations of the same principal
//! cannot lose updates.

use std::time::Duration;

use async_trait::async_trait;

use crate::auth::roles::Role;
use crate::models::{ListPrincipalsQuery, NewPrincipal, Principal, PrincipalId, PrincipalUpdate};

pub mod challenge_cache;
pub mod identity_db;
pub mod memory;

pub use challenge_cache::MemoryChallengeStore;
pub use identity_db::{IdentityDatabase, IdentityDbError};
pub use memory::InMemoryIdentityRepository;

/// Error type shared by the storage contracts.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Entity not found (or expired, for challenges)
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Backend failure (I/O, corruption, lock poisoning)
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable storage for principals.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Persist a new principal and return its assigned id.
    ///
    /// Fails with `AlreadyExists` if the email or phone number is taken.
    async fn create(&self, principal: NewPrincipal) -> StorageResult<PrincipalId>;

    async fn read(&self, id: PrincipalId) -> StorageResult<Principal>;

    async fn read_by_email(&self, email: &str) -> StorageResult<Principal>;

    async fn read_by_phone(&self, phone_number: &str) -> StorageResult<Principal>;

    async fn list(&self, query: &ListPrincipalsQuery) -> StorageResult<Vec<Principal>>;

    /// Partial update; `NotFound` if the principal is absent.
    async fn update(&self, update: &PrincipalUpdate) -> StorageResult<()>;

    /// Idempotent role grant.
    async fn add_role(&self, id: PrincipalId, role: Role) -> StorageResult<()>;

    /// Idempotent role revocation.
    async fn remove_role(&self, id: PrincipalId, role: Role) -> StorageResult<()>;

    async fn delete(&self, id: PrincipalId) -> StorageResult<()>;
}

/// Ephemeral one-time-code store.
///
/// Keys are raw contact identifiers (phone numbers and emails share one key
/// space). A `put` must be visible to any `get` issued after it returns.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Store (or replace) the code for `key`, expiring after `ttl`.
    async fn put(&self, key: &str, code: &str, ttl: Duration) -> StorageResult<()>;

    /// Fetch the live code for `key`; `NotFound` if never set or expired.
    async fn get(&self, key: &str) -> StorageResult<String>;

    /// Invalidate the code for `key`. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Atomically remove the code for `key` if it is live and equals `code`.
    ///
    /// Returns `false` when the key is absent, expired or holds a different
    /// code; a mismatch leaves the stored code in place. Of any number of
    /// concurrent calls with the right code, exactly one returns `true`.
    async fn consume(&self, key: &str, code: &str) -> StorageResult<bool>;
}
