// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded identity database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `principals`: principal id → serialized [`StoredPrincipal`]
//! - `email_index`: email → principal id
//! - `phone_index`: phone number → principal id
//! - `meta`: key → counter (`next_id`)
//!
//! Every mutation runs inside one write transaction, which redb serializes,
//! so the read-modify-write of a role set is atomic.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use super::{IdentityRepository, StorageError, StorageResult};
use crate::auth::roles::Role;
use crate::models::{
    Address, ListPrincipalsQuery, NewPrincipal, Principal, PrincipalId, PrincipalUpdate,
};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: principal id → serialized StoredPrincipal (JSON bytes).
const PRINCIPALS: TableDefinition<i64, &[u8]> = TableDefinition::new("principals");

/// Unique index: email → principal id.
const EMAIL_INDEX: TableDefinition<&str, i64> = TableDefinition::new("email_index");

/// Unique index: phone number → principal id.
const PHONE_INDEX: TableDefinition<&str, i64> = TableDefinition::new("phone_index");

/// Counters.
const META: TableDefinition<&str, i64> = TableDefinition::new("meta");

const NEXT_ID_KEY: &str = "next_id";

// =============================================================================
// Role ↔ storage id mapping
// =============================================================================

/// Persisted role identifiers. Values are part of the on-disk format and
/// must never be renumbered.
const ROLE_STORAGE_IDS: [(Role, u8); 5] = [
    (Role::Owner, 1),
    (Role::Admin, 2),
    (Role::Moderator, 3),
    (Role::DeliveryAgent, 4),
    (Role::User, 5),
];

fn role_to_storage_id(role: Role) -> u8 {
    ROLE_STORAGE_IDS
        .iter()
        .find(|(r, _)| *r == role)
        .map(|(_, id)| *id)
        .unwrap_or(0)
}

fn role_from_storage_id(id: u8) -> Option<Role> {
    ROLE_STORAGE_IDS
        .iter()
        .find(|(_, stored)| *stored == id)
        .map(|(role, _)| *role)
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum IdentityDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type IdentityDbResult<T> = Result<T, IdentityDbError>;

impl From<IdentityDbError> for StorageError {
    fn from(e: IdentityDbError) -> Self {
        match e {
            IdentityDbError::NotFound(what) => StorageError::NotFound(what),
            IdentityDbError::AlreadyExists(what) => StorageError::AlreadyExists(what),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

// =============================================================================
// Stored record
// =============================================================================

/// On-disk principal representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPrincipal {
    id: i64,
    full_name: String,
    role_ids: Vec<u8>,
    email: Option<String>,
    phone_number: Option<String>,
    password_hash: Option<String>,
    birth_date: Option<NaiveDate>,
    addresses: Vec<Address>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StoredPrincipal {
    fn from_principal(p: &Principal) -> Self {
        Self {
            id: p.id.0,
            full_name: p.full_name.clone(),
            role_ids: p.roles.iter().map(|r| role_to_storage_id(*r)).collect(),
            email: p.email.clone(),
            phone_number: p.phone_number.clone(),
            password_hash: p.password_hash.clone(),
            birth_date: p.birth_date,
            addresses: p.addresses.clone(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }

    fn into_principal(self) -> IdentityDbResult<Principal> {
        let mut roles = Vec::with_capacity(self.role_ids.len());
        for role_id in &self.role_ids {
            let role = role_from_storage_id(*role_id).ok_or_else(|| {
                IdentityDbError::Corrupt(format!(
                    "principal {} has unknown role id {role_id}",
                    self.id
                ))
            })?;
            roles.push(role);
        }

        Ok(Principal {
            id: PrincipalId(self.id),
            full_name: self.full_name,
            roles,
            email: self.email,
            phone_number: self.phone_number,
            password_hash: self.password_hash,
            birth_date: self.birth_date,
            addresses: self.addresses,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn decode(bytes: &[u8]) -> IdentityDbResult<Principal> {
    let stored: StoredPrincipal = serde_json::from_slice(bytes)?;
    stored.into_principal()
}

fn encode(principal: &Principal) -> IdentityDbResult<Vec<u8>> {
    Ok(serde_json::to_vec(&StoredPrincipal::from_principal(principal))?)
}

// =============================================================================
// IdentityDatabase
// =============================================================================

/// Embedded ACID identity store.
pub struct IdentityDatabase {
    db: Database,
}

impl IdentityDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> IdentityDbResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PRINCIPALS)?;
            let _ = write_txn.open_table(EMAIL_INDEX)?;
            let _ = write_txn.open_table(PHONE_INDEX)?;
            let _ = write_txn.open_table(META)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn create_principal(&self, principal: NewPrincipal) -> IdentityDbResult<PrincipalId> {
        let write_txn = self.db.begin_write()?;
        let id = {
            let mut principals = write_txn.open_table(PRINCIPALS)?;
            let mut emails = write_txn.open_table(EMAIL_INDEX)?;
            let mut phones = write_txn.open_table(PHONE_INDEX)?;
            let mut meta = write_txn.open_table(META)?;

            if let Some(email) = principal.email.as_deref() {
                if emails.get(email)?.is_some() {
                    return Err(IdentityDbError::AlreadyExists(format!(
                        "Principal with email {email}"
                    )));
                }
            }
            if let Some(phone) = principal.phone_number.as_deref() {
                if phones.get(phone)?.is_some() {
                    return Err(IdentityDbError::AlreadyExists(format!(
                        "Principal with phone {phone}"
                    )));
                }
            }

            let next = meta.get(NEXT_ID_KEY)?.map(|v| v.value()).unwrap_or(0) + 1;
            meta.insert(NEXT_ID_KEY, next)?;

            let id = PrincipalId(next);
            let record = principal.into_principal(id);
            let json = encode(&record)?;
            principals.insert(next, json.as_slice())?;

            if let Some(email) = record.email.as_deref() {
                emails.insert(email, next)?;
            }
            if let Some(phone) = record.phone_number.as_deref() {
                phones.insert(phone, next)?;
            }
            id
        };
        write_txn.commit()?;
        Ok(id)
    }

    fn read_principal(&self, id: PrincipalId) -> IdentityDbResult<Principal> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINCIPALS)?;
        match table.get(id.0)? {
            Some(value) => decode(value.value()),
            None => Err(IdentityDbError::NotFound(format!("Principal {id}"))),
        }
    }

    fn read_indexed(
        &self,
        index: TableDefinition<'static, &'static str, i64>,
        key: &str,
        what: &str,
    ) -> IdentityDbResult<Principal> {
        let read_txn = self.db.begin_read()?;
        let index_table = read_txn.open_table(index)?;
        let id = index_table
            .get(key)?
            .map(|v| v.value())
            .ok_or_else(|| IdentityDbError::NotFound(format!("Principal with {what} {key}")))?;

        let table = read_txn.open_table(PRINCIPALS)?;
        match table.get(id)? {
            Some(value) => decode(value.value()),
            None => Err(IdentityDbError::Corrupt(format!(
                "{what} index points at missing principal {id}"
            ))),
        }
    }

    fn list_principals(&self, query: &ListPrincipalsQuery) -> IdentityDbResult<Vec<Principal>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINCIPALS)?;

        let mut all = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            all.push(decode(entry.1.value())?);
        }
        Ok(query.apply(all))
    }

    /// Read-modify-write of one principal inside a single write transaction.
    ///
    /// Keeps the email/phone indexes in step with the record.
    fn modify<F>(&self, id: PrincipalId, mutate: F) -> IdentityDbResult<()>
    where
        F: FnOnce(&mut Principal) -> IdentityDbResult<()>,
    {
        let write_txn = self.db.begin_write()?;
        {
            let mut principals = write_txn.open_table(PRINCIPALS)?;
            let mut emails = write_txn.open_table(EMAIL_INDEX)?;
            let mut phones = write_txn.open_table(PHONE_INDEX)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = {
                let existing = principals
                    .get(id.0)?
                    .ok_or_else(|| IdentityDbError::NotFound(format!("Principal {id}")))?;
                existing.value().to_vec()
            };
            let before = decode(&existing_bytes)?;
            let mut after = before.clone();
            mutate(&mut after)?;

            if after.email != before.email {
                if let Some(email) = after.email.as_deref() {
                    let owner = emails.get(email)?.map(|v| v.value());
                    if owner.is_some_and(|owner| owner != id.0) {
                        return Err(IdentityDbError::AlreadyExists(format!(
                            "Principal with email {email}"
                        )));
                    }
                    emails.insert(email, id.0)?;
                }
                if let Some(old) = before.email.as_deref() {
                    emails.remove(old)?;
                }
            }

            if after.phone_number != before.phone_number {
                if let Some(phone) = after.phone_number.as_deref() {
                    let owner = phones.get(phone)?.map(|v| v.value());
                    if owner.is_some_and(|owner| owner != id.0) {
                        return Err(IdentityDbError::AlreadyExists(format!(
                            "Principal with phone {phone}"
                        )));
                    }
                    phones.insert(phone, id.0)?;
                }
                if let Some(old) = before.phone_number.as_deref() {
                    phones.remove(old)?;
                }
            }

            let json = encode(&after)?;
            principals.insert(id.0, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_principal(&self, id: PrincipalId) -> IdentityDbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut principals = write_txn.open_table(PRINCIPALS)?;
            let mut emails = write_txn.open_table(EMAIL_INDEX)?;
            let mut phones = write_txn.open_table(PHONE_INDEX)?;

            let existing_bytes = {
                let existing = principals
                    .get(id.0)?
                    .ok_or_else(|| IdentityDbError::NotFound(format!("Principal {id}")))?;
                existing.value().to_vec()
            };
            let existing = decode(&existing_bytes)?;

            principals.remove(id.0)?;
            if let Some(email) = existing.email.as_deref() {
                emails.remove(email)?;
            }
            if let Some(phone) = existing.phone_number.as_deref() {
                phones.remove(phone)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[async_trait]
impl IdentityRepository for IdentityDatabase {
    async fn create(&self, principal: NewPrincipal) -> StorageResult<PrincipalId> {
        Ok(self.create_principal(principal)?)
    }

    async fn read(&self, id: PrincipalId) -> StorageResult<Principal> {
        Ok(self.read_principal(id)?)
    }

    async fn read_by_email(&self, email: &str) -> StorageResult<Principal> {
        Ok(self.read_indexed(EMAIL_INDEX, email, "email")?)
    }

    async fn read_by_phone(&self, phone_number: &str) -> StorageResult<Principal> {
        Ok(self.read_indexed(PHONE_INDEX, phone_number, "phone")?)
    }

    async fn list(&self, query: &ListPrincipalsQuery) -> StorageResult<Vec<Principal>> {
        Ok(self.list_principals(query)?)
    }

    async fn update(&self, update: &PrincipalUpdate) -> StorageResult<()> {
        Ok(self.modify(update.id, |p| {
            update.apply_to(p, Utc::now());
            Ok(())
        })?)
    }

    async fn add_role(&self, id: PrincipalId, role: Role) -> StorageResult<()> {
        Ok(self.modify(id, |p| {
            if !p.roles.contains(&role) {
                p.roles.push(role);
                p.roles.sort();
                p.updated_at = Utc::now();
            }
            Ok(())
        })?)
    }

    async fn remove_role(&self, id: PrincipalId, role: Role) -> StorageResult<()> {
        Ok(self.modify(id, |p| {
            let before = p.roles.len();
            p.roles.retain(|r| *r != role);
            if p.roles.len() != before {
                p.updated_at = Utc::now();
            }
            Ok(())
        })?)
    }

    async fn delete(&self, id: PrincipalId) -> StorageResult<()> {
        Ok(self.delete_principal(id)?)
    }
}
