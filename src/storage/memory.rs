// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory identity repository.
//!
//! Used when no database path is configured (local development) and as the
//! repository behind the auth service tests. Contents are lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{IdentityRepository, StorageError, StorageResult};
use crate::auth::roles::Role;
use crate::models::{ListPrincipalsQuery, NewPrincipal, Principal, PrincipalId, PrincipalUpdate};

#[derive(Default)]
struct Inner {
    principals: HashMap<PrincipalId, Principal>,
    next_id: i64,
}

impl Inner {
    fn find_by<F>(&self, pred: F) -> Option<&Principal>
    where
        F: Fn(&Principal) -> bool,
    {
        self.principals.values().find(|p| pred(p))
    }

    fn email_taken(&self, email: &str, except: Option<PrincipalId>) -> bool {
        self.find_by(|p| p.email.as_deref() == Some(email) && Some(p.id) != except)
            .is_some()
    }

    fn phone_taken(&self, phone: &str, except: Option<PrincipalId>) -> bool {
        self.find_by(|p| p.phone_number.as_deref() == Some(phone) && Some(p.id) != except)
            .is_some()
    }

    fn get_mut(&mut self, id: PrincipalId) -> StorageResult<&mut Principal> {
        self.principals
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("Principal {id}")))
    }
}

/// Process-local repository guarded by a single `RwLock`.
#[derive(Default)]
pub struct InMemoryIdentityRepository {
    inner: RwLock<Inner>,
}

impl InMemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored principals.
    pub async fn len(&self) -> usize {
        self.inner.read().await.principals.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl IdentityRepository for InMemoryIdentityRepository {
    async fn create(&self, principal: NewPrincipal) -> StorageResult<PrincipalId> {
        let mut inner = self.inner.write().await;

        if let Some(email) = principal.email.as_deref() {
            if inner.email_taken(email, None) {
                return Err(StorageError::AlreadyExists(format!("Principal with email {email}")));
            }
        }
        if let Some(phone) = principal.phone_number.as_deref() {
            if inner.phone_taken(phone, None) {
                return Err(StorageError::AlreadyExists(format!("Principal with phone {phone}")));
            }
        }

        inner.next_id += 1;
        let id = PrincipalId(inner.next_id);
        inner.principals.insert(id, principal.into_principal(id));
        Ok(id)
    }

    async fn read(&self, id: PrincipalId) -> StorageResult<Principal> {
        self.inner
            .read()
            .await
            .principals
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("Principal {id}")))
    }

    async fn read_by_email(&self, email: &str) -> StorageResult<Principal> {
        self.inner
            .read()
            .await
            .find_by(|p| p.email.as_deref() == Some(email))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("Principal with email {email}")))
    }

    async fn read_by_phone(&self, phone_number: &str) -> StorageResult<Principal> {
        self.inner
            .read()
            .await
            .find_by(|p| p.phone_number.as_deref() == Some(phone_number))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("Principal with phone {phone_number}")))
    }

    async fn list(&self, query: &ListPrincipalsQuery) -> StorageResult<Vec<Principal>> {
        let all: Vec<Principal> = self.inner.read().await.principals.values().cloned().collect();
        Ok(query.apply(all))
    }

    async fn update(&self, update: &PrincipalUpdate) -> StorageResult<()> {
        let mut inner = self.inner.write().await;

        if let Some(email) = update.email.as_deref() {
            if inner.email_taken(email, Some(update.id)) {
                return Err(StorageError::AlreadyExists(format!("Principal with email {email}")));
            }
        }
        if let Some(phone) = update.phone_number.as_deref() {
            if inner.phone_taken(phone, Some(update.id)) {
                return Err(StorageError::AlreadyExists(format!("Principal with phone {phone}")));
            }
        }

        let principal = inner.get_mut(update.id)?;
        update.apply_to(principal, Utc::now());
        Ok(())
    }

    async fn add_role(&self, id: PrincipalId, role: Role) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let principal = inner.get_mut(id)?;
        if !principal.roles.contains(&role) {
            principal.roles.push(role);
            principal.roles.sort();
            principal.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn remove_role(&self, id: PrincipalId, role: Role) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let principal = inner.get_mut(id)?;
        let before = principal.roles.len();
        principal.roles.retain(|r| *r != role);
        if principal.roles.len() != before {
            principal.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: PrincipalId) -> StorageResult<()> {
        self.inner
            .write()
            .await
            .principals
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("Principal {id}")))
    }
}
