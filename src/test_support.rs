// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Collaborator doubles shared by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::auth::roles::Role;
use crate::auth::service::{AuthDependencies, AuthService, DEFAULT_CHALLENGE_TTL};
use crate::auth::tokens::{TokenService, DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL};
use crate::models::{
    ListPrincipalsQuery, NewPrincipal, Principal, PrincipalId, PrincipalUpdate,
};
use crate::notify::{EmailSender, NotifyError, SmsSender};
use crate::storage::{
    ChallengeStore, IdentityRepository, InMemoryIdentityRepository, MemoryChallengeStore,
    StorageError, StorageResult,
};

pub const TEST_SECRET: &[u8] = b"test-secret-key-at-least-32-bytes-long!!";
pub const TEST_ISSUER: &str = "relational-identity-test";

/// A `User` principal with the given contact details.
pub fn new_principal(full_name: &str, email: Option<&str>, phone: Option<&str>) -> NewPrincipal {
    NewPrincipal {
        full_name: full_name.to_string(),
        roles: vec![Role::User],
        email: email.map(str::to_string),
        phone_number: phone.map(str::to_string),
        password_hash: None,
        birth_date: None,
        addresses: Vec::new(),
        created_at: Utc::now(),
    }
}

pub fn token_service() -> TokenService {
    TokenService::new(TEST_SECRET, TEST_ISSUER, DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL)
}

// =============================================================================
// Senders
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub destination: String,
    pub title: String,
    pub body: String,
}

/// Records every message instead of sending it.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Code from the most recent message (the digits after the last colon).
    pub fn last_code(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let body = &sent.last()?.body;
        body.rsplit(':').next().map(|code| code.trim().to_string())
    }

    fn record(&self, destination: &str, title: &str, body: &str) {
        self.sent.lock().unwrap().push(SentMessage {
            destination: destination.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        });
    }
}

#[async_trait]
impl SmsSender for RecordingSender {
    async fn send(&self, destination: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        self.record(destination, title, body);
        Ok(())
    }
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, destination: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        self.record(destination, title, body);
        Ok(())
    }
}

/// Sender whose gateway always rejects.
pub struct FailingSender;

#[async_trait]
impl SmsSender for FailingSender {
    async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected(503))
    }
}

#[async_trait]
impl EmailSender for FailingSender {
    async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected(503))
    }
}

/// Sender that never completes, for caller-imposed timeouts.
pub struct StalledSender;

#[async_trait]
impl SmsSender for StalledSender {
    async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), NotifyError> {
        std::future::pending::<Result<(), NotifyError>>().await
    }
}

// =============================================================================
// Stores
// =============================================================================

/// Memory challenge store with selectable failing operations.
#[derive(Default)]
pub struct FlakyChallengeStore {
    inner: MemoryChallengeStore,
    fail_put: bool,
    fail_consume: bool,
}

impl FlakyChallengeStore {
    pub fn failing_put() -> Self {
        Self {
            fail_put: true,
            ..Default::default()
        }
    }

    pub fn failing_consume() -> Self {
        Self {
            fail_consume: true,
            ..Default::default()
        }
    }
}

fn outage() -> StorageError {
    StorageError::Backend("simulated outage".to_string())
}

#[async_trait]
impl ChallengeStore for FlakyChallengeStore {
    async fn put(&self, key: &str, code: &str, ttl: Duration) -> StorageResult<()> {
        if self.fail_put {
            return Err(outage());
        }
        self.inner.put(key, code, ttl).await
    }

    async fn get(&self, key: &str) -> StorageResult<String> {
        self.inner.get(key).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key).await
    }

    async fn consume(&self, key: &str, code: &str) -> StorageResult<bool> {
        if self.fail_consume {
            return Err(outage());
        }
        self.inner.consume(key, code).await
    }
}

/// Memory challenge store that hands control back to the scheduler inside
/// every operation, so futures joined on one task interleave there.
#[derive(Default)]
pub struct YieldingChallengeStore {
    inner: MemoryChallengeStore,
}

#[async_trait]
impl ChallengeStore for YieldingChallengeStore {
    async fn put(&self, key: &str, code: &str, ttl: Duration) -> StorageResult<()> {
        tokio::task::yield_now().await;
        self.inner.put(key, code, ttl).await
    }

    async fn get(&self, key: &str) -> StorageResult<String> {
        let code = self.inner.get(key).await;
        tokio::task::yield_now().await;
        code
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        tokio::task::yield_now().await;
        self.inner.remove(key).await
    }

    async fn consume(&self, key: &str, code: &str) -> StorageResult<bool> {
        tokio::task::yield_now().await;
        self.inner.consume(key, code).await
    }
}

/// Repository that is always down.
pub struct FailingRepository;

#[async_trait]
impl IdentityRepository for FailingRepository {
    async fn create(&self, _: NewPrincipal) -> StorageResult<PrincipalId> {
        Err(outage())
    }

    async fn read(&self, _: PrincipalId) -> StorageResult<Principal> {
        Err(outage())
    }

    async fn read_by_email(&self, _: &str) -> StorageResult<Principal> {
        Err(outage())
    }

    async fn read_by_phone(&self, _: &str) -> StorageResult<Principal> {
        Err(outage())
    }

    async fn list(&self, _: &ListPrincipalsQuery) -> StorageResult<Vec<Principal>> {
        Err(outage())
    }

    async fn update(&self, _: &PrincipalUpdate) -> StorageResult<()> {
        Err(outage())
    }

    async fn add_role(&self, _: PrincipalId, _: Role) -> StorageResult<()> {
        Err(outage())
    }

    async fn remove_role(&self, _: PrincipalId, _: Role) -> StorageResult<()> {
        Err(outage())
    }

    async fn delete(&self, _: PrincipalId) -> StorageResult<()> {
        Err(outage())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// An `AuthService` wired to inspectable doubles.
///
/// `repo`, `sms` and `email` are always the in-memory/recording instances,
/// even when the builder swapped a different collaborator into the service.
pub struct TestHarness {
    pub service: Arc<AuthService>,
    pub repo: Arc<InMemoryIdentityRepository>,
    pub challenges: Arc<dyn ChallengeStore>,
    pub sms: Arc<RecordingSender>,
    pub email: Arc<RecordingSender>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Insert a principal with exactly these roles, bypassing the service.
    pub async fn seed(
        &self,
        full_name: &str,
        email: Option<&str>,
        phone: Option<&str>,
        roles: &[Role],
    ) -> PrincipalId {
        let mut principal = new_principal(full_name, email, phone);
        principal.roles = roles.to_vec();
        self.repo.create(principal).await.unwrap()
    }
}

#[derive(Default)]
pub struct HarnessBuilder {
    repository: Option<Arc<dyn IdentityRepository>>,
    challenges: Option<Arc<dyn ChallengeStore>>,
    sms: Option<Arc<dyn SmsSender>>,
}

impl HarnessBuilder {
    pub fn repository(mut self, repository: Arc<dyn IdentityRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn challenge_store(mut self, challenges: Arc<dyn ChallengeStore>) -> Self {
        self.challenges = Some(challenges);
        self
    }

    pub fn sms(mut self, sms: Arc<dyn SmsSender>) -> Self {
        self.sms = Some(sms);
        self
    }

    pub fn build(self) -> TestHarness {
        let repo = Arc::new(InMemoryIdentityRepository::new());
        let sms = Arc::new(RecordingSender::default());
        let email = Arc::new(RecordingSender::default());
        let challenges = self.challenges.unwrap_or_else(|| {
            Arc::new(MemoryChallengeStore::default()) as Arc<dyn ChallengeStore>
        });

        let service = AuthService::new(
            AuthDependencies {
                repository: self
                    .repository
                    .unwrap_or_else(|| repo.clone() as Arc<dyn IdentityRepository>),
                challenges: challenges.clone(),
                sms: self.sms.unwrap_or_else(|| sms.clone() as Arc<dyn SmsSender>),
                email: email.clone(),
                tokens: Arc::new(token_service()),
            },
            DEFAULT_CHALLENGE_TTL,
        );

        TestHarness {
            service: Arc::new(service),
            repo,
            challenges,
            sms,
            email,
        }
    }
}
