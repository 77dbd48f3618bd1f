// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Auth Service
//!
//! Coordinates one-time-code challenges, session issuance and role-based
//! account administration. Holds shared references to its collaborators and
//! no mutable state of its own, so one instance serves the whole process.
//!
//! ## Authorization
//!
//! Every administrative mutation re-reads the acting principal from the
//! repository and checks for `Admin` or `Owner` there. Role claims in the
//! caller's access token are never trusted for these decisions.
//!
//! ## One-time codes
//!
//! A code is removed from the challenge store as soon as it matches, before
//! the account is created or looked up. If that removal fails the operation
//! fails with `CacheFailure` rather than leaving a replayable code behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::challenge::{generate_code, ChallengePurpose, Channel, Contact};
use super::claims::AuthenticatedUser;
use super::error::AuthError;
use super::password::{dummy_verify, hash_password, verify_password};
use super::roles::Role;
use super::tokens::{Session, TokenService};
use super::validation::{
    validate_email, validate_full_name, validate_password, validate_phone_number,
};
use crate::models::{
    Address, ListPrincipalsQuery, NewPrincipal, Principal, PrincipalId, PrincipalUpdate,
    ProfileChangeset,
};
use crate::notify::{EmailSender, SmsSender};
use crate::storage::{ChallengeStore, IdentityRepository, StorageError};

/// Default lifetime of a one-time code (5 minutes).
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

/// Request a one-time code.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Selects the message template (default `sign_in`)
    #[serde(default)]
    pub purpose: ChallengePurpose,
}

/// Complete a sign-up with a one-time code and the new principal's profile.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SignUpRequest {
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub code: String,
    pub full_name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub address: Option<Address>,
}

/// Complete a sign-in with a one-time code.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SignInRequest {
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub code: String,
}

/// Required collaborators. Every field must be supplied to build the service.
pub struct AuthDependencies {
    pub repository: Arc<dyn IdentityRepository>,
    pub challenges: Arc<dyn ChallengeStore>,
    pub sms: Arc<dyn SmsSender>,
    pub email: Arc<dyn EmailSender>,
    pub tokens: Arc<TokenService>,
}

pub struct AuthService {
    repository: Arc<dyn IdentityRepository>,
    challenges: Arc<dyn ChallengeStore>,
    sms: Arc<dyn SmsSender>,
    email: Arc<dyn EmailSender>,
    tokens: Arc<TokenService>,
    challenge_ttl: Duration,
}

impl AuthService {
    pub fn new(deps: AuthDependencies, challenge_ttl: Duration) -> Self {
        Self {
            repository: deps.repository,
            challenges: deps.challenges,
            sms: deps.sms,
            email: deps.email,
            tokens: deps.tokens,
            challenge_ttl,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    // =========================================================================
    // Challenges
    // =========================================================================

    /// Generate a code, deliver it, then store it under the identifier.
    ///
    /// Never reads the repository, so the outcome does not depend on whether
    /// an account exists for the identifier.
    pub async fn request_challenge(&self, request: ChallengeRequest) -> Result<Channel, AuthError> {
        const OP: &str = "request_challenge";

        let contact = Contact::resolve(request.phone_number.as_deref(), request.email.as_deref())?;
        let code = generate_code();
        let title = request.purpose.title();
        let body = request.purpose.body(&code);

        let sent = match contact.channel {
            Channel::Sms => self.sms.send(&contact.identifier, title, &body).await,
            Channel::Email => self.email.send(&contact.identifier, title, &body).await,
        };
        if let Err(e) = sent {
            warn!(channel = %contact.channel, error = %e, "Challenge delivery failed");
            return Err(AuthError::delivery(OP)(e));
        }

        self.challenges
            .put(&contact.identifier, &code, self.challenge_ttl)
            .await
            .map_err(|e| {
                warn!(channel = %contact.channel, error = %e, "Challenge store write failed");
                AuthError::cache(OP)(e)
            })?;

        info!(channel = %contact.channel, purpose = ?request.purpose, "Challenge issued");
        Ok(contact.channel)
    }

    /// Exact-match the supplied code and consume it in one store operation,
    /// so concurrent verifications of the same code cannot both succeed.
    async fn verify_code(
        &self,
        contact: &Contact,
        code: &str,
        op: &'static str,
    ) -> Result<(), AuthError> {
        let consumed = self
            .challenges
            .consume(&contact.identifier, code)
            .await
            .map_err(AuthError::cache(op))?;

        if !consumed {
            debug!(channel = %contact.channel, "No matching live challenge");
            return Err(AuthError::InvalidCode);
        }
        Ok(())
    }

    // =========================================================================
    // Sign-up / sign-in
    // =========================================================================

    /// Create a `User` principal for a verified identifier and open a session.
    ///
    /// Not idempotent: if session issuance fails after the account was
    /// persisted, the account stays and no session is returned.
    pub async fn complete_sign_up(&self, request: SignUpRequest) -> Result<Session, AuthError> {
        const OP: &str = "complete_sign_up";

        let contact = Contact::resolve(request.phone_number.as_deref(), request.email.as_deref())?;
        validate_full_name(&request.full_name)?;
        self.verify_code(&contact, &request.code, OP).await?;

        let (email, phone_number) = match contact.channel {
            Channel::Sms => (None, Some(contact.identifier.clone())),
            Channel::Email => (Some(contact.identifier.clone()), None),
        };
        let roles = vec![Role::User];
        let principal = NewPrincipal {
            full_name: request.full_name,
            roles: roles.clone(),
            email,
            phone_number,
            password_hash: None,
            birth_date: request.birth_date,
            addresses: request.address.into_iter().collect(),
            created_at: Utc::now(),
        };

        let id = self.repository.create(principal).await.map_err(|e| {
            warn!(channel = %contact.channel, error = %e, "Sign-up persistence failed");
            AuthError::repository(OP)(e)
        })?;

        info!(principal_id = %id, channel = %contact.channel, "Principal signed up");
        self.tokens.issue(id, &roles)
    }

    /// Open a session for an existing principal with a verified identifier.
    pub async fn complete_sign_in(&self, request: SignInRequest) -> Result<Session, AuthError> {
        const OP: &str = "complete_sign_in";

        let contact = Contact::resolve(request.phone_number.as_deref(), request.email.as_deref())?;
        self.verify_code(&contact, &request.code, OP).await?;

        let lookup = match contact.channel {
            Channel::Sms => self.repository.read_by_phone(&contact.identifier).await,
            Channel::Email => self.repository.read_by_email(&contact.identifier).await,
        };
        let principal = lookup.map_err(|e| target_error(e, OP, "principal"))?;

        info!(principal_id = %principal.id, channel = %contact.channel, "Principal signed in");
        self.tokens.issue(principal.id, &principal.roles)
    }

    /// Email + password sign-in.
    ///
    /// An unknown email, an account without a password and a wrong password
    /// all fail with `InvalidCredentials` after comparable hashing work.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        const OP: &str = "sign_in_with_password";

        let principal = match self.repository.read_by_email(email).await {
            Ok(principal) => Some(principal),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(AuthError::repository(OP)(e)),
        };

        let candidate = principal
            .as_ref()
            .and_then(|p| p.password_hash.as_deref().map(|hash| (p, hash)));

        match candidate {
            Some((principal, hash)) if verify_password(password, hash) => {
                info!(principal_id = %principal.id, "Principal signed in with password");
                self.tokens.issue(principal.id, &principal.roles)
            }
            Some(_) => {
                debug!("Password sign-in rejected");
                Err(AuthError::InvalidCredentials)
            }
            None => {
                dummy_verify(password);
                debug!("Password sign-in rejected");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Exchange a refresh token for a fresh pair carrying the current roles.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        const OP: &str = "refresh_session";

        let id = self.tokens.validate_refresh(refresh_token)?;
        let principal = match self.repository.read(id).await {
            Ok(principal) => principal,
            Err(e) if e.is_not_found() => {
                debug!(principal_id = %id, "Refresh for deleted principal");
                return Err(AuthError::InvalidToken);
            }
            Err(e) => return Err(AuthError::repository(OP)(e)),
        };

        self.tokens.issue(principal.id, &principal.roles)
    }

    /// Validate an access token for the transport layer.
    pub fn authenticate(&self, access_token: &str) -> Result<AuthenticatedUser, AuthError> {
        self.tokens.validate_access(access_token)
    }

    // =========================================================================
    // Administration
    // =========================================================================

    pub async fn grant_role(
        &self,
        actor: PrincipalId,
        target: PrincipalId,
        role: Role,
    ) -> Result<(), AuthError> {
        const OP: &str = "grant_role";

        if role == Role::Owner {
            warn!(actor = %actor, target = %target, "Refused in-band Owner grant");
            return Err(AuthError::Forbidden("the owner role cannot be granted"));
        }
        self.require_elevated(actor, OP).await?;

        self.repository
            .add_role(target, role)
            .await
            .map_err(|e| target_error(e, OP, "principal"))?;

        info!(actor = %actor, target = %target, role = %role, "Role granted");
        Ok(())
    }

    pub async fn revoke_role(
        &self,
        actor: PrincipalId,
        target: PrincipalId,
        role: Role,
    ) -> Result<(), AuthError> {
        const OP: &str = "revoke_role";

        // Authorize before touching the target so a missing id reads the same
        // as an existing one to a non-elevated caller.
        self.require_elevated(actor, OP).await?;
        let subject = self.read_target(target, OP).await?;
        if subject.is_owner() {
            warn!(actor = %actor, target = %target, "Refused role change on owner");
            return Err(AuthError::Forbidden("the owner's roles cannot be changed"));
        }

        self.repository
            .remove_role(target, role)
            .await
            .map_err(|e| target_error(e, OP, "principal"))?;

        info!(actor = %actor, target = %target, role = %role, "Role revoked");
        Ok(())
    }

    /// Partial profile update. Returns the updated principal.
    ///
    /// Blank fields are treated as absent. Fields are validated in a fixed
    /// order (password, email, phone, full name) and the first violation is
    /// reported.
    pub async fn update_profile(
        &self,
        actor: PrincipalId,
        changeset: ProfileChangeset,
    ) -> Result<Principal, AuthError> {
        const OP: &str = "update_profile";

        let subject_id = changeset.subject_id;
        let acting_on_self = actor == subject_id;
        if !acting_on_self {
            self.require_elevated(actor, OP).await?;
        }

        let subject = self.read_target(subject_id, OP).await?;
        if subject.is_owner() && !acting_on_self {
            warn!(actor = %actor, target = %subject_id, "Refused profile change on owner");
            return Err(AuthError::Forbidden("only the owner may change the owner's profile"));
        }

        let present = |field: Option<String>| field.filter(|s| !s.is_empty());
        let password = present(changeset.password);
        let email = present(changeset.email);
        let phone_number = present(changeset.phone_number);
        let full_name = present(changeset.full_name);

        if let Some(password) = &password {
            validate_password(password)?;
        }
        if let Some(email) = &email {
            validate_email(email)?;
        }
        if let Some(phone_number) = &phone_number {
            validate_phone_number(phone_number)?;
        }
        if let Some(full_name) = &full_name {
            validate_full_name(full_name)?;
        }

        if password.is_none() && email.is_none() && phone_number.is_none() && full_name.is_none() {
            return Ok(subject);
        }

        let password_hash = password.as_deref().map(hash_password).transpose()?;
        let update = PrincipalUpdate {
            id: subject_id,
            full_name,
            email,
            phone_number,
            password_hash,
        };
        self.repository
            .update(&update)
            .await
            .map_err(|e| target_error(e, OP, "principal"))?;

        info!(
            actor = %actor,
            target = %subject_id,
            password_changed = update.password_hash.is_some(),
            "Profile updated"
        );
        self.read_target(subject_id, OP).await
    }

    pub async fn delete_account(
        &self,
        actor: PrincipalId,
        target: PrincipalId,
    ) -> Result<(), AuthError> {
        const OP: &str = "delete_account";

        if actor != target {
            self.require_elevated(actor, OP).await?;
        }
        let subject = self.read_target(target, OP).await?;
        if subject.is_owner() {
            warn!(actor = %actor, target = %target, "Refused owner deletion");
            return Err(AuthError::Forbidden("the owner cannot be deleted"));
        }

        self.repository
            .delete(target)
            .await
            .map_err(|e| target_error(e, OP, "principal"))?;

        info!(actor = %actor, target = %target, "Principal deleted");
        Ok(())
    }

    /// Read a principal. Self, or an elevated actor.
    pub async fn principal(
        &self,
        actor: PrincipalId,
        id: PrincipalId,
    ) -> Result<Principal, AuthError> {
        const OP: &str = "principal";

        if actor != id {
            self.require_elevated(actor, OP).await?;
        }
        self.read_target(id, OP).await
    }

    /// List principals. Elevated actors only.
    pub async fn list_principals(
        &self,
        actor: PrincipalId,
        query: &ListPrincipalsQuery,
    ) -> Result<Vec<Principal>, AuthError> {
        const OP: &str = "list_principals";

        self.require_elevated(actor, OP).await?;
        self.repository
            .list(query)
            .await
            .map_err(AuthError::repository(OP))
    }

    /// Out-of-band Owner assignment, used at startup only.
    ///
    /// Grants `Owner` to the principal with this email, creating it first if
    /// needed. No transport route reaches this method.
    pub async fn seed_owner(&self, email: &str, full_name: &str) -> Result<PrincipalId, AuthError> {
        const OP: &str = "seed_owner";

        validate_email(email)?;
        validate_full_name(full_name)?;

        let id = match self.repository.read_by_email(email).await {
            Ok(existing) => existing.id,
            Err(e) if e.is_not_found() => {
                let principal = NewPrincipal {
                    full_name: full_name.to_string(),
                    roles: vec![Role::User],
                    email: Some(email.to_string()),
                    phone_number: None,
                    password_hash: None,
                    birth_date: None,
                    addresses: Vec::new(),
                    created_at: Utc::now(),
                };
                self.repository
                    .create(principal)
                    .await
                    .map_err(AuthError::repository(OP))?
            }
            Err(e) => return Err(AuthError::repository(OP)(e)),
        };

        self.repository
            .add_role(id, Role::Owner)
            .await
            .map_err(AuthError::repository(OP))?;

        info!(principal_id = %id, "Owner seeded");
        Ok(id)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Fresh check that the actor currently holds `Admin` or `Owner`.
    async fn require_elevated(
        &self,
        actor: PrincipalId,
        op: &'static str,
    ) -> Result<Principal, AuthError> {
        match self.repository.read(actor).await {
            Ok(principal) if principal.is_elevated() => Ok(principal),
            Ok(_) => {
                warn!(actor = %actor, op, "Actor lacks an elevated role");
                Err(AuthError::Forbidden("an elevated role is required"))
            }
            Err(e) if e.is_not_found() => {
                warn!(actor = %actor, op, "Actor no longer exists");
                Err(AuthError::Forbidden("an elevated role is required"))
            }
            Err(e) => Err(AuthError::repository(op)(e)),
        }
    }

    async fn read_target(&self, id: PrincipalId, op: &'static str) -> Result<Principal, AuthError> {
        self.repository
            .read(id)
            .await
            .map_err(|e| target_error(e, op, "principal"))
    }
}

/// `NotFound` from the repository is the caller's problem; anything else is ours.
fn target_error(e: StorageError, op: &'static str, what: &str) -> AuthError {
    match e {
        StorageError::NotFound(detail) => {
            debug!(op, detail = %detail, "Lookup missed");
            AuthError::NotFound(what.to_string())
        }
        other => AuthError::repository(op)(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::ErrorKind;
    use crate::test_support::{
        FailingRepository, FailingSender, FlakyChallengeStore, StalledSender, TestHarness,
        YieldingChallengeStore,
    };

    const PHONE: &str = "+15551234567";
    const EMAIL: &str = "real@x.com";

    fn wrong_code(actual: &str) -> &'static str {
        if actual == "000000" {
            "111111"
        } else {
            "000000"
        }
    }

    async fn sign_in_by_phone(h: &TestHarness, phone: &str) -> Session {
        h.service
            .request_challenge(ChallengeRequest {
                phone_number: Some(phone.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let code = h.sms.last_code().unwrap();
        h.service
            .complete_sign_in(SignInRequest {
                phone_number: Some(phone.to_string()),
                code,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    // -------------------------------------------------------------------------
    // RequestChallenge
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn sms_challenge_is_sent_and_stored() {
        let h = TestHarness::new();
        let channel = h
            .service
            .request_challenge(ChallengeRequest {
                phone_number: Some(PHONE.to_string()),
                purpose: ChallengePurpose::SignUp,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(channel, Channel::Sms);
        assert_eq!(h.sms.sent().len(), 1);
        assert!(h.email.sent().is_empty());

        let message = &h.sms.sent()[0];
        assert_eq!(message.destination, PHONE);
        assert_eq!(message.title, ChallengePurpose::SignUp.title());

        let code = h.sms.last_code().unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(h.challenges.get(PHONE).await.unwrap(), code);
    }

    #[tokio::test]
    async fn email_challenge_uses_email_sender() {
        let h = TestHarness::new();
        let channel = h
            .service
            .request_challenge(ChallengeRequest {
                email: Some(EMAIL.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(channel, Channel::Email);
        assert!(h.sms.sent().is_empty());
        let code = h.email.last_code().unwrap();
        assert_eq!(h.challenges.get(EMAIL).await.unwrap(), code);
    }

    #[tokio::test]
    async fn challenge_without_identifier_is_invalid_input() {
        let h = TestHarness::new();
        let err = h
            .service
            .request_challenge(ChallengeRequest::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(h.sms.sent().is_empty());
        assert!(h.email.sent().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_skips_store_write() {
        let h = TestHarness::builder()
            .sms(Arc::new(FailingSender))
            .build();
        let err = h
            .service
            .request_challenge(ChallengeRequest {
                phone_number: Some(PHONE.to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DeliveryFailure);
        assert_eq!(err.op(), Some("request_challenge"));
        assert!(h.challenges.get(PHONE).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn caller_timeout_abandons_challenge() {
        let h = TestHarness::builder()
            .sms(Arc::new(StalledSender))
            .build();
        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            h.service.request_challenge(ChallengeRequest {
                phone_number: Some(PHONE.to_string()),
                ..Default::default()
            }),
        )
        .await;

        assert!(outcome.is_err());
        assert!(h.challenges.get(PHONE).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn store_failure_after_send_is_cache_failure() {
        let h = TestHarness::builder()
            .challenge_store(Arc::new(FlakyChallengeStore::failing_put()))
            .build();
        let err = h
            .service
            .request_challenge(ChallengeRequest {
                phone_number: Some(PHONE.to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CacheFailure);
        assert_eq!(h.sms.sent().len(), 1);
    }

    #[tokio::test]
    async fn challenge_does_not_consult_repository() {
        // A broken repository cannot influence the outcome
        let h = TestHarness::builder()
            .repository(Arc::new(FailingRepository))
            .build();
        h.service
            .request_challenge(ChallengeRequest {
                email: Some("nobody@x.com".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    // -------------------------------------------------------------------------
    // CompleteSignIn / CompleteSignUp
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn sms_sign_in_scenario() {
        let h = TestHarness::new();
        let id = h.seed("Alice", None, Some(PHONE), &[Role::Moderator, Role::User]).await;

        h.service
            .request_challenge(ChallengeRequest {
                phone_number: Some(PHONE.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let code = h.sms.last_code().unwrap();

        let err = h
            .service
            .complete_sign_in(SignInRequest {
                phone_number: Some(PHONE.to_string()),
                code: wrong_code(&code).to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCode);

        let session = h
            .service
            .complete_sign_in(SignInRequest {
                phone_number: Some(PHONE.to_string()),
                code,
                ..Default::default()
            })
            .await
            .unwrap();

        let user = h.service.authenticate(&session.access_token).unwrap();
        assert_eq!(user.principal_id, id);
        assert_eq!(user.roles, vec![Role::Moderator, Role::User]);
    }

    #[tokio::test]
    async fn code_is_single_use() {
        let h = TestHarness::new();
        h.seed("Alice", None, Some(PHONE), &[Role::User]).await;
        sign_in_by_phone(&h, PHONE).await;

        let replay = h
            .service
            .complete_sign_in(SignInRequest {
                phone_number: Some(PHONE.to_string()),
                code: h.sms.last_code().unwrap(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(replay.kind(), ErrorKind::InvalidCode);
    }

    #[tokio::test]
    async fn only_latest_code_is_accepted() {
        let h = TestHarness::new();
        h.seed("Alice", Some(EMAIL), None, &[Role::User]).await;

        let request = ChallengeRequest {
            email: Some(EMAIL.to_string()),
            ..Default::default()
        };
        h.service.request_challenge(request.clone()).await.unwrap();
        let first = h.email.last_code().unwrap();
        h.service.request_challenge(request).await.unwrap();
        let second = h.email.last_code().unwrap();

        if first != second {
            let err = h
                .service
                .complete_sign_in(SignInRequest {
                    email: Some(EMAIL.to_string()),
                    code: first,
                    ..Default::default()
                })
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidCode);
        }

        h.service
            .complete_sign_in(SignInRequest {
                email: Some(EMAIL.to_string()),
                code: second,
                ..Default::default()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn code_without_challenge_is_invalid() {
        let h = TestHarness::new();
        h.seed("Alice", Some(EMAIL), None, &[Role::User]).await;
        let err = h
            .service
            .complete_sign_in(SignInRequest {
                email: Some(EMAIL.to_string()),
                code: "123456".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCode);
    }

    #[tokio::test]
    async fn sign_in_for_unknown_identifier_is_not_found() {
        let h = TestHarness::new();
        h.service
            .request_challenge(ChallengeRequest {
                phone_number: Some(PHONE.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let err = h
            .service
            .complete_sign_in(SignInRequest {
                phone_number: Some(PHONE.to_string()),
                code: h.sms.last_code().unwrap(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn failed_code_consumption_fails_closed() {
        let h = TestHarness::builder()
            .challenge_store(Arc::new(FlakyChallengeStore::failing_consume()))
            .build();
        h.seed("Alice", None, Some(PHONE), &[Role::User]).await;
        h.service
            .request_challenge(ChallengeRequest {
                phone_number: Some(PHONE.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = h
            .service
            .complete_sign_in(SignInRequest {
                phone_number: Some(PHONE.to_string()),
                code: h.sms.last_code().unwrap(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CacheFailure);
    }

    #[tokio::test]
    async fn concurrent_sign_ins_share_one_code_use() {
        let h = TestHarness::builder()
            .challenge_store(Arc::new(YieldingChallengeStore::default()))
            .build();
        h.seed("Alice", None, Some(PHONE), &[Role::User]).await;
        h.service
            .request_challenge(ChallengeRequest {
                phone_number: Some(PHONE.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let code = h.sms.last_code().unwrap();
        let attempt = || {
            h.service.complete_sign_in(SignInRequest {
                phone_number: Some(PHONE.to_string()),
                code: code.clone(),
                ..Default::default()
            })
        };

        let (first, second) = tokio::join!(attempt(), attempt());

        let successes = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        let err = first.err().or(second.err()).unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidCode);
    }

    #[tokio::test]
    async fn sign_up_creates_user_with_profile() {
        let h = TestHarness::new();
        h.service
            .request_challenge(ChallengeRequest {
                email: Some(EMAIL.to_string()),
                purpose: ChallengePurpose::SignUp,
                ..Default::default()
            })
            .await
            .unwrap();

        let session = h
            .service
            .complete_sign_up(SignUpRequest {
                email: Some(EMAIL.to_string()),
                code: h.email.last_code().unwrap(),
                full_name: "Real Person".to_string(),
                birth_date: NaiveDate::from_ymd_opt(1990, 5, 17),
                address: Some(Address {
                    country_code: "KG".to_string(),
                    city: "Bishkek".to_string(),
                    street: "Chui 1".to_string(),
                    ..Address::default()
                }),
                ..Default::default()
            })
            .await
            .unwrap();

        let user = h.service.authenticate(&session.access_token).unwrap();
        assert_eq!(user.roles, vec![Role::User]);

        let stored = h.repo.read(user.principal_id).await.unwrap();
        assert_eq!(stored.full_name, "Real Person");
        assert_eq!(stored.email.as_deref(), Some(EMAIL));
        assert_eq!(stored.phone_number, None);
        assert_eq!(stored.password_hash, None);
        assert_eq!(stored.birth_date, NaiveDate::from_ymd_opt(1990, 5, 17));
        assert_eq!(stored.addresses.len(), 1);
    }

    #[tokio::test]
    async fn sign_up_with_wrong_code_creates_nothing() {
        let h = TestHarness::new();
        h.service
            .request_challenge(ChallengeRequest {
                phone_number: Some(PHONE.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let code = h.sms.last_code().unwrap();

        let err = h
            .service
            .complete_sign_up(SignUpRequest {
                phone_number: Some(PHONE.to_string()),
                code: wrong_code(&code).to_string(),
                full_name: "Alice".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCode);
        assert!(h.repo.is_empty().await);
    }

    #[tokio::test]
    async fn sign_up_persistence_failure_issues_no_session() {
        let h = TestHarness::builder()
            .repository(Arc::new(FailingRepository))
            .build();
        h.service
            .request_challenge(ChallengeRequest {
                phone_number: Some(PHONE.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = h
            .service
            .complete_sign_up(SignUpRequest {
                phone_number: Some(PHONE.to_string()),
                code: h.sms.last_code().unwrap(),
                full_name: "Alice".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RepositoryFailure);
        assert_eq!(err.op(), Some("complete_sign_up"));
    }

    // -------------------------------------------------------------------------
    // Password sign-in
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn password_sign_in_does_not_enumerate_accounts() {
        let h = TestHarness::new();
        let id = h.seed("Real", Some(EMAIL), None, &[Role::User]).await;
        h.service
            .update_profile(
                id,
                ProfileChangeset {
                    subject_id: id,
                    password: Some("correct-password".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let unknown = h
            .service
            .sign_in_with_password("nobody@x.com", "anything")
            .await
            .unwrap_err();
        let wrong = h
            .service
            .sign_in_with_password(EMAIL, "wrongpass")
            .await
            .unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::InvalidCredentials);
        assert_eq!(wrong.kind(), unknown.kind());
        assert_eq!(wrong.to_string(), unknown.to_string());

        let session = h
            .service
            .sign_in_with_password(EMAIL, "correct-password")
            .await
            .unwrap();
        assert_eq!(
            h.service.authenticate(&session.access_token).unwrap().principal_id,
            id
        );
    }

    #[tokio::test]
    async fn passwordless_account_rejects_password_sign_in() {
        let h = TestHarness::new();
        h.seed("Real", Some(EMAIL), None, &[Role::User]).await;
        let err = h
            .service
            .sign_in_with_password(EMAIL, "anything-at-all")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    }

    // -------------------------------------------------------------------------
    // RefreshSession
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn refresh_reflects_current_roles() {
        let h = TestHarness::new();
        let admin = h.seed("Admin", Some("admin@x.com"), None, &[Role::Admin]).await;
        let id = h.seed("Alice", None, Some(PHONE), &[Role::User]).await;

        let first = sign_in_by_phone(&h, PHONE).await;
        assert_eq!(
            h.service.authenticate(&first.access_token).unwrap().roles,
            vec![Role::User]
        );

        h.service.grant_role(admin, id, Role::DeliveryAgent).await.unwrap();

        let refreshed = h.service.refresh_session(&first.refresh_token).await.unwrap();
        assert_eq!(
            h.service.authenticate(&refreshed.access_token).unwrap().roles,
            vec![Role::DeliveryAgent, Role::User]
        );

        h.service.revoke_role(admin, id, Role::DeliveryAgent).await.unwrap();
        let again = h.service.refresh_session(&refreshed.refresh_token).await.unwrap();
        assert_eq!(
            h.service.authenticate(&again.access_token).unwrap().roles,
            vec![Role::User]
        );
    }

    #[tokio::test]
    async fn refresh_rejects_access_token_and_deleted_principal() {
        let h = TestHarness::new();
        let id = h.seed("Alice", None, Some(PHONE), &[Role::User]).await;
        let session = sign_in_by_phone(&h, PHONE).await;

        let err = h
            .service
            .refresh_session(&session.access_token)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidToken);

        h.service.delete_account(id, id).await.unwrap();
        let err = h
            .service
            .refresh_session(&session.refresh_token)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidToken);
    }

    // -------------------------------------------------------------------------
    // Roles
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn owner_role_is_never_granted() {
        let h = TestHarness::new();
        let owner = h.seed("Owner", Some("owner@x.com"), None, &[Role::Owner]).await;
        let admin = h.seed("Admin", Some("admin@x.com"), None, &[Role::Admin]).await;
        let user = h.seed("User", Some("user@x.com"), None, &[Role::User]).await;

        for actor in [owner, admin, user] {
            let err = h.service.grant_role(actor, user, Role::Owner).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Forbidden);
        }
        assert!(!h.repo.read(user).await.unwrap().is_owner());
    }

    #[tokio::test]
    async fn owner_roles_cannot_be_revoked() {
        let h = TestHarness::new();
        let owner = h.seed("Owner", Some("owner@x.com"), None, &[Role::Owner]).await;
        let admin = h.seed("Admin", Some("admin@x.com"), None, &[Role::Admin]).await;

        for actor in [owner, admin] {
            for role in [Role::Owner, Role::User] {
                let err = h.service.revoke_role(actor, owner, role).await.unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Forbidden);
            }
        }
        assert!(h.repo.read(owner).await.unwrap().is_owner());
    }

    #[tokio::test]
    async fn role_mutation_requires_elevated_actor() {
        let h = TestHarness::new();
        let moderator = h
            .seed("Mod", Some("mod@x.com"), None, &[Role::Moderator])
            .await;
        let target = h.seed("User", Some("user@x.com"), None, &[Role::User]).await;

        let err = h
            .service
            .grant_role(moderator, target, Role::Admin)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = h
            .service
            .revoke_role(moderator, target, Role::User)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        // Unknown actor
        let err = h
            .service
            .grant_role(PrincipalId(999), target, Role::Admin)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn demoted_admin_loses_access_despite_live_token() {
        let h = TestHarness::new();
        let owner = h.seed("Owner", Some("owner@x.com"), None, &[Role::Owner]).await;
        let admin = h.seed("Admin", None, Some(PHONE), &[Role::Admin]).await;
        let target = h.seed("User", Some("user@x.com"), None, &[Role::User]).await;

        let session = sign_in_by_phone(&h, PHONE).await;
        h.service.revoke_role(owner, admin, Role::Admin).await.unwrap();

        // The token still claims Admin
        assert!(h
            .service
            .authenticate(&session.access_token)
            .unwrap()
            .has_role(Role::Admin));

        let err = h
            .service
            .grant_role(admin, target, Role::Moderator)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn grant_to_missing_target_is_not_found() {
        let h = TestHarness::new();
        let admin = h.seed("Admin", Some("admin@x.com"), None, &[Role::Admin]).await;
        let err = h
            .service
            .grant_role(admin, PrincipalId(404), Role::Moderator)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn unprivileged_actor_cannot_tell_missing_targets_apart() {
        let h = TestHarness::new();
        let alice = h.seed("Alice", Some("alice@x.com"), None, &[Role::User]).await;
        let bob = h.seed("Bob", Some("bob@x.com"), None, &[Role::User]).await;
        let owner = h.seed("Owner", Some("owner@x.com"), None, &[Role::Owner]).await;

        for target in [bob, owner, PrincipalId(404)] {
            let err = h
                .service
                .revoke_role(alice, target, Role::User)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Forbidden);
            assert_eq!(err.to_string(), "forbidden: an elevated role is required");

            let err = h.service.delete_account(alice, target).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Forbidden);
            assert_eq!(err.to_string(), "forbidden: an elevated role is required");
        }
        assert_eq!(h.repo.len().await, 3);
    }

    // -------------------------------------------------------------------------
    // UpdateProfile
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn password_length_boundaries() {
        let h = TestHarness::new();
        let id = h.seed("Alice", Some(EMAIL), None, &[Role::User]).await;

        for (len, ok) in [(7, false), (8, true), (64, true), (65, false)] {
            let result = h
                .service
                .update_profile(
                    id,
                    ProfileChangeset {
                        subject_id: id,
                        password: Some("p".repeat(len)),
                        ..Default::default()
                    },
                )
                .await;
            match (ok, result) {
                (true, Ok(updated)) => {
                    let hash = updated.password_hash.unwrap();
                    assert!(hash.starts_with("$argon2id$"), "length {len}");
                }
                (false, Err(err)) => {
                    assert_eq!(err.kind(), ErrorKind::WeakCredential, "length {len}")
                }
                (expected, other) => panic!("length {len}: expected ok={expected}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn profile_fields_are_validated() {
        let h = TestHarness::new();
        let id = h.seed("Alice", Some(EMAIL), None, &[Role::User]).await;
        let change = |f: fn(&mut ProfileChangeset)| {
            let mut changeset = ProfileChangeset {
                subject_id: id,
                ..Default::default()
            };
            f(&mut changeset);
            changeset
        };

        let cases: [(ProfileChangeset, ErrorKind); 4] = [
            (change(|c| c.email = Some("not-an-email".into())), ErrorKind::InvalidEmail),
            (change(|c| c.phone_number = Some("12345".into())), ErrorKind::InvalidPhoneNumber),
            (change(|c| c.full_name = Some("n".repeat(251))), ErrorKind::InvalidFullName),
            // First violation wins
            (
                change(|c| {
                    c.password = Some("short".into());
                    c.email = Some("bad".into());
                }),
                ErrorKind::WeakCredential,
            ),
        ];

        for (changeset, expected) in cases {
            let err = h.service.update_profile(id, changeset).await.unwrap_err();
            assert_eq!(err.kind(), expected);
        }

        let unchanged = h.repo.read(id).await.unwrap();
        assert_eq!(unchanged.email.as_deref(), Some(EMAIL));
        assert_eq!(unchanged.full_name, "Alice");
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields() {
        let h = TestHarness::new();
        let id = h.seed("Alice", Some(EMAIL), Some(PHONE), &[Role::User]).await;

        let updated = h
            .service
            .update_profile(
                id,
                ProfileChangeset {
                    subject_id: id,
                    full_name: Some("Alice Smith".to_string()),
                    email: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.full_name, "Alice Smith");
        assert_eq!(updated.email.as_deref(), Some(EMAIL));
        assert_eq!(updated.phone_number.as_deref(), Some(PHONE));
    }

    #[tokio::test]
    async fn updating_someone_else_requires_elevation() {
        let h = TestHarness::new();
        let alice = h.seed("Alice", Some("alice@x.com"), None, &[Role::User]).await;
        let bob = h.seed("Bob", Some("bob@x.com"), None, &[Role::User]).await;
        let admin = h.seed("Admin", Some("admin@x.com"), None, &[Role::Admin]).await;

        let changeset = ProfileChangeset {
            subject_id: bob,
            full_name: Some("Robert".to_string()),
            ..Default::default()
        };
        let err = h
            .service
            .update_profile(alice, changeset.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let updated = h.service.update_profile(admin, changeset).await.unwrap();
        assert_eq!(updated.full_name, "Robert");
    }

    #[tokio::test]
    async fn only_owner_changes_owner_profile() {
        let h = TestHarness::new();
        let owner = h.seed("Owner", Some("owner@x.com"), None, &[Role::Owner]).await;
        let admin = h.seed("Admin", Some("admin@x.com"), None, &[Role::Admin]).await;

        let changeset = ProfileChangeset {
            subject_id: owner,
            full_name: Some("Taken Over".to_string()),
            ..Default::default()
        };
        let err = h
            .service
            .update_profile(admin, changeset.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let updated = h.service.update_profile(owner, changeset).await.unwrap();
        assert_eq!(updated.full_name, "Taken Over");
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let h = TestHarness::new();
        h.seed("Alice", Some("alice@x.com"), None, &[Role::User]).await;
        let bob = h.seed("Bob", Some("bob@x.com"), None, &[Role::User]).await;

        let err = h
            .service
            .update_profile(
                bob,
                ProfileChangeset {
                    subject_id: bob,
                    email: Some("alice@x.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RepositoryFailure);
        assert!(err.is_conflict());
    }

    // -------------------------------------------------------------------------
    // DeleteAccount
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn owner_cannot_be_deleted() {
        let h = TestHarness::new();
        let owner = h.seed("Owner", Some("owner@x.com"), None, &[Role::Owner]).await;
        let admin = h.seed("Admin", Some("admin@x.com"), None, &[Role::Admin]).await;

        for actor in [owner, admin] {
            let err = h.service.delete_account(actor, owner).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Forbidden);
        }
        assert!(h.repo.read(owner).await.is_ok());
    }

    #[tokio::test]
    async fn delete_self_or_as_admin() {
        let h = TestHarness::new();
        let alice = h.seed("Alice", Some("alice@x.com"), None, &[Role::User]).await;
        let bob = h.seed("Bob", Some("bob@x.com"), None, &[Role::User]).await;
        let admin = h.seed("Admin", Some("admin@x.com"), None, &[Role::Admin]).await;

        let err = h.service.delete_account(alice, bob).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        h.service.delete_account(alice, alice).await.unwrap();
        h.service.delete_account(admin, bob).await.unwrap();
        assert_eq!(h.repo.len().await, 1);

        let err = h.service.delete_account(admin, bob).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn principal_reads_self_or_elevated() {
        let h = TestHarness::new();
        let alice = h.seed("Alice", Some("alice@x.com"), None, &[Role::User]).await;
        let bob = h.seed("Bob", Some("bob@x.com"), None, &[Role::User]).await;
        let admin = h.seed("Admin", Some("admin@x.com"), None, &[Role::Admin]).await;

        assert_eq!(h.service.principal(alice, alice).await.unwrap().id, alice);
        assert_eq!(h.service.principal(admin, bob).await.unwrap().id, bob);
        let err = h.service.principal(alice, bob).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn listing_requires_elevation() {
        let h = TestHarness::new();
        let alice = h.seed("Alice", Some("alice@x.com"), None, &[Role::User]).await;
        let admin = h.seed("Admin", Some("admin@x.com"), None, &[Role::Admin]).await;

        let query = ListPrincipalsQuery::default();
        let err = h.service.list_principals(alice, &query).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let all = h.service.list_principals(admin, &query).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn repository_outage_surfaces_with_op() {
        let h = TestHarness::builder()
            .repository(Arc::new(FailingRepository))
            .build();
        let err = h
            .service
            .list_principals(PrincipalId(1), &ListPrincipalsQuery::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RepositoryFailure);
        assert_eq!(err.op(), Some("list_principals"));
    }

    // -------------------------------------------------------------------------
    // Owner seeding
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn seed_owner_creates_or_promotes() {
        let h = TestHarness::new();
        let created = h.service.seed_owner("owner@x.com", "Owner").await.unwrap();
        assert!(h.repo.read(created).await.unwrap().is_owner());

        // Idempotent for the same email
        assert_eq!(
            h.service.seed_owner("owner@x.com", "Owner").await.unwrap(),
            created
        );

        let existing = h.seed("Alice", Some("alice@x.com"), None, &[Role::User]).await;
        assert_eq!(
            h.service.seed_owner("alice@x.com", "Alice").await.unwrap(),
            existing
        );
        assert_eq!(
            h.repo.read(existing).await.unwrap().roles,
            vec![Role::Owner, Role::User]
        );
    }
}
