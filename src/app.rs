// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wires configured collaborators into an [`AuthService`].

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::{AuthDependencies, AuthError, AuthService, TokenService};
use crate::config::Config;
use crate::notify::{DevLogSender, EmailSender, GatewaySender, NotifyError, SmsSender};
use crate::storage::{
    ChallengeStore, IdentityDatabase, IdentityDbError, IdentityRepository,
    InMemoryIdentityRepository, MemoryChallengeStore,
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to open identity database: {0}")]
    Database(#[from] IdentityDbError),

    #[error("failed to configure notification gateway: {0}")]
    Gateway(#[from] NotifyError),

    #[error("failed to seed owner: {0}")]
    Seed(#[from] AuthError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn build_service(config: &Config) -> Result<AuthService, StartupError> {
    let repository: Arc<dyn IdentityRepository> = match &config.identity_db_path {
        Some(path) => {
            info!(path = %path.display(), "Using identity database");
            Arc::new(IdentityDatabase::open(path)?)
        }
        None => {
            warn!("IDENTITY_DB_PATH not set, principals are kept in memory only");
            Arc::new(InMemoryIdentityRepository::new())
        }
    };

    let challenges: Arc<dyn ChallengeStore> =
        Arc::new(MemoryChallengeStore::new(config.challenge_cache_capacity));

    let sms: Arc<dyn SmsSender> = match &config.sms_gateway_url {
        Some(url) => {
            let sender = GatewaySender::new(url.clone(), config.gateway_api_key.clone())?;
            info!(gateway = %sender.url(), "SMS gateway configured");
            Arc::new(sender)
        }
        None => {
            warn!("SMS_GATEWAY_URL not set, SMS codes will be logged instead of sent");
            Arc::new(DevLogSender::sms())
        }
    };
    let email: Arc<dyn EmailSender> = match &config.email_gateway_url {
        Some(url) => {
            let sender = GatewaySender::new(url.clone(), config.gateway_api_key.clone())?;
            info!(gateway = %sender.url(), "Email gateway configured");
            Arc::new(sender)
        }
        None => {
            warn!("EMAIL_GATEWAY_URL not set, email codes will be logged instead of sent");
            Arc::new(DevLogSender::email())
        }
    };

    let tokens = TokenService::new(
        &config.jwt_secret,
        &config.token_issuer,
        config.access_ttl,
        config.refresh_ttl,
    );

    Ok(AuthService::new(
        AuthDependencies {
            repository,
            challenges,
            sms,
            email,
            tokens: Arc::new(tokens),
        },
        config.challenge_ttl,
    ))
}

/// Apply the configured Owner, if any.
pub async fn seed_owner(service: &AuthService, config: &Config) -> Result<(), StartupError> {
    if let Some(owner) = &config.bootstrap_owner {
        let id = service.seed_owner(&owner.email, &owner.full_name).await?;
        info!(principal_id = %id, "Bootstrap owner ready");
    }
    Ok(())
}
