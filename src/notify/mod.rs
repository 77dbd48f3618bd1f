// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Notification Senders
//!
//! One-time codes leave the service through an [`SmsSender`] or an
//! [`EmailSender`]. Both contracts are the same shape: deliver a titled
//! message to a destination, or fail.
//!
//! ## Adapters
//!
//! - [`GatewaySender`] - JSON POST to an HTTP gateway (production)
//! - [`DevLogSender`] - writes the message to the log (local development)

use async_trait::async_trait;

pub mod dev_log;
pub mod gateway;

pub use dev_log::DevLogSender;
pub use gateway::GatewaySender;

/// Delivery failure.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected message with status {0}")]
    Rejected(u16),

    #[error("gateway misconfigured: {0}")]
    Config(String),
}

/// SMS dispatch.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, destination: &str, title: &str, body: &str) -> Result<(), NotifyError>;
}

/// Email dispatch.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, destination: &str, title: &str, body: &str) -> Result<(), NotifyError>;
}
