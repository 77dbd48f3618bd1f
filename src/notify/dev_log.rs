// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Development sender: logs the message instead of delivering it.
//!
//! WARNING: this prints one-time codes. It is only wired in when no gateway
//! URL is configured.

use async_trait::async_trait;
use tracing::warn;

use super::{EmailSender, NotifyError, SmsSender};

#[derive(Debug, Clone, Copy)]
pub struct DevLogSender {
    channel: &'static str,
}

impl DevLogSender {
    pub fn sms() -> Self {
        Self { channel: "sms" }
    }

    pub fn email() -> Self {
        Self { channel: "email" }
    }

    fn log(&self, destination: &str, title: &str, body: &str) {
        warn!(
            channel = self.channel,
            destination = %destination,
            title = %title,
            body = %body,
            "DEV MODE: message not delivered"
        );
    }
}

#[async_trait]
impl SmsSender for DevLogSender {
    async fn send(&self, destination: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        self.log(destination, title, body);
        Ok(())
    }
}

#[async_trait]
impl EmailSender for DevLogSender {
    async fn send(&self, destination: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        self.log(destination, title, body);
        Ok(())
    }
}
