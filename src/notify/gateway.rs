// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP gateway sender.
//!
//! Posts `{"to", "title", "body"}` as JSON to a configured URL, optionally
//! with a bearer key. Any non-2xx response is a delivery failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::{EmailSender, NotifyError, SmsSender};

/// Per-request timeout for gateway calls.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct GatewayMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Clone)]
pub struct GatewaySender {
    url: Url,
    api_key: Option<String>,
    http: Client,
}

impl GatewaySender {
    pub fn new(url: Url, api_key: Option<String>) -> Result<Self, NotifyError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(NotifyError::Config(format!(
                "unsupported gateway scheme: {}",
                url.scheme()
            )));
        }

        let http = Client::builder().timeout(GATEWAY_TIMEOUT).build()?;

        Ok(Self { url, api_key, http })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn post(&self, destination: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        let mut request = self.http.post(self.url.clone()).json(&GatewayMessage {
            to: destination,
            title,
            body,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        debug!(gateway = %self.url, "Message accepted by gateway");
        Ok(())
    }
}

#[async_trait]
impl SmsSender for GatewaySender {
    async fn send(&self, destination: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        self.post(destination, title, body).await
    }
}

#[async_trait]
impl EmailSender for GatewaySender {
    async fn send(&self, destination: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        self.post(destination, title, body).await
    }
}
