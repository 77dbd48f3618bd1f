// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the typed [`Config`] loaded from
//! them at startup. A `.env` file is honoured in development (`dotenvy`).
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `JWT_SECRET` | HS256 signing key (at least 32 bytes) | Required |
//! | `TOKEN_ISSUER` | `iss` claim of issued tokens | `relational-identity` |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `3600` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime | `86400` |
//! | `CHALLENGE_TTL_SECS` | One-time code lifetime | `300` |
//! | `CHALLENGE_CACHE_CAPACITY` | Max outstanding one-time codes | `10000` |
//! | `IDENTITY_DB_PATH` | redb file for principals | In-memory if unset |
//! | `SMS_GATEWAY_URL` | HTTP gateway for SMS | Log-only sender if unset |
//! | `EMAIL_GATEWAY_URL` | HTTP gateway for email | Log-only sender if unset |
//! | `GATEWAY_API_KEY` | Bearer key sent to both gateways | Optional |
//! | `BOOTSTRAP_OWNER_EMAIL` | Email granted `Owner` at startup | Optional |
//! | `BOOTSTRAP_OWNER_NAME` | Full name used if that principal is created | `Owner` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::auth::tokens::{DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL};
use crate::auth::service::DEFAULT_CHALLENGE_TTL;
use crate::storage::challenge_cache::DEFAULT_CHALLENGE_CAPACITY;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the token signing key.
///
/// Rotating this value (and restarting) invalidates every outstanding session.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const TOKEN_ISSUER_ENV: &str = "TOKEN_ISSUER";
pub const ACCESS_TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const REFRESH_TOKEN_TTL_ENV: &str = "REFRESH_TOKEN_TTL_SECS";
pub const CHALLENGE_TTL_ENV: &str = "CHALLENGE_TTL_SECS";
pub const CHALLENGE_CACHE_CAPACITY_ENV: &str = "CHALLENGE_CACHE_CAPACITY";

/// Environment variable name for the identity database file.
///
/// When unset, principals live in memory and are lost on restart.
pub const IDENTITY_DB_PATH_ENV: &str = "IDENTITY_DB_PATH";
pub const SMS_GATEWAY_URL_ENV: &str = "SMS_GATEWAY_URL";
pub const EMAIL_GATEWAY_URL_ENV: &str = "EMAIL_GATEWAY_URL";
pub const GATEWAY_API_KEY_ENV: &str = "GATEWAY_API_KEY";

/// Out-of-band Owner assignment. This is the only path that ever grants `Owner`.
pub const BOOTSTRAP_OWNER_EMAIL_ENV: &str = "BOOTSTRAP_OWNER_EMAIL";
pub const BOOTSTRAP_OWNER_NAME_ENV: &str = "BOOTSTRAP_OWNER_NAME";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TOKEN_ISSUER: &str = "relational-identity";
pub const DEFAULT_OWNER_NAME: &str = "Owner";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Minimum HS256 key length in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOwner {
    pub email: String,
    pub full_name: String,
}

/// Process configuration.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub jwt_secret: Vec<u8>,
    pub token_issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub challenge_ttl: Duration,
    pub challenge_cache_capacity: usize,
    pub identity_db_path: Option<PathBuf>,
    pub sms_gateway_url: Option<Url>,
    pub email_gateway_url: Option<Url>,
    pub gateway_api_key: Option<String>,
    pub bootstrap_owner: Option<BootstrapOwner>,
    pub log_format: LogFormat,
}

// Secrets stay out of logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("jwt_secret", &"<redacted>")
            .field("token_issuer", &self.token_issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("challenge_ttl", &self.challenge_ttl)
            .field("challenge_cache_capacity", &self.challenge_cache_capacity)
            .field("identity_db_path", &self.identity_db_path)
            .field("sms_gateway_url", &self.sms_gateway_url)
            .field("email_gateway_url", &self.email_gateway_url)
            .field(
                "gateway_api_key",
                &self.gateway_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("bootstrap_owner", &self.bootstrap_owner)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let jwt_secret = get(JWT_SECRET_ENV).ok_or(ConfigError::Missing(JWT_SECRET_ENV))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                var: JWT_SECRET_ENV,
                reason: format!("must be at least {MIN_JWT_SECRET_LEN} bytes"),
            });
        }

        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                var: PORT_ENV,
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let access_ttl = parse_secs(&get, ACCESS_TOKEN_TTL_ENV, DEFAULT_ACCESS_TTL)?;
        let refresh_ttl = parse_secs(&get, REFRESH_TOKEN_TTL_ENV, DEFAULT_REFRESH_TTL)?;
        if refresh_ttl < access_ttl {
            return Err(ConfigError::Invalid {
                var: REFRESH_TOKEN_TTL_ENV,
                reason: "must not be shorter than the access token lifetime".to_string(),
            });
        }

        let challenge_cache_capacity = match get(CHALLENGE_CACHE_CAPACITY_ENV) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: CHALLENGE_CACHE_CAPACITY_ENV,
                        reason: format!("expected a positive integer, got {raw:?}"),
                    })
                }
            },
            None => DEFAULT_CHALLENGE_CAPACITY,
        };

        let log_format = match get(LOG_FORMAT_ENV).map(|v| v.to_lowercase()).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: LOG_FORMAT_ENV,
                    reason: format!("expected json or pretty, got {other:?}"),
                })
            }
        };

        let bootstrap_owner = get(BOOTSTRAP_OWNER_EMAIL_ENV).map(|email| BootstrapOwner {
            email,
            full_name: get(BOOTSTRAP_OWNER_NAME_ENV)
                .unwrap_or_else(|| DEFAULT_OWNER_NAME.to_string()),
        });

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            jwt_secret: jwt_secret.into_bytes(),
            token_issuer: get(TOKEN_ISSUER_ENV).unwrap_or_else(|| DEFAULT_TOKEN_ISSUER.to_string()),
            access_ttl,
            refresh_ttl,
            challenge_ttl: parse_secs(&get, CHALLENGE_TTL_ENV, DEFAULT_CHALLENGE_TTL)?,
            challenge_cache_capacity,
            identity_db_path: get(IDENTITY_DB_PATH_ENV).map(PathBuf::from),
            sms_gateway_url: parse_url(&get, SMS_GATEWAY_URL_ENV)?,
            email_gateway_url: parse_url(&get, EMAIL_GATEWAY_URL_ENV)?,
            gateway_api_key: get(GATEWAY_API_KEY_ENV),
            bootstrap_owner,
            log_format,
        })
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_secs<F>(get: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::Invalid {
                var,
                reason: format!("expected a positive number of seconds, got {raw:?}"),
            }),
        },
    }
}

fn parse_url<F>(get: &F, var: &'static str) -> Result<Option<Url>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|raw| {
            Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
            })
        })
        .transpose()
}
