// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::auth::error::{AuthError, ErrorKind};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error_code: &'static str,
    pub message: String,
}

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable message
    pub error: String,
    /// Stable machine-readable code
    pub error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error_code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::InvalidInput.code(), message)
    }

    pub fn unauthorized(error_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error_code, message)
    }

    fn internal(error_code: &'static str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error_code, "internal server error")
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let kind = err.kind();
        let code = err.error_code();
        match kind {
            ErrorKind::InvalidInput => Self::bad_request(err.to_string()),
            ErrorKind::WeakCredential
            | ErrorKind::InvalidEmail
            | ErrorKind::InvalidPhoneNumber
            | ErrorKind::InvalidFullName => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, code, err.to_string())
            }
            ErrorKind::InvalidCode | ErrorKind::InvalidToken | ErrorKind::InvalidCredentials => {
                Self::unauthorized(code, err.to_string())
            }
            ErrorKind::Forbidden => Self::new(StatusCode::FORBIDDEN, code, err.to_string()),
            ErrorKind::NotFound => Self::new(StatusCode::NOT_FOUND, code, err.to_string()),
            ErrorKind::RepositoryFailure if err.is_conflict() => Self::new(
                StatusCode::CONFLICT,
                "conflict",
                "email or phone number is already registered",
            ),
            ErrorKind::DeliveryFailure => {
                warn!(
                    error = %err,
                    source = ?std::error::Error::source(&err),
                    "Notification delivery failed"
                );
                Self::new(StatusCode::BAD_GATEWAY, code, "could not deliver the one-time code")
            }
            ErrorKind::CacheFailure | ErrorKind::RepositoryFailure | ErrorKind::SigningFailure => {
                error!(error = %err, source = ?std::error::Error::source(&err), "Request failed");
                Self::internal(code)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.error_code.to_string(),
        });
        (self.status, body).into_response()
    }
}
